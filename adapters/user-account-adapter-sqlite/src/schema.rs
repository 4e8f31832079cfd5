//! Database schema initialization and migrations

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::utils::*;
use idstore_types::prelude::*;

// Current schema version - update this when adding new migrations
pub(crate) const CURRENT_DB_VERSION: i64 = 1;

/// Get the current database version from vars table
async fn get_db_version(tx: &mut Transaction<'_, Sqlite>) -> ClResult<i64> {
	let value = sqlx::query_scalar::<_, String>("SELECT value FROM vars WHERE key = 'db_version'")
		.fetch_optional(&mut **tx)
		.await
		.map_err(db_err)?;

	Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// Set the database version in vars table
async fn set_db_version(tx: &mut Transaction<'_, Sqlite>, version: i64) -> ClResult<()> {
	sqlx::query("INSERT OR REPLACE INTO vars (key, value) VALUES ('db_version', ?)")
		.bind(version.to_string())
		.execute(&mut **tx)
		.await
		.map_err(db_err)?;
	Ok(())
}

async fn configure_schema(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
	// User accounts
	//***************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS user_accounts (
			id BLOB NOT NULL,
			email TEXT CHECK (email <> ''),
			is_email_verified INTEGER NOT NULL DEFAULT 0,
			email_verified_at INTEGER,
			password_hash TEXT,
			password_changed_at INTEGER,
			is_login_allowed INTEGER NOT NULL DEFAULT 1,
			failed_login_count INTEGER NOT NULL DEFAULT 0,
			last_login_at INTEGER,
			last_failed_login_at INTEGER,
			verification_key TEXT,
			verification_purpose INTEGER,
			verification_key_sent_at INTEGER,
			version INTEGER NOT NULL DEFAULT 1,
			created_at INTEGER NOT NULL DEFAULT (unixepoch()),
			updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
			PRIMARY KEY(id)
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_user_accounts_email ON user_accounts (email)
			WHERE email IS NOT NULL",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_user_accounts_verification_key
			ON user_accounts (verification_key) WHERE verification_key IS NOT NULL",
	)
	.execute(&mut **tx)
	.await?;

	// External accounts
	//*******************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS external_accounts (
			id BLOB NOT NULL,
			user_account_id BLOB NOT NULL,
			provider TEXT NOT NULL CHECK (provider <> ''),
			subject TEXT NOT NULL CHECK (subject <> ''),
			email TEXT,
			last_login_at INTEGER,
			created_at INTEGER NOT NULL DEFAULT (unixepoch()),
			PRIMARY KEY(id),
			FOREIGN KEY (user_account_id) REFERENCES user_accounts(id) ON DELETE CASCADE
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_external_accounts_provider_subject
			ON external_accounts (provider, subject)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_external_accounts_user
		ON external_accounts (user_account_id)",
	)
	.execute(&mut **tx)
	.await?;

	// Claims
	//********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS user_account_claims (
			id BLOB NOT NULL,
			user_account_id BLOB NOT NULL,
			claim_type TEXT NOT NULL CHECK (claim_type <> ''),
			value TEXT NOT NULL,
			PRIMARY KEY(id),
			FOREIGN KEY (user_account_id) REFERENCES user_accounts(id) ON DELETE CASCADE
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_user_account_claims_user
		ON user_account_claims (user_account_id)",
	)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

/// Initialize the database schema and run migrations.
///
/// Runs once per adapter construction; every step is guarded by the stored version.
pub(crate) async fn init_db(db: &SqlitePool) -> ClResult<i64> {
	let mut tx = db.begin().await.map_err(db_err)?;

	// Create vars table first (needed for version tracking)
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS vars (
		key text NOT NULL,
		value text NOT NULL,
		created_at INTEGER DEFAULT (unixepoch()),
		updated_at INTEGER DEFAULT (unixepoch()),
		PRIMARY KEY(key)
	)",
	)
	.execute(&mut *tx)
	.await
	.map_err(db_err)?;

	let version = get_db_version(&mut tx).await?;
	if version > CURRENT_DB_VERSION {
		error!(
			"User account database version {} is newer than supported version {}",
			version, CURRENT_DB_VERSION
		);
		return Err(Error::Internal(format!("unsupported user account schema version {}", version)));
	}

	// Version 1: user accounts, external accounts, claims
	if version < 1 {
		configure_schema(&mut tx).await.map_err(db_err)?;
		set_db_version(&mut tx, 1).await?;
		info!("User account schema migrated to version 1");
	}

	tx.commit().await.map_err(db_err)?;

	Ok(CURRENT_DB_VERSION)
}

/// Read the schema version without migrating
pub(crate) async fn read_db_version(db: &SqlitePool) -> ClResult<i64> {
	let mut tx = db.begin().await.map_err(db_err)?;
	let version = get_db_version(&mut tx).await?;
	tx.commit().await.map_err(db_err)?;
	Ok(version)
}

// vim: ts=4
