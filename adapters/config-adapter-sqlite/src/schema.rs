//! Database schema initialization and migrations

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::utils::*;
use idstore_types::prelude::*;

// Current schema version - update this when adding new migrations
pub(crate) const CURRENT_DB_VERSION: i64 = 1;

/// Get the current database version from vars table
pub(crate) async fn get_db_version(tx: &mut Transaction<'_, Sqlite>) -> ClResult<i64> {
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

/// Tables for clients and their scopes
async fn configure_client_schema(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS clients (
			id BLOB NOT NULL,
			client_id TEXT NOT NULL CHECK (client_id <> ''),
			client_name TEXT,
			description TEXT,
			enabled INTEGER NOT NULL DEFAULT 1,
			require_consent INTEGER NOT NULL DEFAULT 0,
			allow_offline_access INTEGER NOT NULL DEFAULT 0,
			access_token_lifetime INTEGER NOT NULL DEFAULT 3600,
			redirect_uris TEXT NOT NULL DEFAULT '[]',
			allowed_grant_types TEXT NOT NULL DEFAULT '[]',
			version INTEGER NOT NULL DEFAULT 1,
			created_at INTEGER NOT NULL DEFAULT (unixepoch()),
			updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
			PRIMARY KEY(id)
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_client_id ON clients (client_id)")
		.execute(&mut **tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS client_scopes (
			id BLOB NOT NULL,
			client_id BLOB NOT NULL,
			scope TEXT NOT NULL CHECK (scope <> ''),
			PRIMARY KEY(id),
			FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_client_scopes_client_scope
		ON client_scopes (client_id, scope)",
	)
	.execute(&mut **tx)
	.await?;

	Ok(())
}

/// Tables for identity and API resources
async fn configure_resource_schema(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS identity_resources (
			id BLOB NOT NULL,
			name TEXT NOT NULL CHECK (name <> ''),
			display_name TEXT,
			description TEXT,
			enabled INTEGER NOT NULL DEFAULT 1,
			required INTEGER NOT NULL DEFAULT 0,
			emphasize INTEGER NOT NULL DEFAULT 0,
			show_in_discovery_document INTEGER NOT NULL DEFAULT 1,
			user_claims TEXT NOT NULL DEFAULT '[]',
			version INTEGER NOT NULL DEFAULT 1,
			created_at INTEGER NOT NULL DEFAULT (unixepoch()),
			updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
			PRIMARY KEY(id)
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_identity_resources_name
		ON identity_resources (name)",
	)
	.execute(&mut **tx)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS api_resources (
			id BLOB NOT NULL,
			name TEXT NOT NULL CHECK (name <> ''),
			display_name TEXT,
			description TEXT,
			enabled INTEGER NOT NULL DEFAULT 1,
			scopes TEXT NOT NULL DEFAULT '[]',
			user_claims TEXT NOT NULL DEFAULT '[]',
			version INTEGER NOT NULL DEFAULT 1,
			created_at INTEGER NOT NULL DEFAULT (unixepoch()),
			updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
			PRIMARY KEY(id)
		)",
	)
	.execute(&mut **tx)
	.await?;
	sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_api_resources_name ON api_resources (name)")
		.execute(&mut **tx)
		.await?;

	Ok(())
}

/// Initialize the database schema and run migrations.
///
/// Runs once per adapter construction. Safe to run against an up-to-date
/// database: every step is guarded by the stored version.
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
			"Configuration database version {} is newer than supported version {}",
			version, CURRENT_DB_VERSION
		);
		return Err(Error::Internal(format!(
			"unsupported configuration schema version {}",
			version
		)));
	}

	// Version 1: clients, client scopes, identity and API resources
	if version < 1 {
		configure_client_schema(&mut tx).await.map_err(db_err)?;
		configure_resource_schema(&mut tx).await.map_err(db_err)?;
		set_db_version(&mut tx, 1).await?;
		info!("Configuration schema migrated to version 1");
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
