//! User account operations

use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

use crate::utils::*;
use idstore_types::{prelude::*, user_account_adapter::UserAccount};

const SELECT_USER_ACCOUNT: &str = "SELECT u.id, u.email, u.is_email_verified, u.email_verified_at,
	u.password_hash, u.password_changed_at, u.is_login_allowed, u.failed_login_count,
	u.last_login_at, u.last_failed_login_at, u.verification_key, u.verification_purpose,
	u.verification_key_sent_at, u.version, u.created_at, u.updated_at
	FROM user_accounts u";

fn user_account_from_row(row: &SqliteRow) -> Result<UserAccount, sqlx::Error> {
	Ok(UserAccount {
		id: row.try_get("id")?,
		email: row.try_get("email")?,
		is_email_verified: row.try_get("is_email_verified")?,
		email_verified_at: opt_ts(row.try_get("email_verified_at")?),
		password_hash: row.try_get("password_hash")?,
		password_changed_at: opt_ts(row.try_get("password_changed_at")?),
		is_login_allowed: row.try_get("is_login_allowed")?,
		failed_login_count: row.try_get("failed_login_count")?,
		last_login_at: opt_ts(row.try_get("last_login_at")?),
		last_failed_login_at: opt_ts(row.try_get("last_failed_login_at")?),
		verification_key: row.try_get("verification_key")?,
		verification_purpose: row.try_get("verification_purpose")?,
		verification_key_sent_at: opt_ts(row.try_get("verification_key_sent_at")?),
		version: row.try_get("version")?,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

async fn fetch_one_by(
	conn: &mut SqliteConnection,
	condition: &str,
	values: &[&str],
) -> ClResult<Option<UserAccount>> {
	let sql = format!("{} {}", SELECT_USER_ACCOUNT, condition);
	let mut query = sqlx::query(&sql);
	for value in values {
		query = query.bind(*value);
	}
	let row = query.fetch_optional(&mut *conn).await.map_err(db_err)?;

	row.as_ref().map(user_account_from_row).transpose().map_err(db_err)
}

pub(crate) async fn read_user_account(
	conn: &mut SqliteConnection,
	id: Uuid,
) -> ClResult<Option<UserAccount>> {
	let sql = format!("{} WHERE u.id = ?1", SELECT_USER_ACCOUNT);
	let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await.map_err(db_err)?;

	row.as_ref().map(user_account_from_row).transpose().map_err(db_err)
}

pub(crate) async fn find_by_email(
	conn: &mut SqliteConnection,
	email: &str,
) -> ClResult<Option<UserAccount>> {
	fetch_one_by(conn, "WHERE u.email = ?1", &[email]).await
}

pub(crate) async fn find_by_verification_key(
	conn: &mut SqliteConnection,
	key: &str,
) -> ClResult<Option<UserAccount>> {
	fetch_one_by(conn, "WHERE u.verification_key = ?1", &[key]).await
}

/// The account an external provider subject is linked to
pub(crate) async fn find_by_external(
	conn: &mut SqliteConnection,
	provider: &str,
	subject: &str,
) -> ClResult<Option<UserAccount>> {
	fetch_one_by(
		conn,
		"JOIN external_accounts e ON e.user_account_id = u.id
		WHERE e.provider = ?1 AND e.subject = ?2",
		&[provider, subject],
	)
	.await
}

pub(crate) async fn list_user_accounts(conn: &mut SqliteConnection) -> ClResult<Vec<UserAccount>> {
	let sql = format!("{} ORDER BY u.created_at, u.email", SELECT_USER_ACCOUNT);
	let rows = sqlx::query(&sql).fetch_all(&mut *conn).await.map_err(db_err)?;
	collect_res(rows.iter().map(user_account_from_row))
}

pub(crate) async fn insert_user_account(
	conn: &mut SqliteConnection,
	account: &UserAccount,
) -> ClResult<u64> {
	let res = sqlx::query(
		"INSERT INTO user_accounts (id, email, is_email_verified, email_verified_at, password_hash,
			password_changed_at, is_login_allowed, failed_login_count, last_login_at,
			last_failed_login_at, verification_key, verification_purpose, verification_key_sent_at,
			version, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
	)
	.bind(account.id)
	.bind(account.email.as_deref())
	.bind(account.is_email_verified)
	.bind(account.email_verified_at.map(|t| t.0))
	.bind(account.password_hash.as_deref())
	.bind(account.password_changed_at.map(|t| t.0))
	.bind(account.is_login_allowed)
	.bind(account.failed_login_count)
	.bind(account.last_login_at.map(|t| t.0))
	.bind(account.last_failed_login_at.map(|t| t.0))
	.bind(account.verification_key.as_deref())
	.bind(account.verification_purpose)
	.bind(account.verification_key_sent_at.map(|t| t.0))
	.bind(account.version)
	.bind(account.created_at.0)
	.bind(account.updated_at.0)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	Ok(res.rows_affected())
}

/// Update an account guarded by its version
pub(crate) async fn update_user_account(
	conn: &mut SqliteConnection,
	account: &UserAccount,
) -> ClResult<u64> {
	let res = sqlx::query(
		"UPDATE user_accounts SET email = ?1, is_email_verified = ?2, email_verified_at = ?3,
			password_hash = ?4, password_changed_at = ?5, is_login_allowed = ?6,
			failed_login_count = ?7, last_login_at = ?8, last_failed_login_at = ?9,
			verification_key = ?10, verification_purpose = ?11, verification_key_sent_at = ?12,
			version = version + 1, updated_at = ?13
		WHERE id = ?14 AND version = ?15",
	)
	.bind(account.email.as_deref())
	.bind(account.is_email_verified)
	.bind(account.email_verified_at.map(|t| t.0))
	.bind(account.password_hash.as_deref())
	.bind(account.password_changed_at.map(|t| t.0))
	.bind(account.is_login_allowed)
	.bind(account.failed_login_count)
	.bind(account.last_login_at.map(|t| t.0))
	.bind(account.last_failed_login_at.map(|t| t.0))
	.bind(account.verification_key.as_deref())
	.bind(account.verification_purpose)
	.bind(account.verification_key_sent_at.map(|t| t.0))
	.bind(now().0)
	.bind(account.id)
	.bind(account.version)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	require_version(res.rows_affected(), "user account", account.id, account.version)
}

/// Delete an account guarded by its version. External accounts and claims go
/// with it (ON DELETE CASCADE).
pub(crate) async fn delete_user_account(
	conn: &mut SqliteConnection,
	id: Uuid,
	version: i64,
) -> ClResult<u64> {
	let res = sqlx::query("DELETE FROM user_accounts WHERE id = ?1 AND version = ?2")
		.bind(id)
		.bind(version)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?;

	require_version(res.rows_affected(), "user account", id, version)
}

// vim: ts=4
