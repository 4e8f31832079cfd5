//! External account operations

use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

use crate::utils::*;
use idstore_types::{prelude::*, user_account_adapter::ExternalAccount};

const SELECT_EXTERNAL_ACCOUNT: &str = "SELECT id, user_account_id, provider, subject, email,
	last_login_at, created_at
	FROM external_accounts";

fn external_account_from_row(row: &SqliteRow) -> Result<ExternalAccount, sqlx::Error> {
	Ok(ExternalAccount {
		id: row.try_get("id")?,
		user_account_id: row.try_get("user_account_id")?,
		provider: row.try_get("provider")?,
		subject: row.try_get("subject")?,
		email: row.try_get("email")?,
		last_login_at: opt_ts(row.try_get("last_login_at")?),
		created_at: Timestamp(row.try_get("created_at")?),
	})
}

pub(crate) async fn find_external_account(
	conn: &mut SqliteConnection,
	provider: &str,
	subject: &str,
) -> ClResult<Option<ExternalAccount>> {
	let sql = format!("{} WHERE provider = ?1 AND subject = ?2", SELECT_EXTERNAL_ACCOUNT);
	let row = sqlx::query(&sql)
		.bind(provider)
		.bind(subject)
		.fetch_optional(&mut *conn)
		.await
		.map_err(db_err)?;

	row.as_ref().map(external_account_from_row).transpose().map_err(db_err)
}

pub(crate) async fn list_external_accounts(
	conn: &mut SqliteConnection,
	user_account_id: Uuid,
) -> ClResult<Vec<ExternalAccount>> {
	let sql = format!(
		"{} WHERE user_account_id = ?1 ORDER BY provider, subject",
		SELECT_EXTERNAL_ACCOUNT
	);
	let rows =
		sqlx::query(&sql).bind(user_account_id).fetch_all(&mut *conn).await.map_err(db_err)?;
	collect_res(rows.iter().map(external_account_from_row))
}

pub(crate) async fn insert_external_account(
	conn: &mut SqliteConnection,
	account: &ExternalAccount,
) -> ClResult<u64> {
	let res = sqlx::query(
		"INSERT INTO external_accounts (id, user_account_id, provider, subject, email,
			last_login_at, created_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
	)
	.bind(account.id)
	.bind(account.user_account_id)
	.bind(account.provider.as_ref())
	.bind(account.subject.as_ref())
	.bind(account.email.as_deref())
	.bind(account.last_login_at.map(|t| t.0))
	.bind(account.created_at.0)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	Ok(res.rows_affected())
}

pub(crate) async fn update_external_account(
	conn: &mut SqliteConnection,
	account: &ExternalAccount,
) -> ClResult<u64> {
	let res = sqlx::query(
		"UPDATE external_accounts SET user_account_id = ?1, provider = ?2, subject = ?3,
			email = ?4, last_login_at = ?5
		WHERE id = ?6",
	)
	.bind(account.user_account_id)
	.bind(account.provider.as_ref())
	.bind(account.subject.as_ref())
	.bind(account.email.as_deref())
	.bind(account.last_login_at.map(|t| t.0))
	.bind(account.id)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	require_found(res.rows_affected(), "external account", account.id)
}

pub(crate) async fn delete_external_account(
	conn: &mut SqliteConnection,
	id: Uuid,
) -> ClResult<u64> {
	let res = sqlx::query("DELETE FROM external_accounts WHERE id = ?1")
		.bind(id)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?;

	require_found(res.rows_affected(), "external account", id)
}

// vim: ts=4
