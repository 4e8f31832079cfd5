//! User account claim operations

use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

use crate::utils::*;
use idstore_types::{prelude::*, user_account_adapter::UserAccountClaim};

fn claim_from_row(row: &SqliteRow) -> Result<UserAccountClaim, sqlx::Error> {
	Ok(UserAccountClaim {
		id: row.try_get("id")?,
		user_account_id: row.try_get("user_account_id")?,
		claim_type: row.try_get("claim_type")?,
		value: row.try_get("value")?,
	})
}

pub(crate) async fn list_claims(
	conn: &mut SqliteConnection,
	user_account_id: Uuid,
) -> ClResult<Vec<UserAccountClaim>> {
	let rows = sqlx::query(
		"SELECT id, user_account_id, claim_type, value FROM user_account_claims
		WHERE user_account_id = ?1 ORDER BY claim_type, value",
	)
	.bind(user_account_id)
	.fetch_all(&mut *conn)
	.await
	.map_err(db_err)?;

	collect_res(rows.iter().map(claim_from_row))
}

pub(crate) async fn insert_claim(
	conn: &mut SqliteConnection,
	claim: &UserAccountClaim,
) -> ClResult<u64> {
	let res = sqlx::query(
		"INSERT INTO user_account_claims (id, user_account_id, claim_type, value)
		VALUES (?1, ?2, ?3, ?4)",
	)
	.bind(claim.id)
	.bind(claim.user_account_id)
	.bind(claim.claim_type.as_ref())
	.bind(claim.value.as_ref())
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	Ok(res.rows_affected())
}

pub(crate) async fn update_claim(
	conn: &mut SqliteConnection,
	claim: &UserAccountClaim,
) -> ClResult<u64> {
	let res = sqlx::query(
		"UPDATE user_account_claims SET user_account_id = ?1, claim_type = ?2, value = ?3
		WHERE id = ?4",
	)
	.bind(claim.user_account_id)
	.bind(claim.claim_type.as_ref())
	.bind(claim.value.as_ref())
	.bind(claim.id)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	require_found(res.rows_affected(), "claim", claim.id)
}

pub(crate) async fn delete_claim(conn: &mut SqliteConnection, id: Uuid) -> ClResult<u64> {
	let res = sqlx::query("DELETE FROM user_account_claims WHERE id = ?1")
		.bind(id)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?;

	require_found(res.rows_affected(), "claim", id)
}

// vim: ts=4
