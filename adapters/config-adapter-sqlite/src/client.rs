//! Client and client scope operations

use std::collections::HashMap;

use sqlx::{Row, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

use crate::utils::*;
use idstore_types::{config_adapter::*, prelude::*};

const SELECT_CLIENT: &str = "SELECT id, client_id, client_name, description, enabled,
	require_consent,
	allow_offline_access, access_token_lifetime, redirect_uris, allowed_grant_types,
	version, created_at, updated_at
	FROM clients";

fn client_from_row(row: &SqliteRow) -> Result<Client, sqlx::Error> {
	let redirect_uris: String = row.try_get("redirect_uris")?;
	let allowed_grant_types: String = row.try_get("allowed_grant_types")?;
	Ok(Client {
		id: row.try_get("id")?,
		client_id: row.try_get("client_id")?,
		client_name: row.try_get("client_name")?,
		description: row.try_get("description")?,
		enabled: row.try_get("enabled")?,
		require_consent: row.try_get("require_consent")?,
		allow_offline_access: row.try_get("allow_offline_access")?,
		access_token_lifetime: row.try_get("access_token_lifetime")?,
		redirect_uris: parse_json_list(&redirect_uris)?,
		allowed_grant_types: parse_json_list(&allowed_grant_types)?,
		scopes: Vec::new(),
		version: row.try_get("version")?,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

fn scope_from_row(row: &SqliteRow) -> Result<ClientScope, sqlx::Error> {
	Ok(ClientScope {
		id: row.try_get("id")?,
		scope: row.try_get("scope")?,
		client_id: row.try_get("client_id")?,
	})
}

async fn read_scopes(conn: &mut SqliteConnection, client_id: Uuid) -> ClResult<Vec<ClientScope>> {
	let rows = sqlx::query(
		"SELECT id, client_id, scope FROM client_scopes WHERE client_id = ?1 ORDER BY scope",
	)
	.bind(client_id)
	.fetch_all(&mut *conn)
	.await
	.map_err(db_err)?;

	collect_res(rows.iter().map(scope_from_row))
}

async fn with_scopes(
	conn: &mut SqliteConnection,
	row: Option<SqliteRow>,
) -> ClResult<Option<Client>> {
	let Some(row) = row else {
		return Ok(None);
	};
	let mut client = client_from_row(&row).map_err(db_err)?;
	client.scopes = read_scopes(conn, client.id).await?;
	Ok(Some(client))
}

/// Read a client with its scopes by row id
pub(crate) async fn read_client(conn: &mut SqliteConnection, id: Uuid) -> ClResult<Option<Client>> {
	let sql = format!("{} WHERE id = ?1", SELECT_CLIENT);
	let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await.map_err(db_err)?;

	with_scopes(conn, row).await
}

/// Read a client with its scopes by OAuth client identifier
pub(crate) async fn find_client(
	conn: &mut SqliteConnection,
	client_id: &str,
) -> ClResult<Option<Client>> {
	let sql = format!("{} WHERE client_id = ?1", SELECT_CLIENT);
	let row = sqlx::query(&sql).bind(client_id).fetch_optional(&mut *conn).await.map_err(db_err)?;

	with_scopes(conn, row).await
}

/// List all clients with their scopes
pub(crate) async fn list_clients(conn: &mut SqliteConnection) -> ClResult<Vec<Client>> {
	let sql = format!("{} ORDER BY client_id", SELECT_CLIENT);
	let rows = sqlx::query(&sql).fetch_all(&mut *conn).await.map_err(db_err)?;
	let mut clients = collect_res(rows.iter().map(client_from_row))?;

	let scope_rows = sqlx::query("SELECT id, client_id, scope FROM client_scopes ORDER BY scope")
		.fetch_all(&mut *conn)
		.await
		.map_err(db_err)?;
	let mut scopes: HashMap<Uuid, Vec<ClientScope>> = HashMap::new();
	for scope in collect_res(scope_rows.iter().map(scope_from_row))? {
		scopes.entry(scope.client_id).or_default().push(scope);
	}

	for client in &mut clients {
		client.scopes = scopes.remove(&client.id).unwrap_or_default();
	}
	Ok(clients)
}

async fn insert_scopes(conn: &mut SqliteConnection, scopes: &[ClientScope]) -> ClResult<u64> {
	let mut affected = 0;
	for scope in scopes {
		affected += sqlx::query(
			"INSERT INTO client_scopes (id, client_id, scope) VALUES (?1, ?2, ?3)",
		)
			.bind(scope.id)
			.bind(scope.client_id)
			.bind(scope.scope.as_ref())
			.execute(&mut *conn)
			.await
			.map_err(db_err)?
			.rows_affected();
	}
	Ok(affected)
}

/// Insert a client and its scopes
pub(crate) async fn insert_client(conn: &mut SqliteConnection, client: &Client) -> ClResult<u64> {
	let res = sqlx::query(
		"INSERT INTO clients (id, client_id, client_name, description, enabled, require_consent,
			allow_offline_access, access_token_lifetime, redirect_uris, allowed_grant_types,
			version, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
	)
	.bind(client.id)
	.bind(client.client_id.as_ref())
	.bind(client.client_name.as_deref())
	.bind(client.description.as_deref())
	.bind(client.enabled)
	.bind(client.require_consent)
	.bind(client.allow_offline_access)
	.bind(client.access_token_lifetime)
	.bind(to_json_list(&client.redirect_uris)?)
	.bind(to_json_list(&client.allowed_grant_types)?)
	.bind(client.version)
	.bind(client.created_at.0)
	.bind(client.updated_at.0)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	Ok(res.rows_affected() + insert_scopes(conn, &client.scopes).await?)
}

/// Update a client guarded by its version and replace its scopes
pub(crate) async fn update_client(conn: &mut SqliteConnection, client: &Client) -> ClResult<u64> {
	let res = sqlx::query(
		"UPDATE clients SET client_id = ?1, client_name = ?2, description = ?3, enabled = ?4,
			require_consent = ?5, allow_offline_access = ?6, access_token_lifetime = ?7,
			redirect_uris = ?8, allowed_grant_types = ?9,
			version = version + 1, updated_at = ?10
		WHERE id = ?11 AND version = ?12",
	)
	.bind(client.client_id.as_ref())
	.bind(client.client_name.as_deref())
	.bind(client.description.as_deref())
	.bind(client.enabled)
	.bind(client.require_consent)
	.bind(client.allow_offline_access)
	.bind(client.access_token_lifetime)
	.bind(to_json_list(&client.redirect_uris)?)
	.bind(to_json_list(&client.allowed_grant_types)?)
	.bind(now().0)
	.bind(client.id)
	.bind(client.version)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	if res.rows_affected() == 0 {
		warn!(
			"Concurrency conflict updating client {} (version {})",
			client.client_id, client.version
		);
		return Err(PersistenceError::Conflict.into());
	}

	let removed = sqlx::query("DELETE FROM client_scopes WHERE client_id = ?1")
		.bind(client.id)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?
		.rows_affected();

	Ok(res.rows_affected() + removed + insert_scopes(conn, &client.scopes).await?)
}

/// Delete a client guarded by its version. Scopes go with it (ON DELETE CASCADE).
pub(crate) async fn delete_client(
	conn: &mut SqliteConnection,
	id: Uuid,
	version: i64,
) -> ClResult<u64> {
	let res = sqlx::query("DELETE FROM clients WHERE id = ?1 AND version = ?2")
		.bind(id)
		.bind(version)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?;

	if res.rows_affected() == 0 {
		warn!("Concurrency conflict deleting client {} (version {})", id, version);
		return Err(PersistenceError::Conflict.into());
	}
	Ok(res.rows_affected())
}

// vim: ts=4
