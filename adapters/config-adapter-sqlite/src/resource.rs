//! Identity resource and API resource operations

use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, sqlite::SqliteRow};
use uuid::Uuid;

use crate::utils::*;
use idstore_types::{config_adapter::*, prelude::*};

const SELECT_IDENTITY_RESOURCE: &str = "SELECT id, name, display_name, description, enabled,
	required, emphasize, show_in_discovery_document, user_claims, version, created_at, updated_at
	FROM identity_resources";

const SELECT_API_RESOURCE: &str = "SELECT id, name, display_name, description, enabled,
	scopes, user_claims, version, created_at, updated_at
	FROM api_resources";

fn identity_resource_from_row(row: &SqliteRow) -> Result<IdentityResource, sqlx::Error> {
	let user_claims: String = row.try_get("user_claims")?;
	Ok(IdentityResource {
		id: row.try_get("id")?,
		name: row.try_get("name")?,
		display_name: row.try_get("display_name")?,
		description: row.try_get("description")?,
		enabled: row.try_get("enabled")?,
		required: row.try_get("required")?,
		emphasize: row.try_get("emphasize")?,
		show_in_discovery_document: row.try_get("show_in_discovery_document")?,
		user_claims: parse_json_list(&user_claims)?,
		version: row.try_get("version")?,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

fn api_resource_from_row(row: &SqliteRow) -> Result<ApiResource, sqlx::Error> {
	let scopes: String = row.try_get("scopes")?;
	let user_claims: String = row.try_get("user_claims")?;
	Ok(ApiResource {
		id: row.try_get("id")?,
		name: row.try_get("name")?,
		display_name: row.try_get("display_name")?,
		description: row.try_get("description")?,
		enabled: row.try_get("enabled")?,
		scopes: parse_json_list(&scopes)?,
		user_claims: parse_json_list(&user_claims)?,
		version: row.try_get("version")?,
		created_at: Timestamp(row.try_get("created_at")?),
		updated_at: Timestamp(row.try_get("updated_at")?),
	})
}

fn check_version(res: &sqlx::sqlite::SqliteQueryResult, what: &str, id: Uuid) -> ClResult<u64> {
	if res.rows_affected() == 0 {
		warn!("Concurrency conflict on {} {}", what, id);
		return Err(PersistenceError::Conflict.into());
	}
	Ok(res.rows_affected())
}

// Identity resources
//********************

pub(crate) async fn read_identity_resource(
	conn: &mut SqliteConnection,
	id: Uuid,
) -> ClResult<Option<IdentityResource>> {
	let sql = format!("{} WHERE id = ?1", SELECT_IDENTITY_RESOURCE);
	let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await.map_err(db_err)?;

	row.as_ref().map(identity_resource_from_row).transpose().map_err(db_err)
}

pub(crate) async fn find_identity_resource(
	conn: &mut SqliteConnection,
	name: &str,
) -> ClResult<Option<IdentityResource>> {
	let sql = format!("{} WHERE name = ?1", SELECT_IDENTITY_RESOURCE);
	let row = sqlx::query(&sql).bind(name).fetch_optional(&mut *conn).await.map_err(db_err)?;

	row.as_ref().map(identity_resource_from_row).transpose().map_err(db_err)
}

/// Identity resources whose name is one of `names`
pub(crate) async fn find_identity_resources_by_scope(
	conn: &mut SqliteConnection,
	names: &[&str],
) -> ClResult<Vec<IdentityResource>> {
	if names.is_empty() {
		return Ok(Vec::new());
	}
	let mut query = QueryBuilder::<Sqlite>::new(SELECT_IDENTITY_RESOURCE);
	query.push(" WHERE name IN ");
	push_in(&mut query, names);
	query.push(" ORDER BY name");

	let rows = query.build().fetch_all(&mut *conn).await.map_err(db_err)?;
	collect_res(rows.iter().map(identity_resource_from_row))
}

pub(crate) async fn list_identity_resources(
	conn: &mut SqliteConnection,
) -> ClResult<Vec<IdentityResource>> {
	let sql = format!("{} ORDER BY name", SELECT_IDENTITY_RESOURCE);
	let rows = sqlx::query(&sql).fetch_all(&mut *conn).await.map_err(db_err)?;
	collect_res(rows.iter().map(identity_resource_from_row))
}

pub(crate) async fn insert_identity_resource(
	conn: &mut SqliteConnection,
	res: &IdentityResource,
) -> ClResult<u64> {
	let result = sqlx::query(
		"INSERT INTO identity_resources (id, name, display_name, description, enabled, required,
			emphasize, show_in_discovery_document, user_claims, version, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
	)
	.bind(res.id)
	.bind(res.name.as_ref())
	.bind(res.display_name.as_deref())
	.bind(res.description.as_deref())
	.bind(res.enabled)
	.bind(res.required)
	.bind(res.emphasize)
	.bind(res.show_in_discovery_document)
	.bind(to_json_list(&res.user_claims)?)
	.bind(res.version)
	.bind(res.created_at.0)
	.bind(res.updated_at.0)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	Ok(result.rows_affected())
}

pub(crate) async fn update_identity_resource(
	conn: &mut SqliteConnection,
	res: &IdentityResource,
) -> ClResult<u64> {
	let result = sqlx::query(
		"UPDATE identity_resources SET name = ?1, display_name = ?2, description = ?3,
			enabled = ?4, required = ?5, emphasize = ?6, show_in_discovery_document = ?7,
			user_claims = ?8, version = version + 1, updated_at = ?9
		WHERE id = ?10 AND version = ?11",
	)
	.bind(res.name.as_ref())
	.bind(res.display_name.as_deref())
	.bind(res.description.as_deref())
	.bind(res.enabled)
	.bind(res.required)
	.bind(res.emphasize)
	.bind(res.show_in_discovery_document)
	.bind(to_json_list(&res.user_claims)?)
	.bind(now().0)
	.bind(res.id)
	.bind(res.version)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	check_version(&result, "identity resource", res.id)
}

pub(crate) async fn delete_identity_resource(
	conn: &mut SqliteConnection,
	id: Uuid,
	version: i64,
) -> ClResult<u64> {
	let result = sqlx::query("DELETE FROM identity_resources WHERE id = ?1 AND version = ?2")
		.bind(id)
		.bind(version)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?;

	check_version(&result, "identity resource", id)
}

// API resources
//***************

pub(crate) async fn read_api_resource(
	conn: &mut SqliteConnection,
	id: Uuid,
) -> ClResult<Option<ApiResource>> {
	let sql = format!("{} WHERE id = ?1", SELECT_API_RESOURCE);
	let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await.map_err(db_err)?;

	row.as_ref().map(api_resource_from_row).transpose().map_err(db_err)
}

pub(crate) async fn find_api_resource(
	conn: &mut SqliteConnection,
	name: &str,
) -> ClResult<Option<ApiResource>> {
	let sql = format!("{} WHERE name = ?1", SELECT_API_RESOURCE);
	let row = sqlx::query(&sql).bind(name).fetch_optional(&mut *conn).await.map_err(db_err)?;

	row.as_ref().map(api_resource_from_row).transpose().map_err(db_err)
}

/// API resources exposing at least one of `scopes`
pub(crate) async fn find_api_resources_by_scope(
	conn: &mut SqliteConnection,
	scopes: &[&str],
) -> ClResult<Vec<ApiResource>> {
	if scopes.is_empty() {
		return Ok(Vec::new());
	}
	let mut query = QueryBuilder::<Sqlite>::new(SELECT_API_RESOURCE);
	query.push(
		" WHERE EXISTS (SELECT 1 FROM json_each(api_resources.scopes) s WHERE s.value IN ",
	);
	push_in(&mut query, scopes);
	query.push(") ORDER BY name");

	let rows = query.build().fetch_all(&mut *conn).await.map_err(db_err)?;
	collect_res(rows.iter().map(api_resource_from_row))
}

pub(crate) async fn list_api_resources(conn: &mut SqliteConnection) -> ClResult<Vec<ApiResource>> {
	let sql = format!("{} ORDER BY name", SELECT_API_RESOURCE);
	let rows = sqlx::query(&sql).fetch_all(&mut *conn).await.map_err(db_err)?;
	collect_res(rows.iter().map(api_resource_from_row))
}

pub(crate) async fn insert_api_resource(
	conn: &mut SqliteConnection,
	res: &ApiResource,
) -> ClResult<u64> {
	let result = sqlx::query(
		"INSERT INTO api_resources (id, name, display_name, description, enabled, scopes,
			user_claims, version, created_at, updated_at)
		VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
	)
	.bind(res.id)
	.bind(res.name.as_ref())
	.bind(res.display_name.as_deref())
	.bind(res.description.as_deref())
	.bind(res.enabled)
	.bind(to_json_list(&res.scopes)?)
	.bind(to_json_list(&res.user_claims)?)
	.bind(res.version)
	.bind(res.created_at.0)
	.bind(res.updated_at.0)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	Ok(result.rows_affected())
}

pub(crate) async fn update_api_resource(
	conn: &mut SqliteConnection,
	res: &ApiResource,
) -> ClResult<u64> {
	let result = sqlx::query(
		"UPDATE api_resources SET name = ?1, display_name = ?2, description = ?3, enabled = ?4,
			scopes = ?5, user_claims = ?6, version = version + 1, updated_at = ?7
		WHERE id = ?8 AND version = ?9",
	)
	.bind(res.name.as_ref())
	.bind(res.display_name.as_deref())
	.bind(res.description.as_deref())
	.bind(res.enabled)
	.bind(to_json_list(&res.scopes)?)
	.bind(to_json_list(&res.user_claims)?)
	.bind(now().0)
	.bind(res.id)
	.bind(res.version)
	.execute(&mut *conn)
	.await
	.map_err(db_err)?;

	check_version(&result, "api resource", res.id)
}

pub(crate) async fn delete_api_resource(
	conn: &mut SqliteConnection,
	id: Uuid,
	version: i64,
) -> ClResult<u64> {
	let result = sqlx::query("DELETE FROM api_resources WHERE id = ?1 AND version = ?2")
		.bind(id)
		.bind(version)
		.execute(&mut *conn)
		.await
		.map_err(db_err)?;

	check_version(&result, "api resource", id)
}

// vim: ts=4
