//! Identity resource and API resource persistence tests

use idstore_config_adapter_sqlite::ConfigAdapterSqlite;
use idstore_types::config_adapter::{
	ApiResource, ConfigurationContext, ConfigurationStore, IdentityResource,
};
use idstore_types::options::StoreOptions;
use idstore_types::prelude::*;
use tempfile::TempDir;

async fn create_test_adapter() -> (ConfigAdapterSqlite, TempDir) {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
		.try_init();

	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = ConfigAdapterSqlite::new(&StoreOptions::new(temp_dir.path()))
		.await
		.expect("Failed to create adapter");

	(adapter, temp_dir)
}

fn identity_resource(name: &str, claims: &[&str]) -> IdentityResource {
	let mut res = IdentityResource::new(name);
	res.user_claims = claims.iter().map(|c| Box::from(*c)).collect();
	res
}

fn api_resource(name: &str, scopes: &[&str]) -> ApiResource {
	let mut res = ApiResource::new(name);
	res.scopes = scopes.iter().map(|s| Box::from(*s)).collect();
	res
}

#[tokio::test]
async fn test_identity_resource_round_trip() {
	let (adapter, _temp) = create_test_adapter().await;

	let mut res = identity_resource("profile", &["name", "family_name", "given_name"]);
	res.display_name = Some("User profile".into());
	res.description = Some("Your name and profile picture".into());
	res.emphasize = true;
	res.show_in_discovery_document = false;

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_identity_resource(res.clone()).unwrap();
	assert_eq!(ctx.save_changes().await.unwrap(), 1);

	// Read back through a fresh context
	let mut ctx = adapter.open().await.unwrap();
	let stored = ctx.read_identity_resource(res.id).await.unwrap().expect("resource should exist");
	assert_eq!(stored, res);

	let by_name = ctx.find_identity_resource("profile").await.unwrap().unwrap();
	assert_eq!(by_name, res);
}

#[tokio::test]
async fn test_find_identity_resources_by_scope() {
	let (adapter, _temp) = create_test_adapter().await;

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_identity_resource(identity_resource("openid", &["sub"])).unwrap();
	ctx.add_identity_resource(identity_resource("profile", &["name"])).unwrap();
	ctx.add_identity_resource(identity_resource("email", &["email", "email_verified"])).unwrap();
	ctx.save_changes().await.unwrap();

	let found =
		ctx.find_identity_resources_by_scope(&["profile", "openid", "unknown"]).await.unwrap();
	let names: Vec<&str> = found.iter().map(|r| r.name.as_ref()).collect();
	assert_eq!(names, vec!["openid", "profile"]);

	assert!(ctx.find_identity_resources_by_scope(&[]).await.unwrap().is_empty());
	assert_eq!(ctx.list_identity_resources().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_update_identity_resource_bumps_version() {
	let (adapter, _temp) = create_test_adapter().await;
	let res = identity_resource("email", &["email"]);

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_identity_resource(res.clone()).unwrap();
	ctx.save_changes().await.unwrap();

	let mut stored = ctx.read_identity_resource(res.id).await.unwrap().unwrap();
	stored.user_claims.push("email_verified".into());
	stored.required = true;
	ctx.update_identity_resource(stored).unwrap();
	assert_eq!(ctx.save_changes().await.unwrap(), 1);

	let updated = ctx.read_identity_resource(res.id).await.unwrap().unwrap();
	assert_eq!(updated.version, 2);
	assert!(updated.required);
	assert_eq!(updated.user_claims.len(), 2);
	assert!(updated.updated_at >= updated.created_at);
}

#[tokio::test]
async fn test_remove_identity_resource() {
	let (adapter, _temp) = create_test_adapter().await;
	let res = identity_resource("phone", &["phone_number"]);

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_identity_resource(res.clone()).unwrap();
	ctx.save_changes().await.unwrap();

	ctx.remove_identity_resource(&res).unwrap();
	assert_eq!(ctx.save_changes().await.unwrap(), 1);
	assert!(ctx.read_identity_resource(res.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_api_resource_round_trip() {
	let (adapter, _temp) = create_test_adapter().await;

	let mut res = api_resource("orders", &["orders.read", "orders.write"]);
	res.display_name = Some("Orders API".into());
	res.user_claims = vec!["role".into()];

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_api_resource(res.clone()).unwrap();
	ctx.save_changes().await.unwrap();

	let stored = ctx.read_api_resource(res.id).await.unwrap().expect("resource should exist");
	assert_eq!(stored, res);
	assert_eq!(ctx.find_api_resource("orders").await.unwrap(), Some(res));
	assert!(ctx.find_api_resource("billing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_api_resources_by_scope() {
	let (adapter, _temp) = create_test_adapter().await;

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_api_resource(api_resource("orders", &["orders.read", "orders.write"])).unwrap();
	ctx.add_api_resource(api_resource("billing", &["billing.read"])).unwrap();
	ctx.add_api_resource(api_resource("catalog", &["catalog.read", "orders.read"])).unwrap();
	ctx.save_changes().await.unwrap();

	let found = ctx.find_api_resources_by_scope(&["orders.read"]).await.unwrap();
	let names: Vec<&str> = found.iter().map(|r| r.name.as_ref()).collect();
	assert_eq!(names, vec!["catalog", "orders"]);

	let found = ctx.find_api_resources_by_scope(&["billing.read", "orders.write"]).await.unwrap();
	let names: Vec<&str> = found.iter().map(|r| r.name.as_ref()).collect();
	assert_eq!(names, vec!["billing", "orders"]);

	assert!(ctx.find_api_resources_by_scope(&["unknown"]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_resource_name_is_constraint_violation() {
	let (adapter, _temp) = create_test_adapter().await;
	let mut ctx = adapter.open().await.unwrap();

	ctx.add_api_resource(api_resource("orders", &[])).unwrap();
	ctx.save_changes().await.unwrap();

	ctx.add_api_resource(api_resource("orders", &["orders.read"])).unwrap();
	let err = ctx.save_changes().await.unwrap_err();
	assert!(matches!(err, Error::Persistence(PersistenceError::Constraint)), "got {:?}", err);
}

// vim: ts=4
