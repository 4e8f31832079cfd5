//! Unit of work tests: saving, closing, concurrency and schema initialization

use std::task::{Context, Poll, Waker};
use std::time::Duration;

use idstore_config_adapter_sqlite::ConfigAdapterSqlite;
use idstore_types::config_adapter::{
	Client, ConfigurationContext, ConfigurationStore, IdentityResource, with_configuration,
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

/// Poll `save_changes()` at most `polls` times, then drop it
fn poll_save(ctx: &mut dyn ConfigurationContext, polls: usize) -> Option<ClResult<u64>> {
	let mut cx = Context::from_waker(Waker::noop());
	let mut save = ctx.save_changes();
	for _ in 0..polls {
		if let Poll::Ready(res) = save.as_mut().poll(&mut cx) {
			return Some(res);
		}
		std::thread::sleep(Duration::from_millis(2));
	}
	None
}

#[tokio::test]
async fn test_missing_db_dir_is_rejected() {
	let err = ConfigAdapterSqlite::new(&StoreOptions::default()).await.unwrap_err();
	assert!(matches!(err, Error::MissingConfig("db_dir")), "got {:?}", err);
}

#[tokio::test]
async fn test_save_without_changes_returns_zero() {
	let (adapter, _temp) = create_test_adapter().await;
	let mut ctx = adapter.open().await.unwrap();

	assert!(!ctx.has_changes());
	assert_eq!(ctx.save_changes().await.unwrap(), 0);

	ctx.add_client(Client::new("web-app")).unwrap();
	assert!(ctx.has_changes());
	assert_eq!(ctx.save_changes().await.unwrap(), 1);
	assert!(!ctx.has_changes());
	assert_eq!(ctx.save_changes().await.unwrap(), 0);
}

#[tokio::test]
async fn test_pending_changes_are_invisible_until_saved() {
	let (adapter, _temp) = create_test_adapter().await;
	let mut ctx = adapter.open().await.unwrap();

	ctx.add_client(Client::new("web-app")).unwrap();
	assert!(ctx.find_client("web-app").await.unwrap().is_none());

	ctx.discard_changes();
	assert!(!ctx.has_changes());
	assert_eq!(ctx.save_changes().await.unwrap(), 0);
	assert!(ctx.list_clients().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_operations_after_close_are_disposed() {
	let (adapter, _temp) = create_test_adapter().await;
	let client = Client::new("web-app");

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_client(client.clone()).unwrap();
	ctx.close();
	assert!(ctx.is_closed());
	assert!(!ctx.has_changes(), "closing discards queued changes");

	assert!(matches!(ctx.read_client(client.id).await, Err(Error::Disposed)));
	assert!(matches!(ctx.list_identity_resources().await, Err(Error::Disposed)));
	assert!(matches!(ctx.add_client(Client::new("other")), Err(Error::Disposed)));
	assert!(matches!(ctx.remove_client(&client), Err(Error::Disposed)));
	assert!(matches!(ctx.save_changes().await, Err(Error::Disposed)));

	// Closing twice is harmless
	ctx.close();
	assert!(ctx.is_closed());

	// The discarded client never reached the database
	let mut ctx = adapter.open().await.unwrap();
	assert!(ctx.read_client(client.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_with_configuration_closes_context() {
	let (adapter, _temp) = create_test_adapter().await;

	let affected = with_configuration(&adapter, async |ctx| {
		ctx.add_identity_resource(IdentityResource::new("openid"))?;
		ctx.add_identity_resource(IdentityResource::new("profile"))?;
		ctx.save_changes().await
	})
	.await
	.unwrap();
	assert_eq!(affected, 2);

	let names = with_configuration(&adapter, async |ctx| {
		let resources = ctx.list_identity_resources().await?;
		Ok(resources.into_iter().map(|r| r.name).collect::<Vec<_>>())
	})
	.await
	.unwrap();
	let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
	assert_eq!(names, ["openid", "profile"]);

	let err = with_configuration(&adapter, async |ctx| {
		ctx.add_client(Client::new(""))?;
		ctx.save_changes().await
	})
	.await
	.unwrap_err();
	assert!(matches!(err, Error::ValidationError(_)));
}

#[tokio::test]
async fn test_concurrent_update_is_conflict() {
	let (adapter, _temp) = create_test_adapter().await;
	let mut client = Client::new("web-app");
	client.add_scope("openid");

	let mut setup = adapter.open().await.unwrap();
	setup.add_client(client.clone()).unwrap();
	setup.save_changes().await.unwrap();
	setup.close();

	let mut first = adapter.open().await.unwrap();
	let mut second = adapter.open().await.unwrap();
	let mut first_copy = first.read_client(client.id).await.unwrap().unwrap();
	let mut second_copy = second.read_client(client.id).await.unwrap().unwrap();

	first_copy.client_name = Some("First".into());
	first.update_client(first_copy).unwrap();
	first.save_changes().await.unwrap();

	second_copy.client_name = Some("Second".into());
	second_copy.add_scope("profile");
	second.update_client(second_copy).unwrap();
	let err = second.save_changes().await.unwrap_err();
	assert!(err.is_conflict(), "got {:?}", err);
	assert!(second.has_changes(), "failed save keeps the queued change");

	let stored = second.read_client(client.id).await.unwrap().unwrap();
	assert_eq!(stored.client_name.as_deref(), Some("First"));
	assert_eq!(stored.version, 2);
	assert!(!stored.has_scope("profile"));
}

#[tokio::test]
async fn test_stale_remove_is_conflict() {
	let (adapter, _temp) = create_test_adapter().await;
	let res = IdentityResource::new("email");

	let mut ctx = adapter.open().await.unwrap();
	ctx.add_identity_resource(res.clone()).unwrap();
	ctx.save_changes().await.unwrap();

	let mut fresh = ctx.read_identity_resource(res.id).await.unwrap().unwrap();
	fresh.required = true;
	ctx.update_identity_resource(fresh).unwrap();
	ctx.save_changes().await.unwrap();

	// `res` still carries version 1
	ctx.remove_identity_resource(&res).unwrap();
	assert!(ctx.save_changes().await.unwrap_err().is_conflict());
	assert!(ctx.read_identity_resource(res.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_save_writes_nothing() {
	let (adapter, _temp) = create_test_adapter().await;
	let mut ctx = adapter.open().await.unwrap();

	ctx.add_client(Client::new("web-app")).unwrap();
	ctx.add_identity_resource(IdentityResource::new("openid")).unwrap();
	ctx.add_identity_resource(IdentityResource::new("openid")).unwrap();

	let err = ctx.save_changes().await.unwrap_err();
	assert!(matches!(err, Error::Persistence(PersistenceError::Constraint)), "got {:?}", err);
	assert!(ctx.has_changes());
	assert!(ctx.find_client("web-app").await.unwrap().is_none());
	assert!(ctx.list_identity_resources().await.unwrap().is_empty());

	ctx.discard_changes();
	assert_eq!(ctx.save_changes().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reopen_keeps_schema_and_data() {
	let temp_dir = TempDir::new().unwrap();
	let opts = StoreOptions::new(temp_dir.path());

	let adapter = ConfigAdapterSqlite::new(&opts).await.unwrap();
	assert_eq!(adapter.schema_version().await.unwrap(), 1);
	let mut ctx = adapter.open().await.unwrap();
	ctx.add_client(Client::new("web-app")).unwrap();
	ctx.save_changes().await.unwrap();
	ctx.close();
	drop(adapter);

	let adapter = ConfigAdapterSqlite::new(&opts).await.unwrap();
	assert_eq!(adapter.schema_version().await.unwrap(), 1);
	let mut ctx = adapter.open().await.unwrap();
	assert!(ctx.find_client("web-app").await.unwrap().is_some());
	assert!(temp_dir.path().join("config.db").exists());
}

#[tokio::test]
async fn test_cancelled_save_is_never_applied_twice() {
	for polls in 1..=8 {
		let (adapter, _temp) = create_test_adapter().await;
		let mut client = Client::new("web-app");
		client.add_scope("openid").add_scope("profile");

		let mut ctx = adapter.open().await.unwrap();
		ctx.add_client(client.clone()).unwrap();
		let finished = poll_save(&mut *ctx, polls);
		let retry = ctx.save_changes().await;

		let mut other = adapter.open().await.unwrap();
		let stored = other.read_client(client.id).await.unwrap();
		match (finished, retry) {
			(Some(res), retry) => {
				assert_eq!(res.unwrap(), 3);
				assert_eq!(retry.unwrap(), 0);
				assert!(stored.is_some());
			}
			// Cancelled before commit: rolled back, so the retry applies it
			(None, Ok(affected)) => {
				assert_eq!(affected, 3, "after {} polls", polls);
				assert_eq!(stored.map(|c| c.scopes.len()), Some(2));
			}
			// Cancelled during commit: dropped from the queue, never re-applied
			(None, Err(err)) => {
				assert!(
					matches!(err, Error::Persistence(PersistenceError::Interrupted)),
					"after {} polls: {:?}",
					polls,
					err
				);
			}
		}

		assert!(!ctx.has_changes());
		assert_eq!(ctx.save_changes().await.unwrap(), 0);
		let clients = other.list_clients().await.unwrap();
		assert!(clients.len() <= 1);
	}
}

#[tokio::test]
async fn test_newer_schema_is_rejected() {
	let temp_dir = TempDir::new().unwrap();
	let opts = StoreOptions::new(temp_dir.path());
	drop(ConfigAdapterSqlite::new(&opts).await.unwrap());

	let conn_opts =
		sqlx::sqlite::SqliteConnectOptions::new().filename(temp_dir.path().join("config.db"));
	let db = sqlx::SqlitePool::connect_with(conn_opts).await.unwrap();
	sqlx::query("UPDATE vars SET value = '2' WHERE key = 'db_version'")
		.execute(&db)
		.await
		.unwrap();
	db.close().await;

	let err = ConfigAdapterSqlite::new(&opts).await.unwrap_err();
	assert!(matches!(err, Error::Internal(_)), "got {:?}", err);
}

// vim: ts=4
