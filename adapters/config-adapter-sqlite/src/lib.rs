//! SQLite-backed configuration store.
//!
//! Holds clients (with their scopes), identity resources and API resources in
//! `config.db` inside the configured directory. The schema is migrated once,
//! when the adapter is constructed.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};

use idstore_types::{
	config_adapter::{ConfigurationContext, ConfigurationStore},
	options::StoreOptions,
	prelude::*,
};

mod client;
mod context;
mod resource;
mod schema;
mod utils;

pub use context::SqliteConfigurationContext;

use crate::utils::db_err;

pub const DB_FILE: &str = "config.db";

#[derive(Debug)]
pub struct ConfigAdapterSqlite {
	db: SqlitePool,
}

impl ConfigAdapterSqlite {
	/// Open (creating if needed) the configuration database and bring its
	/// schema up to date
	pub async fn new(opts: &StoreOptions) -> ClResult<Self> {
		let path = opts.db_file(DB_FILE)?;
		if let Some(dir) = path.parent() {
			tokio::fs::create_dir_all(dir).await?;
		}

		let conn_opts = sqlite::SqliteConnectOptions::new()
			.filename(&path)
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.foreign_keys(true)
			.busy_timeout(opts.busy_timeout);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(opts.max_connections)
			.acquire_timeout(opts.acquire_timeout)
			.connect_with(conn_opts)
			.await
			.map_err(db_err)?;

		let version = schema::init_db(&db).await.inspect_err(|err| {
			error!("Configuration schema initialization failed: {}", err);
		})?;
		info!("Configuration store ready at {} (schema v{})", path.display(), version);

		Ok(Self { db })
	}
}

#[async_trait]
impl ConfigurationStore for ConfigAdapterSqlite {
	async fn open(&self) -> ClResult<Box<dyn ConfigurationContext>> {
		let conn = self.db.acquire().await.map_err(db_err)?;
		Ok(Box::new(SqliteConfigurationContext::new(conn)))
	}

	async fn schema_version(&self) -> ClResult<i64> {
		schema::read_db_version(&self.db).await
	}
}

// vim: ts=4
