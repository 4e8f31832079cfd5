//! SQLite-backed user account store.
//!
//! Holds user accounts, their external provider links and their claims in
//! `users.db` inside the configured directory.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use tokio::runtime::Handle;

use idstore_types::{
	options::StoreOptions,
	prelude::*,
	user_account_adapter::{UserAccountContext, UserAccountStore},
};

mod claim;
mod context;
mod external_account;
mod schema;
mod user_account;
mod utils;

pub use context::SqliteUserAccountContext;

use crate::utils::db_err;

pub const DB_FILE: &str = "users.db";

#[derive(Debug)]
pub struct UserAccountAdapterSqlite {
	db: SqlitePool,
}

impl UserAccountAdapterSqlite {
	/// Open (creating if needed) the user account database and bring its
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
			error!("User account schema initialization failed: {}", err);
		})?;
		info!("User account store ready at {} (schema v{})", path.display(), version);

		Ok(Self { db })
	}
}

#[async_trait]
impl UserAccountStore for UserAccountAdapterSqlite {
	async fn open(&self) -> ClResult<Box<dyn UserAccountContext>> {
		let runtime = Handle::try_current().map_err(|err| Error::Internal(err.to_string()))?;
		let conn = self.db.acquire().await.map_err(db_err)?;
		Ok(Box::new(SqliteUserAccountContext::new(conn, runtime)))
	}

	async fn schema_version(&self) -> ClResult<i64> {
		schema::read_db_version(&self.db).await
	}
}

// vim: ts=4
