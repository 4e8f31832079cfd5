//! Creates or upgrades both idstore databases in `IDSTORE_DB_DIR`.
//!
//! Log output is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).

use std::process::ExitCode;
use std::sync::Arc;

use idstore_config_adapter_sqlite::ConfigAdapterSqlite;
use idstore_types::{
	config_adapter::ConfigurationStore, options::StoreOptions, prelude::*,
	user_account_adapter::UserAccountStore,
};
use idstore_user_account_adapter_sqlite::UserAccountAdapterSqlite;

async fn run() -> ClResult<()> {
	let opts = StoreOptions::from_env()?;

	let config: Arc<dyn ConfigurationStore> = Arc::new(ConfigAdapterSqlite::new(&opts).await?);
	let users: Arc<dyn UserAccountStore> = Arc::new(UserAccountAdapterSqlite::new(&opts).await?);

	info!(
		"Schema versions: configuration v{}, user accounts v{}",
		config.schema_version().await?,
		users.schema_version().await?
	);
	Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	match run().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(Error::MissingConfig(name)) => {
			error!("Missing configuration: {} (set IDSTORE_DB_DIR)", name);
			ExitCode::FAILURE
		}
		Err(err) => {
			error!("Migration failed: {}", err);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
