//! Store construction options

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::prelude::*;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options shared by every store adapter.
///
/// `db_dir` has no default: an adapter constructed without it fails with
/// [`Error::MissingConfig`]. Each adapter keeps its own database file inside
/// this directory.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOptions {
	pub db_dir: Option<PathBuf>,
	#[serde(default = "default_max_connections")]
	pub max_connections: u32,
	/// Upper bound for `open()` waiting on a pooled connection
	#[serde_as(as = "DurationSeconds<u64>")]
	#[serde(default = "default_acquire_timeout")]
	pub acquire_timeout: Duration,
	/// Upper bound for a statement waiting on a locked database
	#[serde_as(as = "DurationSeconds<u64>")]
	#[serde(default = "default_busy_timeout")]
	pub busy_timeout: Duration,
}

fn default_max_connections() -> u32 {
	DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout() -> Duration {
	DEFAULT_ACQUIRE_TIMEOUT
}

fn default_busy_timeout() -> Duration {
	DEFAULT_BUSY_TIMEOUT
}

impl Default for StoreOptions {
	fn default() -> Self {
		StoreOptions {
			db_dir: None,
			max_connections: DEFAULT_MAX_CONNECTIONS,
			acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
			busy_timeout: DEFAULT_BUSY_TIMEOUT,
		}
	}
}

impl StoreOptions {
	pub fn new(db_dir: impl Into<PathBuf>) -> Self {
		StoreOptions { db_dir: Some(db_dir.into()), ..Default::default() }
	}

	/// Read options from `IDSTORE_*` environment variables.
	///
	/// Unset variables keep their defaults, malformed ones are an error.
	pub fn from_env() -> ClResult<Self> {
		Self::from_vars(|key| env::var(key).ok())
	}

	/// Like [`StoreOptions::from_env`], reading variables through `lookup`
	pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ClResult<Self> {
		let mut opts = StoreOptions::default();
		if let Some(dir) = lookup("IDSTORE_DB_DIR") {
			opts.db_dir = Some(PathBuf::from(dir));
		}
		if let Some(n) = parse_var(&lookup, "IDSTORE_MAX_CONNECTIONS")? {
			opts.max_connections = n;
		}
		if let Some(secs) = parse_var(&lookup, "IDSTORE_ACQUIRE_TIMEOUT")? {
			opts.acquire_timeout = Duration::from_secs(secs);
		}
		if let Some(secs) = parse_var(&lookup, "IDSTORE_BUSY_TIMEOUT")? {
			opts.busy_timeout = Duration::from_secs(secs);
		}
		Ok(opts)
	}

	pub fn db_dir(mut self, db_dir: impl Into<PathBuf>) -> Self {
		self.db_dir = Some(db_dir.into());
		self
	}
	pub fn max_connections(mut self, max_connections: u32) -> Self {
		self.max_connections = max_connections;
		self
	}
	pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
		self.acquire_timeout = timeout;
		self
	}
	pub fn busy_timeout(mut self, timeout: Duration) -> Self {
		self.busy_timeout = timeout;
		self
	}

	/// Path of a database file inside `db_dir`
	pub fn db_file(&self, name: &str) -> ClResult<PathBuf> {
		let dir = self.db_dir.as_ref().ok_or(Error::MissingConfig("db_dir"))?;
		Ok(dir.join(name))
	}
}

fn parse_var<T: FromStr>(
	lookup: &impl Fn(&str) -> Option<String>,
	key: &str,
) -> ClResult<Option<T>> {
	match lookup(key) {
		Some(value) => value
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| Error::ValidationError(format!("invalid value for {}: {:?}", key, value))),
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn test_db_file_requires_dir() {
		let opts = StoreOptions::default();
		assert!(matches!(opts.db_file("config.db"), Err(Error::MissingConfig("db_dir"))));

		let opts = StoreOptions::new("/var/lib/idstore");
		assert_eq!(
			opts.db_file("config.db").unwrap(),
			PathBuf::from("/var/lib/idstore/config.db")
		);
	}

	#[test]
	fn test_deserialize_with_defaults() {
		let opts: StoreOptions =
			serde_json::from_str(r#"{"dbDir": "./data", "busyTimeout": 10}"#).unwrap();
		assert_eq!(opts.db_dir, Some(PathBuf::from("./data")));
		assert_eq!(opts.max_connections, DEFAULT_MAX_CONNECTIONS);
		assert_eq!(opts.acquire_timeout, DEFAULT_ACQUIRE_TIMEOUT);
		assert_eq!(opts.busy_timeout, Duration::from_secs(10));
	}

	#[test]
	fn test_builder_setters() {
		let opts = StoreOptions::default()
			.db_dir("/tmp/ids")
			.max_connections(2)
			.acquire_timeout(Duration::from_secs(1));
		assert_eq!(opts.max_connections, 2);
		assert_eq!(opts.acquire_timeout, Duration::from_secs(1));
		assert_eq!(opts.busy_timeout, DEFAULT_BUSY_TIMEOUT);
	}

	fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> =
			pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
		move |key: &str| map.get(key).cloned()
	}

	#[test]
	fn test_from_vars() {
		let opts = StoreOptions::from_vars(vars(&[
			("IDSTORE_DB_DIR", "/var/lib/idstore"),
			("IDSTORE_MAX_CONNECTIONS", " 8 "),
			("IDSTORE_BUSY_TIMEOUT", "2"),
		]))
		.unwrap();
		assert_eq!(opts.db_dir, Some(PathBuf::from("/var/lib/idstore")));
		assert_eq!(opts.max_connections, 8);
		assert_eq!(opts.acquire_timeout, DEFAULT_ACQUIRE_TIMEOUT);
		assert_eq!(opts.busy_timeout, Duration::from_secs(2));

		let opts = StoreOptions::from_vars(vars(&[])).unwrap();
		assert!(opts.db_dir.is_none());
		assert_eq!(opts.max_connections, DEFAULT_MAX_CONNECTIONS);
	}

	#[test]
	fn test_from_vars_rejects_malformed_values() {
		let err =
			StoreOptions::from_vars(vars(&[("IDSTORE_MAX_CONNECTIONS", "many")])).unwrap_err();
		assert_eq!(
			err.to_string(),
			"validation error: invalid value for IDSTORE_MAX_CONNECTIONS: \"many\""
		);

		let err = StoreOptions::from_vars(vars(&[("IDSTORE_ACQUIRE_TIMEOUT", "-1")])).unwrap_err();
		assert!(matches!(err, Error::ValidationError(_)));
	}
}

// vim: ts=4
