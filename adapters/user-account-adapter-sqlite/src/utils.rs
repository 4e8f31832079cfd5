//! Utility functions for database operations

use sqlx::error::{DatabaseError, ErrorKind};
use uuid::Uuid;

use idstore_types::prelude::*;

/// Log database errors
pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

fn classify(err: &sqlx::Error) -> PersistenceError {
	match err {
		sqlx::Error::Database(db_err) => classify_db(db_err.as_ref()),
		sqlx::Error::PoolTimedOut
		| sqlx::Error::PoolClosed
		| sqlx::Error::Io(_)
		| sqlx::Error::Tls(_)
		| sqlx::Error::WorkerCrashed => PersistenceError::Unavailable,
		_ => PersistenceError::Database,
	}
}

fn classify_db(err: &dyn DatabaseError) -> PersistenceError {
	match err.kind() {
		ErrorKind::UniqueViolation
		| ErrorKind::ForeignKeyViolation
		| ErrorKind::NotNullViolation
		| ErrorKind::CheckViolation => PersistenceError::Constraint,
		_ => PersistenceError::Database,
	}
}

/// Log and translate a database error
pub(crate) fn db_err(err: sqlx::Error) -> Error {
	inspect(&err);
	Error::Persistence(classify(&err))
}

pub(crate) fn opt_ts(value: Option<i64>) -> Option<Timestamp> {
	value.map(Timestamp)
}

/// Collect row mapping results into a vector
pub(crate) fn collect_res<T>(
	iter: impl Iterator<Item = Result<T, sqlx::Error>>,
) -> ClResult<Vec<T>> {
	let mut items = Vec::new();
	for item in iter {
		items.push(item.map_err(db_err)?);
	}
	Ok(items)
}

/// Fail with `NotFound` when a statement keyed by id touched no row
pub(crate) fn require_found(rows: u64, what: &str, id: Uuid) -> ClResult<u64> {
	if rows == 0 {
		debug!("{} {} not found", what, id);
		return Err(Error::NotFound);
	}
	Ok(rows)
}

/// Fail with a conflict when a version-guarded statement touched no row
pub(crate) fn require_version(rows: u64, what: &str, id: Uuid, version: i64) -> ClResult<u64> {
	if rows == 0 {
		warn!("Concurrency conflict on {} {} (version {})", what, id, version);
		return Err(PersistenceError::Conflict.into());
	}
	Ok(rows)
}


// vim: ts=4
