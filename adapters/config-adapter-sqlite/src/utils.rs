//! Utility functions for database operations

use sqlx::{
	QueryBuilder, Sqlite,
	error::{DatabaseError, ErrorKind},
};

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

/// Encode a string list column
pub(crate) fn to_json_list(values: &[Box<str>]) -> ClResult<String> {
	serde_json::to_string(values).map_err(|err| Error::Internal(err.to_string()))
}

/// Decode a string list column
pub(crate) fn parse_json_list(s: &str) -> Result<Vec<Box<str>>, sqlx::Error> {
	serde_json::from_str(s).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

/// Append `(?, ?, ...)` binding every value
pub(crate) fn push_in<'a>(query: &mut QueryBuilder<'a, Sqlite>, values: &[&'a str]) {
	query.push("(");
	let mut separated = query.separated(", ");
	for value in values {
		separated.push_bind(*value);
	}
	separated.push_unseparated(")");
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


// vim: ts=4
