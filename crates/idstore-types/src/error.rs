//! Error type shared by the store traits and their adapters

pub type ClResult<T> = std::result::Result<T, Error>;

/// Why the backing store rejected an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
	/// Unique, foreign key, not-null or check constraint violated
	Constraint,
	/// Optimistic concurrency check failed: the row changed or vanished since it was read
	Conflict,
	/// Connection could not be acquired or was lost
	Unavailable,
	/// A previous save was cancelled while committing. Its changes were
	/// dropped from the queue and may or may not be stored.
	Interrupted,
	/// Any other database failure
	Database,
}

#[derive(Debug)]
pub enum Error {
	NotFound,
	/// A required option was not provided at construction time
	MissingConfig(&'static str),
	/// The context was closed; no further operations are possible
	Disposed,
	Persistence(PersistenceError),
	ValidationError(String),
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	pub fn is_persistence(&self) -> bool {
		matches!(self, Error::Persistence(_))
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, Error::Persistence(PersistenceError::Conflict))
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<PersistenceError> for Error {
	fn from(err: PersistenceError) -> Self {
		Self::Persistence(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::MissingConfig(name) => write!(f, "missing required option: {}", name),
			Error::Disposed => write!(f, "context has been closed"),
			Error::Persistence(err) => write!(f, "persistence error: {:?}", err),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}


// vim: ts=4
