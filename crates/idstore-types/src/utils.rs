//! Validation helpers shared by the record types

use std::collections::HashSet;

use crate::prelude::*;

/// Reject empty or whitespace-only strings
pub fn require_non_empty(field: &str, value: &str) -> ClResult<()> {
	if value.trim().is_empty() {
		return Err(Error::ValidationError(format!("{} must not be empty", field)));
	}
	Ok(())
}

/// Reject lists that contain the same value twice
pub fn require_unique<'a>(
	field: &str,
	values: impl IntoIterator<Item = &'a str>,
) -> ClResult<()> {
	let mut seen = HashSet::new();
	for value in values {
		if !seen.insert(value) {
			return Err(Error::ValidationError(format!("duplicate {}: {}", field, value)));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_require_non_empty() {
		assert!(require_non_empty("scope", "openid").is_ok());
		assert!(matches!(require_non_empty("scope", ""), Err(Error::ValidationError(_))));
		assert!(matches!(require_non_empty("scope", "   "), Err(Error::ValidationError(_))));
	}

	#[test]
	fn test_require_unique() {
		assert!(require_unique("scope", ["openid", "profile"]).is_ok());
		let err = require_unique("scope", ["openid", "profile", "openid"]).unwrap_err();
		assert_eq!(err.to_string(), "validation error: duplicate scope: openid");
	}
}

// vim: ts=4
