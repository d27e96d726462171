//! Error type shared by the engine and its adapters

pub type ChResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	DbError,
	Parse,
	Timeout,
	Internal(String),
	ValidationError(String),
	ConfigError(String),
	ServiceUnavailable(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Short, stable class name stored in the delivery ledger
	pub fn class(&self) -> &'static str {
		match self {
			Error::NotFound => "not_found",
			Error::DbError => "db",
			Error::Parse => "parse",
			Error::Timeout => "timeout",
			Error::Internal(_) => "internal",
			Error::ValidationError(_) => "validation",
			Error::ConfigError(_) => "config",
			Error::ServiceUnavailable(_) => "unavailable",
			Error::Io(_) => "io",
		}
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::DbError => write!(f, "database error"),
			Error::Parse => write!(f, "parse error"),
			Error::Timeout => write!(f, "timeout"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::ServiceUnavailable(msg) => write!(f, "service unavailable: {}", msg),
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

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::warn!("JSON error: {}", err);
		Self::Parse
	}
}

impl From<tokio::time::error::Elapsed> for Error {
	fn from(_: tokio::time::error::Elapsed) -> Self {
		Self::Timeout
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_class_is_stable() {
		assert_eq!(Error::Timeout.class(), "timeout");
		assert_eq!(Error::ServiceUnavailable("gateway".into()).class(), "unavailable");
		assert_eq!(Error::DbError.to_string(), "database error");
	}

	#[test]
	fn test_json_error_maps_to_parse() {
		let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
		assert!(matches!(err, Error::Parse));
	}
}

// vim: ts=4
