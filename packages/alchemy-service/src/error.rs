pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Dimension mismatch: expected {expected}, got {actual}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Malformed vector: {message}")]
	MalformedVector { message: String },
	#[error("Transaction conflict: {message}")]
	TransactionConflict { message: String },
	#[error("Operation timed out.")]
	Timeout,
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		alchemy_storage::Error::from(err).into()
	}
}

impl From<alchemy_storage::Error> for Error {
	fn from(err: alchemy_storage::Error) -> Self {
		match err {
			alchemy_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			alchemy_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			alchemy_storage::Error::NotFound(message) => Self::NotFound { message },
			alchemy_storage::Error::Conflict(message) => Self::TransactionConflict { message },
			alchemy_storage::Error::Timeout => Self::Timeout,
			alchemy_storage::Error::MalformedVector(inner) =>
				Self::MalformedVector { message: inner.to_string() },
			alchemy_storage::Error::Corrupt(message) => Self::Storage { message },
			alchemy_storage::Error::SerdeJson(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}

impl From<alchemy_providers::Error> for Error {
	fn from(err: alchemy_providers::Error) -> Self {
		Self::EmbeddingUnavailable { message: err.to_string() }
	}
}
