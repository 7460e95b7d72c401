#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Deadline exceeded.")]
	Timeout,
	#[error("Malformed vector: {0}")]
	MalformedVector(#[from] alchemy_domain::vector::VectorError),
	#[error("Corrupt row: {0}")]
	Corrupt(String),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
impl Error {
	pub fn is_conflict(&self) -> bool {
		matches!(self, Self::Conflict(_))
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		if let sqlx::Error::Database(db_err) = &err {
			if db_err.is_unique_violation() {
				return Self::Conflict(db_err.message().to_string());
			}
			if db_err.is_foreign_key_violation() {
				return Self::NotFound("Referenced prompt not found.".to_string());
			}
			// SQLITE_BUSY, SQLITE_LOCKED and their extended codes.
			if let Some(code) = db_err.code()
				&& matches!(&*code, "5" | "6" | "261" | "262" | "517")
			{
				return Self::Conflict(db_err.message().to_string());
			}
		}

		Self::Sqlx(err)
	}
}
