use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read alchemy config at {}.", path.display())]
	Read { path: PathBuf, source: std::io::Error },
	#[error("Failed to parse alchemy config at {}: {source}", path.display())]
	Parse { path: PathBuf, source: toml::de::Error },
	#[error("{message}")]
	Validation { message: String },
}
