mod error;

pub use error::{Error, Result};

use std::{
	env,
	ffi::OsString,
	future::Future,
	io::ErrorKind,
	path::{Path, PathBuf},
};

use uuid::Uuid;

// SQLite keeps WAL mode state in two sidecar files next to the database.
const SIDECAR_SUFFIXES: [&str; 3] = ["", "-wal", "-shm"];

/// Throwaway SQLite database file, removed on cleanup or drop.
pub struct TestDatabase {
	name: String,
	path: PathBuf,
	cleaned: bool,
}
impl TestDatabase {
	pub fn new() -> Result<Self> {
		let dir = env_test_dir().unwrap_or_else(env::temp_dir);

		if !dir.is_dir() {
			return Err(Error::Message(format!("Test directory {dir:?} does not exist.")));
		}

		let name = format!("alchemy_test_{}", Uuid::new_v4().simple());
		let path = dir.join(format!("{name}.db"));

		Ok(Self { name, path, cleaned: false })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}
		if env_keep() {
			eprintln!("Keeping test database at {:?}.", self.path);

			self.cleaned = true;

			return Ok(());
		}

		for path in sidecar_paths(&self.path) {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => {},
				Err(err) if err.kind() == ErrorKind::NotFound => {},
				Err(err) => return Err(err.into()),
			}
		}

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned || env_keep() {
			return;
		}

		for path in sidecar_paths(&self.path) {
			if let Err(err) = std::fs::remove_file(&path)
				&& err.kind() != ErrorKind::NotFound
			{
				eprintln!("Test database cleanup failed for {path:?}: {err}.");
			}
		}
	}
}

/// Directory for test databases. Defaults to the system temp directory.
pub fn env_test_dir() -> Option<PathBuf> {
	env::var_os("ALCHEMY_TEST_DIR").map(PathBuf::from)
}

/// Whether to leave test databases on disk for inspection.
pub fn env_keep() -> bool {
	env::var("ALCHEMY_TEST_KEEP_DB").map(|value| value == "1").unwrap_or(false)
}

pub async fn with_test_db<F, Fut, T>(f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let db = TestDatabase::new()?;
	let result = f(&db).await;
	let mut db = db;

	if let Err(err) = db.cleanup_inner().await {
		eprintln!("Test database cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

fn sidecar_paths(path: &Path) -> Vec<PathBuf> {
	SIDECAR_SUFFIXES
		.iter()
		.map(|suffix| {
			let mut raw = OsString::from(path.as_os_str());

			raw.push(suffix);

			PathBuf::from(raw)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sidecars_sit_next_to_the_database() {
		let paths = sidecar_paths(Path::new("/tmp/a.db"));

		assert_eq!(paths, vec![
			PathBuf::from("/tmp/a.db"),
			PathBuf::from("/tmp/a.db-wal"),
			PathBuf::from("/tmp/a.db-shm"),
		]);
	}

	#[tokio::test]
	async fn cleanup_tolerates_missing_files() {
		let db = TestDatabase::new().expect("Failed to allocate test database.");

		assert!(db.name().starts_with("alchemy_test_"));

		db.cleanup().await.expect("Cleanup of an unused database must succeed.");
	}
}
