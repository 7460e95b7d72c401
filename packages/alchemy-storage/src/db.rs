use std::{future::Future, time::Duration};

use sqlx::{
	SqlitePool,
	sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use time::OffsetDateTime;

use crate::{Error, Result, schema, weights};
use alchemy_domain::ranking::Weights;

const BASE_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 200;

#[derive(Clone, Debug)]
pub struct Db {
	pub pool: SqlitePool,
	pub max_conflict_retries: u32,
}
impl Db {
	pub async fn connect(cfg: &alchemy_config::Sqlite) -> Result<Self> {
		let options = SqliteConnectOptions::new()
			.filename(&cfg.path)
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.synchronous(SqliteSynchronous::Normal)
			.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
			.foreign_keys(true);
		let pool =
			SqlitePoolOptions::new().max_connections(cfg.pool_max_conns).connect_with(options).await?;

		Ok(Self { pool, max_conflict_retries: cfg.max_conflict_retries })
	}

	/// Creates missing tables and seeds the weight row on first bootstrap.
	pub async fn ensure_schema(&self, seed: Weights, now: OffsetDateTime) -> Result<()> {
		let sql = schema::render_schema();
		let mut tx = self.pool.begin().await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		weights::seed(&mut *tx, &seed, now).await?;

		tx.commit().await?;

		Ok(())
	}

	/// Runs `op` again while it fails with a conflict, up to the configured retry count.
	pub async fn retry_on_conflict<F, Fut, T>(&self, label: &str, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempt = 0;

		loop {
			match op().await {
				Err(Error::Conflict(message)) if attempt < self.max_conflict_retries => {
					attempt += 1;

					tracing::debug!(operation = label, attempt, conflict = %message, "Retrying after conflict.");

					tokio::time::sleep(backoff(attempt)).await;
				},
				result => return result,
			}
		}
	}
}

fn backoff(attempt: u32) -> Duration {
	let factor = 1_u64 << attempt.min(8);

	Duration::from_millis((BASE_BACKOFF_MS * factor).min(MAX_BACKOFF_MS))
}
