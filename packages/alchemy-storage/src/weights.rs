//! The single versioned row of ranking weights.

use sqlx::{SqliteConnection, SqliteExecutor};
use time::OffsetDateTime;

use crate::{Error, Result, timestamp};
use alchemy_domain::ranking::Weights;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoredWeights {
	pub weights: Weights,
	pub version: i64,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct WeightsRow {
	temperature: f64,
	token_usage: f64,
	context: f64,
	recency: f64,
	performance: f64,
	version: i64,
	updated_at: i64,
}

/// Inserts the initial row unless one already exists.
pub async fn seed(conn: &mut SqliteConnection, weights: &Weights, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO ranking_weights (
	id,
	temperature,
	token_usage,
	context,
	recency,
	performance,
	version,
	updated_at
)
VALUES (1, ?1, ?2, ?3, ?4, ?5, 1, ?6)
ON CONFLICT (id) DO NOTHING",
	)
	.bind(f64::from(weights.temperature))
	.bind(f64::from(weights.token_usage))
	.bind(f64::from(weights.context))
	.bind(f64::from(weights.recency))
	.bind(f64::from(weights.performance))
	.bind(timestamp::to_millis(now))
	.execute(conn)
	.await?;

	Ok(())
}

pub async fn current<'e, E>(executor: E) -> Result<StoredWeights>
where
	E: SqliteExecutor<'e>,
{
	let row: Option<WeightsRow> = sqlx::query_as(
		"\
SELECT
	temperature,
	token_usage,
	context,
	recency,
	performance,
	version,
	updated_at
FROM ranking_weights
WHERE id = 1",
	)
	.fetch_optional(executor)
	.await?;
	let row = row.ok_or_else(|| Error::NotFound("Ranking weights are not seeded.".to_string()))?;

	Ok(StoredWeights {
		weights: Weights {
			temperature: row.temperature as f32,
			token_usage: row.token_usage as f32,
			context: row.context as f32,
			recency: row.recency as f32,
			performance: row.performance as f32,
		},
		version: row.version,
		updated_at: timestamp::from_millis(row.updated_at)?,
	})
}

/// Replaces the weight set if the stored version is still `expected_version`.
///
/// Returns the new version. A concurrent update surfaces as [`Error::Conflict`].
pub async fn compare_and_set(
	conn: &mut SqliteConnection,
	expected_version: i64,
	weights: &Weights,
	now: OffsetDateTime,
) -> Result<i64> {
	let version: Option<i64> = sqlx::query_scalar(
		"\
UPDATE ranking_weights
SET
	temperature = ?1,
	token_usage = ?2,
	context = ?3,
	recency = ?4,
	performance = ?5,
	version = version + 1,
	updated_at = ?6
WHERE id = 1 AND version = ?7
RETURNING version",
	)
	.bind(f64::from(weights.temperature))
	.bind(f64::from(weights.token_usage))
	.bind(f64::from(weights.context))
	.bind(f64::from(weights.recency))
	.bind(f64::from(weights.performance))
	.bind(timestamp::to_millis(now))
	.bind(expected_version)
	.fetch_optional(conn)
	.await?;

	version.ok_or_else(|| {
		Error::Conflict(format!("Ranking weights moved past version {expected_version}."))
	})
}
