//! Bounded collection of learned success, failure, and optimization patterns.

use sqlx::{SqliteConnection, SqliteExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{Pattern, PatternRow},
	timestamp,
};
use alchemy_domain::learning::{self, PatternObservation};

const PATTERN_COLUMNS: &str = "\
id,
	pattern_type,
	signature,
	confidence_score,
	usage_count,
	created_at,
	updated_at";

/// Folds one observation into its pattern, creating the pattern on first sight.
pub async fn upsert(
	conn: &mut SqliteConnection,
	observation: &PatternObservation,
	now: OffsetDateTime,
) -> Result<Pattern> {
	let now_ms = timestamp::to_millis(now);
	let existing: Option<(Uuid, f64, i64)> = sqlx::query_as(
		"\
SELECT id, confidence_score, usage_count
FROM patterns
WHERE pattern_type = ?1 AND signature = ?2",
	)
	.bind(observation.pattern_type.as_str())
	.bind(observation.signature.as_str())
	.fetch_optional(&mut *conn)
	.await?;
	let (id, confidence, usage_count) = match existing {
		Some((id, confidence, usage_count)) => (
			id,
			learning::merge_confidence(confidence as f32, usage_count, observation.confidence),
			usage_count + 1,
		),
		None => (Uuid::new_v4(), observation.confidence, 1),
	};
	let sql = format!(
		"\
INSERT INTO patterns (
	id,
	pattern_type,
	signature,
	confidence_score,
	usage_count,
	created_at,
	updated_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
ON CONFLICT (pattern_type, signature) DO UPDATE
SET
	confidence_score = excluded.confidence_score,
	usage_count = excluded.usage_count,
	updated_at = excluded.updated_at
RETURNING {PATTERN_COLUMNS}"
	);
	let row: PatternRow = sqlx::query_as(&sql)
		.bind(id)
		.bind(observation.pattern_type.as_str())
		.bind(observation.signature.as_str())
		.bind(f64::from(confidence))
		.bind(usage_count)
		.bind(now_ms)
		.fetch_one(&mut *conn)
		.await?;

	row.into_pattern()
}

/// All patterns, strongest first.
pub async fn list<'e, E>(executor: E) -> Result<Vec<Pattern>>
where
	E: SqliteExecutor<'e>,
{
	let sql = format!(
		"SELECT {PATTERN_COLUMNS} FROM patterns ORDER BY confidence_score DESC, updated_at DESC, id ASC"
	);
	let rows: Vec<PatternRow> = sqlx::query_as(&sql).fetch_all(executor).await?;

	rows.into_iter().map(PatternRow::into_pattern).collect()
}

pub async fn count<'e, E>(executor: E) -> Result<i64>
where
	E: SqliteExecutor<'e>,
{
	Ok(sqlx::query_scalar("SELECT count(*) FROM patterns").fetch_one(executor).await?)
}

pub async fn count_below<'e, E>(executor: E, threshold: f32) -> Result<i64>
where
	E: SqliteExecutor<'e>,
{
	Ok(sqlx::query_scalar("SELECT count(*) FROM patterns WHERE confidence_score < ?1")
		.bind(f64::from(threshold))
		.fetch_one(executor)
		.await?)
}

pub async fn prune_below(conn: &mut SqliteConnection, threshold: f32) -> Result<u64> {
	let result = sqlx::query("DELETE FROM patterns WHERE confidence_score < ?1")
		.bind(f64::from(threshold))
		.execute(conn)
		.await?;

	Ok(result.rows_affected())
}

/// Evicts the lowest-confidence, then oldest, patterns until at most `cap` remain.
pub async fn enforce_cap(conn: &mut SqliteConnection, cap: u32) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM patterns
WHERE id IN (
	SELECT id
	FROM patterns
	ORDER BY confidence_score ASC, updated_at ASC, id ASC
	LIMIT max(0, (SELECT count(*) FROM patterns) - ?1)
)",
	)
	.bind(i64::from(cap))
	.execute(conn)
	.await?;

	Ok(result.rows_affected())
}
