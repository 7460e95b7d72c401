//! Persisted bookkeeping for the scheduled passes.

use sqlx::{SqliteConnection, SqliteExecutor};
use time::OffsetDateTime;

use crate::{Error, Result, timestamp};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Job {
	Decay,
	Cleanup,
	PatternConsolidation,
	Training,
}
impl Job {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Decay => "decay",
			Self::Cleanup => "cleanup",
			Self::PatternConsolidation => "pattern_consolidation",
			Self::Training => "training",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobState {
	pub job: Job,
	pub last_run_at: Option<OffsetDateTime>,
	/// Highest feedback sequence number already consumed. Only training advances it.
	pub watermark_seq: i64,
	pub watermark_at: Option<OffsetDateTime>,
}

pub async fn load<'e, E>(executor: E, job: Job) -> Result<JobState>
where
	E: SqliteExecutor<'e>,
{
	let row: Option<(Option<i64>, i64, Option<i64>)> = sqlx::query_as(
		"SELECT last_run_at, watermark_seq, watermark_at FROM job_state WHERE job = ?1",
	)
	.bind(job.as_str())
	.fetch_optional(executor)
	.await?;
	let Some((last_run_at, watermark_seq, watermark_at)) = row else {
		return Ok(JobState { job, last_run_at: None, watermark_seq: 0, watermark_at: None });
	};

	Ok(JobState {
		job,
		last_run_at: timestamp::from_millis_opt(last_run_at)?,
		watermark_seq,
		watermark_at: timestamp::from_millis_opt(watermark_at)?,
	})
}

/// Records `now` as the job's last run if nobody else has since `previous` was read.
///
/// Returns `false` when another runner claimed the tick first.
pub async fn claim_run(
	conn: &mut SqliteConnection,
	job: Job,
	previous: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<bool> {
	ensure_row(conn, job).await?;

	let result =
		sqlx::query("UPDATE job_state SET last_run_at = ?1 WHERE job = ?2 AND last_run_at IS ?3")
			.bind(timestamp::to_millis(now))
			.bind(job.as_str())
			.bind(previous.map(timestamp::to_millis))
			.execute(&mut *conn)
			.await?;

	Ok(result.rows_affected() > 0)
}

/// Moves the training watermark from `expected_seq` to `seq`.
pub async fn advance_watermark(
	conn: &mut SqliteConnection,
	expected_seq: i64,
	seq: i64,
	watermark_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<()> {
	ensure_row(conn, Job::Training).await?;

	let result = sqlx::query(
		"\
UPDATE job_state
SET
	watermark_seq = ?1,
	watermark_at = ?2,
	last_run_at = ?3
WHERE job = ?4 AND watermark_seq = ?5",
	)
	.bind(seq)
	.bind(watermark_at.map(timestamp::to_millis))
	.bind(timestamp::to_millis(now))
	.bind(Job::Training.as_str())
	.bind(expected_seq)
	.execute(&mut *conn)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::Conflict(format!(
			"Training watermark moved past sequence {expected_seq}."
		)));
	}

	Ok(())
}

async fn ensure_row(conn: &mut SqliteConnection, job: Job) -> Result<()> {
	sqlx::query("INSERT INTO job_state (job) VALUES (?1) ON CONFLICT (job) DO NOTHING")
		.bind(job.as_str())
		.execute(&mut *conn)
		.await?;

	Ok(())
}
