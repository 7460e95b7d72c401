use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{FeedbackEvent, FeedbackRow, NewFeedback},
	timestamp,
};

const FEEDBACK_COLUMNS: &str = "\
seq,
	id,
	prompt_id,
	effectiveness,
	rating,
	similarity,
	session_id,
	context,
	created_at";

const HISTORY_CHUNK: usize = 500;

/// Appends one event. Events are never updated afterwards.
pub async fn insert<'e, E>(
	executor: E,
	event: &NewFeedback,
	now: OffsetDateTime,
) -> Result<FeedbackEvent>
where
	E: SqliteExecutor<'e>,
{
	if !(0.0..=1.0).contains(&event.effectiveness) {
		return Err(Error::InvalidArgument(
			"Effectiveness must be in the range 0.0-1.0.".to_string(),
		));
	}

	let sql = format!(
		"\
INSERT INTO feedback_events (
	id,
	prompt_id,
	effectiveness,
	rating,
	similarity,
	session_id,
	context,
	created_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
RETURNING {FEEDBACK_COLUMNS}"
	);
	let row: FeedbackRow = sqlx::query_as(&sql)
		.bind(Uuid::new_v4())
		.bind(event.prompt_id)
		.bind(f64::from(event.effectiveness))
		.bind(event.rating.map(i64::from))
		.bind(event.similarity.map(f64::from))
		.bind(event.session_id.as_deref())
		.bind(event.context.as_str())
		.bind(timestamp::to_millis(now))
		.fetch_one(executor)
		.await?;

	row.into_event()
}

/// Events with a sequence number above `after_seq`, oldest first.
pub async fn since<'e, E>(executor: E, after_seq: i64) -> Result<Vec<FeedbackEvent>>
where
	E: SqliteExecutor<'e>,
{
	let sql = format!("SELECT {FEEDBACK_COLUMNS} FROM feedback_events WHERE seq > ?1 ORDER BY seq ASC");
	let rows: Vec<FeedbackRow> = sqlx::query_as(&sql).bind(after_seq).fetch_all(executor).await?;

	rows.into_iter().map(FeedbackRow::into_event).collect()
}

/// Effectiveness history per prompt, oldest first.
pub async fn history(
	pool: &SqlitePool,
	prompt_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<(i64, f32)>>> {
	let mut out: HashMap<Uuid, Vec<(i64, f32)>> = HashMap::new();

	for chunk in prompt_ids.chunks(HISTORY_CHUNK) {
		let mut builder = QueryBuilder::<Sqlite>::new(
			"SELECT prompt_id, seq, effectiveness FROM feedback_events WHERE prompt_id IN (",
		);
		let mut separated = builder.separated(", ");

		for id in chunk {
			separated.push_bind(*id);
		}

		separated.push_unseparated(") ORDER BY seq ASC");

		let rows: Vec<(Uuid, i64, f64)> = builder.build_query_as().fetch_all(pool).await?;

		for (prompt_id, seq, effectiveness) in rows {
			out.entry(prompt_id).or_default().push((seq, effectiveness as f32));
		}
	}

	Ok(out)
}

pub async fn count<'e, E>(executor: E) -> Result<i64>
where
	E: SqliteExecutor<'e>,
{
	Ok(sqlx::query_scalar("SELECT count(*) FROM feedback_events").fetch_one(executor).await?)
}
