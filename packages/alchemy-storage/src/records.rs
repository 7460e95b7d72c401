//! SQLite implementation of [`RecordStore`].

use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Deadline, Error, Result,
	db::Db,
	models::{
		EmbeddingStatus, NewEmbedding, NewRecord, PromptRecord, PromptRow, PutOutcome,
		Relationship, RelationshipRow, StaleRecord, UsageOutcome,
	},
	store::{BoxFuture, CandidateScan, RecordStore, ScanOrder},
	timestamp,
};
use alchemy_domain::{content, vector};

pub(crate) const PROMPT_COLUMNS: &str = "\
id,
	content,
	content_hash,
	phase,
	provider,
	model,
	temperature,
	max_tokens,
	actual_tokens,
	tags,
	parent_id,
	session_id,
	embedding,
	embedding_dim,
	embedding_model,
	embedding_provider,
	embedding_status,
	relevance_score,
	usage_count,
	last_used_at,
	created_at,
	updated_at";

const GET_MANY_CHUNK: usize = 500;

enum Cursor {
	Relevance { score: f64, usage_count: i64, id: Uuid },
	Recent { created_at: i64, id: Uuid },
}
impl Cursor {
	fn after(row: &PromptRow, order: ScanOrder) -> Self {
		match order {
			ScanOrder::Relevance =>
				Self::Relevance { score: row.relevance_score, usage_count: row.usage_count, id: row.id },
			ScanOrder::Recent => Self::Recent { created_at: row.created_at, id: row.id },
		}
	}
}

impl Db {
	/// One upsert statement, so concurrent writers only ever queue on the write lock.
	async fn put_once(&self, record: &NewRecord, now: OffsetDateTime) -> Result<PutOutcome> {
		let content_hash = content::content_hash(&record.content);
		let now_ms = timestamp::to_millis(now);
		let new_id = Uuid::new_v4();
		let (id, usage_count, status) =
			upsert_record(&self.pool, new_id, record, &content_hash, now_ms).await.map_err(
				|err| match (err, record.parent_id) {
					(Error::NotFound(_), Some(parent_id)) =>
						Error::NotFound(format!("Parent prompt {parent_id} not found.")),
					(err, _) => err,
				},
			)?;
		let created = id == new_id;

		if !created
			&& let Some(embedding) = record.embedding.as_ref()
			&& embedding.status == EmbeddingStatus::Ok
			&& status != EmbeddingStatus::Ok.as_str()
		{
			fill_embedding(&self.pool, id, embedding, now_ms).await?;
		}

		Ok(PutOutcome { id, created, usage_count })
	}

	async fn get_record(&self, id: Uuid) -> Result<PromptRecord> {
		let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = ?1");
		let row: Option<PromptRow> =
			sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;

		row.ok_or_else(|| Error::NotFound(format!("Prompt {id} not found.")))?.into_record()
	}

	async fn get_records(&self, ids: &[Uuid]) -> Result<Vec<PromptRecord>> {
		let mut found = Vec::with_capacity(ids.len());

		for chunk in ids.chunks(GET_MANY_CHUNK) {
			let mut builder =
				QueryBuilder::<Sqlite>::new(format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id IN ("));
			let mut separated = builder.separated(", ");

			for id in chunk {
				separated.push_bind(*id);
			}

			separated.push_unseparated(")");

			let rows: Vec<PromptRow> = builder.build_query_as().fetch_all(&self.pool).await?;

			for row in rows {
				found.push(row.into_record()?);
			}
		}

		let mut ordered = Vec::with_capacity(found.len());

		for id in ids {
			if let Some(index) = found.iter().position(|record| record.id == *id) {
				ordered.push(found.swap_remove(index));
			}
		}

		Ok(ordered)
	}

	async fn delete_record(&self, id: Uuid) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM prompt_relationships WHERE source_id = ?1 OR target_id = ?1")
			.bind(id)
			.execute(&mut *tx)
			.await?;

		let removed = sqlx::query("DELETE FROM prompts WHERE id = ?1")
			.bind(id)
			.execute(&mut *tx)
			.await?
			.rows_affected() > 0;

		tx.commit().await?;

		Ok(removed)
	}

	async fn scan(&self, scan: &CandidateScan, deadline: Deadline) -> Result<Vec<PromptRecord>> {
		let limit = scan.limit as usize;
		let batch_size = scan.batch_size.max(1) as usize;
		let mut out = Vec::new();
		let mut cursor = None;

		while out.len() < limit {
			deadline.check()?;

			let page_size = (limit - out.len()).min(batch_size);
			let rows = deadline.run(self.scan_page(scan, cursor.as_ref(), page_size)).await?;
			let fetched = rows.len();

			if let Some(last) = rows.last() {
				cursor = Some(Cursor::after(last, scan.order));
			}

			for row in rows {
				out.push(row.into_record()?);
			}

			if fetched < page_size {
				break;
			}
		}

		Ok(out)
	}

	async fn scan_page(
		&self,
		scan: &CandidateScan,
		cursor: Option<&Cursor>,
		page_size: usize,
	) -> Result<Vec<PromptRow>> {
		let filter = &scan.filter;
		let mut builder = QueryBuilder::<Sqlite>::new(format!(
			"SELECT {PROMPT_COLUMNS} FROM prompts WHERE relevance_score >= "
		));

		builder.push_bind(f64::from(scan.relevance_floor));

		if let Some(phase) = filter.phase {
			builder.push(" AND phase = ").push_bind(phase.as_str());
		}
		if let Some(provider) = filter.provider.as_ref() {
			builder.push(" AND provider = ").push_bind(provider.clone());
		}
		if let Some(model) = filter.model.as_ref() {
			builder.push(" AND model = ").push_bind(model.clone());
		}

		for tag in &filter.tags {
			builder
				.push(" AND EXISTS (SELECT 1 FROM json_each(prompts.tags) WHERE json_each.value = ")
				.push_bind(tag.clone())
				.push(")");
		}

		if let Some(after) = filter.created_after {
			builder.push(" AND created_at >= ").push_bind(timestamp::to_millis(after));
		}
		if let Some(before) = filter.created_before {
			builder.push(" AND created_at < ").push_bind(timestamp::to_millis(before));
		}

		match cursor {
			Some(Cursor::Relevance { score, usage_count, id }) => {
				builder
					.push(" AND (relevance_score < ")
					.push_bind(*score)
					.push(" OR (relevance_score = ")
					.push_bind(*score)
					.push(" AND (usage_count < ")
					.push_bind(*usage_count)
					.push(" OR (usage_count = ")
					.push_bind(*usage_count)
					.push(" AND id > ")
					.push_bind(*id)
					.push("))))");
			},
			Some(Cursor::Recent { created_at, id }) => {
				builder
					.push(" AND (created_at < ")
					.push_bind(*created_at)
					.push(" OR (created_at = ")
					.push_bind(*created_at)
					.push(" AND id > ")
					.push_bind(*id)
					.push("))");
			},
			None => {},
		}

		match scan.order {
			ScanOrder::Relevance =>
				builder.push(" ORDER BY relevance_score DESC, usage_count DESC, id ASC LIMIT "),
			ScanOrder::Recent => builder.push(" ORDER BY created_at DESC, id ASC LIMIT "),
		};

		builder.push_bind(page_size as i64);

		Ok(builder.build_query_as().fetch_all(&self.pool).await?)
	}

	async fn boost(&self, id: Uuid, boost_increment: f32, now: OffsetDateTime) -> Result<UsageOutcome> {
		let row: Option<(f64, i64)> = sqlx::query_as(
			"\
UPDATE prompts
SET
	relevance_score = MIN(1.0, relevance_score + ?1),
	usage_count = usage_count + 1,
	last_used_at = ?2,
	updated_at = ?2
WHERE id = ?3
RETURNING relevance_score, usage_count",
		)
		.bind(f64::from(boost_increment))
		.bind(timestamp::to_millis(now))
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;
		let (relevance_score, usage_count) =
			row.ok_or_else(|| Error::NotFound(format!("Prompt {id} not found.")))?;

		Ok(UsageOutcome { id, relevance_score: relevance_score as f32, usage_count })
	}

	// Missing endpoints surface as foreign-key violations of the single insert.
	async fn add_relationship_once(&self, relationship: &Relationship) -> Result<()> {
		if !(0.0..=1.0).contains(&relationship.strength) {
			return Err(Error::InvalidArgument(
				"Relationship strength must be in the range 0.0-1.0.".to_string(),
			));
		}

		sqlx::query(
			"\
INSERT INTO prompt_relationships (
	source_id,
	target_id,
	relationship_type,
	strength,
	context,
	created_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (source_id, target_id, relationship_type) DO UPDATE
SET
	strength = excluded.strength,
	context = excluded.context",
		)
		.bind(relationship.source_id)
		.bind(relationship.target_id)
		.bind(relationship.relationship_type.as_str())
		.bind(f64::from(relationship.strength))
		.bind(relationship.context.as_str())
		.bind(timestamp::to_millis(relationship.created_at))
		.execute(&self.pool)
		.await
		.map_err(|err| match Error::from(err) {
			Error::NotFound(_) => Error::NotFound("Relationship endpoint not found.".to_string()),
			err => err,
		})?;

		Ok(())
	}
}

impl RecordStore for Db {
	fn put<'a>(
		&'a self,
		record: &'a NewRecord,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<PutOutcome>> {
		Box::pin(async move { self.retry_on_conflict("put", move || self.put_once(record, now)).await })
	}

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<PromptRecord>> {
		Box::pin(self.get_record(id))
	}

	fn get_many<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<PromptRecord>>> {
		Box::pin(self.get_records(ids))
	}

	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { self.retry_on_conflict("delete", move || self.delete_record(id)).await })
	}

	fn scan_candidates<'a>(
		&'a self,
		scan: &'a CandidateScan,
		deadline: Deadline,
	) -> BoxFuture<'a, Result<Vec<PromptRecord>>> {
		Box::pin(self.scan(scan, deadline))
	}

	fn record_usage<'a>(
		&'a self,
		id: Uuid,
		boost_increment: f32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<UsageOutcome>> {
		Box::pin(async move {
			self.retry_on_conflict("record_usage", move || self.boost(id, boost_increment, now)).await
		})
	}

	fn decay_candidates<'a>(
		&'a self,
		idle_since: OffsetDateTime,
		floor: f32,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		Box::pin(async move {
			let ids: Vec<Uuid> = sqlx::query_scalar(
				"\
SELECT id
FROM prompts
WHERE relevance_score > ?1
	AND COALESCE(last_used_at, created_at) <= ?2
	AND (?3 IS NULL OR id > ?3)
ORDER BY id ASC
LIMIT ?4",
			)
			.bind(f64::from(floor))
			.bind(timestamp::to_millis(idle_since))
			.bind(after)
			.bind(i64::from(limit))
			.fetch_all(&self.pool)
			.await?;

			Ok(ids)
		})
	}

	fn decay_record<'a>(
		&'a self,
		id: Uuid,
		factor: f32,
		floor: f32,
		idle_since: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<f32>>> {
		Box::pin(async move {
			self.retry_on_conflict("decay_record", move || async move {
				// The predicate is re-evaluated here so a record used after listing keeps its score.
				let score: Option<f64> = sqlx::query_scalar(
					"\
UPDATE prompts
SET
	relevance_score = MAX(?1, relevance_score * ?2),
	updated_at = ?3
WHERE id = ?4
	AND relevance_score > ?1
	AND COALESCE(last_used_at, created_at) <= ?5
RETURNING relevance_score",
				)
				.bind(f64::from(floor))
				.bind(f64::from(factor))
				.bind(timestamp::to_millis(now))
				.bind(id)
				.bind(timestamp::to_millis(idle_since))
				.fetch_optional(&self.pool)
				.await?;

				Ok(score.map(|score| score as f32))
			})
			.await
		})
	}

	fn cleanup_candidates<'a>(
		&'a self,
		threshold: f32,
		created_before: OffsetDateTime,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StaleRecord>>> {
		Box::pin(async move {
			let rows: Vec<(Uuid, f64, i64)> = sqlx::query_as(
				"\
SELECT id, relevance_score, created_at
FROM prompts
WHERE relevance_score <= ?1
	AND created_at < ?2
	AND (?3 IS NULL OR id > ?3)
ORDER BY id ASC
LIMIT ?4",
			)
			.bind(f64::from(threshold))
			.bind(timestamp::to_millis(created_before))
			.bind(after)
			.bind(i64::from(limit))
			.fetch_all(&self.pool)
			.await?;

			rows.into_iter()
				.map(|(id, relevance_score, created_at)| {
					Ok(StaleRecord {
						id,
						relevance_score: relevance_score as f32,
						created_at: timestamp::from_millis(created_at)?,
					})
				})
				.collect()
		})
	}

	fn delete_if_stale<'a>(
		&'a self,
		id: Uuid,
		threshold: f32,
		created_before: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.retry_on_conflict("delete_if_stale", move || async move {
				// Relationships go with the record through the foreign key cascade.
				let result = sqlx::query(
					"\
DELETE FROM prompts
WHERE id = ?1
	AND relevance_score <= ?2
	AND created_at < ?3",
				)
				.bind(id)
				.bind(f64::from(threshold))
				.bind(timestamp::to_millis(created_before))
				.execute(&self.pool)
				.await?;

				Ok(result.rows_affected() > 0)
			})
			.await
		})
	}

	fn add_relationship<'a>(&'a self, relationship: &'a Relationship) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.retry_on_conflict("add_relationship", move || self.add_relationship_once(relationship))
				.await
		})
	}

	fn relationships<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Vec<Relationship>>> {
		Box::pin(async move {
			let rows: Vec<RelationshipRow> = sqlx::query_as(
				"\
SELECT
	source_id,
	target_id,
	relationship_type,
	strength,
	context,
	created_at
FROM prompt_relationships
WHERE source_id = ?1 OR target_id = ?1
ORDER BY created_at ASC, source_id ASC, target_id ASC, relationship_type ASC",
			)
			.bind(id)
			.fetch_all(&self.pool)
			.await?;

			rows.into_iter().map(RelationshipRow::into_relationship).collect()
		})
	}
}

async fn upsert_record<'e, E>(
	executor: E,
	id: Uuid,
	record: &NewRecord,
	content_hash: &str,
	now_ms: i64,
) -> Result<(Uuid, i64, String)>
where
	E: SqliteExecutor<'e>,
{
	let tags = serde_json::to_string(&record.tags)?;
	let embedding = record.embedding.as_ref();
	let row = sqlx::query_as(
		"\
INSERT INTO prompts (
	id,
	content,
	content_hash,
	phase,
	provider,
	model,
	temperature,
	max_tokens,
	actual_tokens,
	tags,
	parent_id,
	session_id,
	embedding,
	embedding_dim,
	embedding_model,
	embedding_provider,
	embedding_status,
	relevance_score,
	usage_count,
	last_used_at,
	created_at,
	updated_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 1.0, 1, NULL, ?18, ?18)
ON CONFLICT (content_hash) DO UPDATE
SET
	usage_count = usage_count + 1,
	last_used_at = excluded.created_at,
	updated_at = excluded.created_at
RETURNING id, usage_count, embedding_status",
	)
	.bind(id)
	.bind(record.content.as_str())
	.bind(content_hash)
	.bind(record.phase.as_str())
	.bind(record.provider.as_str())
	.bind(record.model.as_str())
	.bind(f64::from(record.temperature))
	.bind(record.max_tokens)
	.bind(record.actual_tokens)
	.bind(tags)
	.bind(record.parent_id)
	.bind(record.session_id.as_deref())
	.bind(embedding.map(|embedding| vector::encode(&embedding.vector)))
	.bind(embedding.map(|embedding| embedding.vector.len() as i64))
	.bind(embedding.map(|embedding| embedding.model.as_str()))
	.bind(embedding.map(|embedding| embedding.provider.as_str()))
	.bind(embedding.map(|embedding| embedding.status).unwrap_or(EmbeddingStatus::Missing).as_str())
	.bind(now_ms)
	.fetch_one(executor)
	.await?;

	Ok(row)
}

/// Fills the embedding of a deduplicated record that was stored without one.
async fn fill_embedding<'e, E>(
	executor: E,
	id: Uuid,
	embedding: &NewEmbedding,
	now_ms: i64,
) -> Result<()>
where
	E: SqliteExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE prompts
SET
	embedding = ?1,
	embedding_dim = ?2,
	embedding_model = ?3,
	embedding_provider = ?4,
	embedding_status = ?5,
	updated_at = ?6
WHERE id = ?7 AND embedding_status != 'ok'",
	)
	.bind(vector::encode(&embedding.vector))
	.bind(embedding.vector.len() as i64)
	.bind(embedding.model.as_str())
	.bind(embedding.provider.as_str())
	.bind(embedding.status.as_str())
	.bind(now_ms)
	.bind(id)
	.execute(executor)
	.await?;

	Ok(())
}
