use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Result};
use alchemy_domain::Phase;
use alchemy_storage::models::PromptRecord;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetRequest {
	pub id: Uuid,
	/// Count this read as a use: boosts relevance and bumps the usage count.
	#[serde(default)]
	pub track_usage: bool,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

/// Serializable view of a stored prompt. The embedding vector itself is omitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptView {
	pub id: Uuid,
	pub content: String,
	pub content_hash: String,
	pub phase: Phase,
	pub provider: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: i64,
	pub actual_tokens: i64,
	pub tags: Vec<String>,
	pub parent_id: Option<Uuid>,
	pub session_id: Option<String>,
	pub embedding_dim: Option<usize>,
	pub embedding_model: Option<String>,
	pub embedding_provider: Option<String>,
	pub embedding_status: String,
	pub relevance_score: f32,
	pub usage_count: i64,
	#[serde(with = "crate::time_serde::option")]
	pub last_used_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl From<&PromptRecord> for PromptView {
	fn from(record: &PromptRecord) -> Self {
		Self {
			id: record.id,
			content: record.content.clone(),
			content_hash: record.content_hash.clone(),
			phase: record.phase,
			provider: record.provider.clone(),
			model: record.model.clone(),
			temperature: record.temperature,
			max_tokens: record.max_tokens,
			actual_tokens: record.actual_tokens,
			tags: record.tags.clone(),
			parent_id: record.parent_id,
			session_id: record.session_id.clone(),
			embedding_dim: record.embedding.as_ref().map(Vec::len),
			embedding_model: record.embedding_model.clone(),
			embedding_provider: record.embedding_provider.clone(),
			embedding_status: record.embedding_status.as_str().to_string(),
			relevance_score: record.relevance_score,
			usage_count: record.usage_count,
			last_used_at: record.last_used_at,
			created_at: record.created_at,
			updated_at: record.updated_at,
		}
	}
}

impl AlchemyService {
	pub async fn get(&self, req: GetRequest) -> Result<PromptView> {
		self.get_at(req, OffsetDateTime::now_utc()).await
	}

	pub async fn get_at(&self, req: GetRequest, now: OffsetDateTime) -> Result<PromptView> {
		let deadline = self.deadline(req.timeout_ms);

		if req.track_usage {
			let outcome = deadline
				.run(self.records.record_usage(req.id, self.cfg.lifecycle.boost_increment, now))
				.await?;

			tracing::debug!(
				prompt_id = %outcome.id,
				relevance_score = outcome.relevance_score,
				usage_count = outcome.usage_count,
				"Usage recorded on read."
			);
		}

		let record = deadline.run(self.records.get(req.id)).await?;

		Ok(PromptView::from(&record))
	}
}
