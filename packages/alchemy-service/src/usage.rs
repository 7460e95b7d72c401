use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Error, Result};
use alchemy_storage::Error as StorageError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordUsageRequest {
	/// Records the caller actually used, typically consumed search hits.
	pub ids: Vec<Uuid>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageView {
	pub id: Uuid,
	pub relevance_score: f32,
	pub usage_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordUsageResponse {
	pub updated: Vec<UsageView>,
	pub missing: Vec<Uuid>,
}

impl AlchemyService {
	pub async fn record_usage(&self, req: RecordUsageRequest) -> Result<RecordUsageResponse> {
		self.record_usage_at(req, OffsetDateTime::now_utc()).await
	}

	/// Boosts each record once. Missing ids are reported, not treated as failures.
	pub async fn record_usage_at(
		&self,
		req: RecordUsageRequest,
		now: OffsetDateTime,
	) -> Result<RecordUsageResponse> {
		let deadline = self.deadline(req.timeout_ms);
		let boost = self.cfg.lifecycle.boost_increment;
		let mut updated = Vec::with_capacity(req.ids.len());
		let mut missing = Vec::new();

		for id in req.ids {
			match deadline.run(self.records.record_usage(id, boost, now)).await {
				Ok(outcome) => updated.push(UsageView {
					id: outcome.id,
					relevance_score: outcome.relevance_score,
					usage_count: outcome.usage_count,
				}),
				Err(StorageError::NotFound(_)) => missing.push(id),
				Err(err) => return Err(Error::from(err)),
			}
		}

		Ok(RecordUsageResponse { updated, missing })
	}
}
