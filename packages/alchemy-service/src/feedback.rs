use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Error, Result};
use alchemy_storage::{feedback, models::NewFeedback};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordFeedbackRequest {
	pub prompt_id: Uuid,
	pub effectiveness: f32,
	#[serde(default)]
	pub rating: Option<u8>,
	/// Similarity of the search hit this feedback is about.
	#[serde(default)]
	pub similarity: Option<f32>,
	#[serde(default)]
	pub session_id: Option<String>,
	#[serde(default)]
	pub context: String,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordFeedbackResponse {
	pub id: Uuid,
	pub seq: i64,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}

impl AlchemyService {
	pub async fn record_feedback(&self, req: RecordFeedbackRequest) -> Result<RecordFeedbackResponse> {
		self.record_feedback_at(req, OffsetDateTime::now_utc()).await
	}

	pub async fn record_feedback_at(
		&self,
		req: RecordFeedbackRequest,
		now: OffsetDateTime,
	) -> Result<RecordFeedbackResponse> {
		crate::check_unit("effectiveness", req.effectiveness)?;

		if req.rating.is_some_and(|rating| !(1..=5).contains(&rating)) {
			return Err(Error::InvalidRequest {
				message: "rating must be in the range 1-5.".to_string(),
			});
		}
		if req.similarity.is_some_and(|similarity| !(-1.0..=1.0).contains(&similarity)) {
			return Err(Error::InvalidRequest {
				message: "similarity must be in the range -1.0-1.0.".to_string(),
			});
		}

		let deadline = self.deadline(req.timeout_ms);

		deadline.run(self.records.get(req.prompt_id)).await?;

		let event = NewFeedback {
			prompt_id: req.prompt_id,
			effectiveness: req.effectiveness,
			rating: req.rating,
			similarity: req.similarity,
			session_id: req.session_id.filter(|session| !session.trim().is_empty()),
			context: req.context,
		};
		let event = &event;
		let stored = deadline
			.run(self.db.retry_on_conflict("record_feedback", move || {
				feedback::insert(&self.db.pool, event, now)
			}))
			.await?;

		tracing::info!(
			prompt_id = %stored.prompt_id,
			seq = stored.seq,
			effectiveness = stored.effectiveness,
			"Feedback recorded."
		);

		Ok(RecordFeedbackResponse { id: stored.id, seq: stored.seq, created_at: stored.created_at })
	}
}
