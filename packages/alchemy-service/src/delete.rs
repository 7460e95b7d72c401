use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AlchemyService, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
	pub id: Uuid,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
	pub id: Uuid,
	/// `false` when the record was already absent.
	pub deleted: bool,
}

impl AlchemyService {
	pub async fn delete(&self, req: DeleteRequest) -> Result<DeleteResponse> {
		let deleted = self.deadline(req.timeout_ms).run(self.records.delete(req.id)).await?;

		if deleted {
			tracing::info!(prompt_id = %req.id, "Prompt deleted.");
		}

		Ok(DeleteResponse { id: req.id, deleted })
	}
}
