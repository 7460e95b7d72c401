use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AlchemyService, Result};
use alchemy_domain::ranking::Weights;
use alchemy_storage::weights;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightsResponse {
	pub weights: Weights,
	pub version: i64,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

impl AlchemyService {
	/// The latest committed ranking weights.
	pub async fn current_weights(&self) -> Result<WeightsResponse> {
		let stored = weights::current(&self.db.pool).await?;

		Ok(WeightsResponse {
			weights: stored.weights,
			version: stored.version,
			updated_at: stored.updated_at,
		})
	}
}
