pub mod delete;
pub mod feedback;
pub mod get;
pub mod lifecycle;
pub mod put;
pub mod rank;
pub mod relationships;
pub mod search;
pub mod time_serde;
pub mod training;
pub mod usage;
pub mod weights;

mod error;

pub use delete::{DeleteRequest, DeleteResponse};
pub use error::{Error, Result};
pub use feedback::{RecordFeedbackRequest, RecordFeedbackResponse};
pub use get::{GetRequest, PromptView};
pub use lifecycle::{
	CleanupReport, ConsolidationReport, DecayReport, MaintenanceReport, PassOutcome, StaleView,
};
pub use put::{EmbeddingInput, PutRequest, PutResponse};
pub use rank::{RankCandidate, RankRequest, RankResponse, RankedItem};
pub use relationships::{AddRelationshipRequest, RelationshipView, RelationshipsResponse};
pub use search::{
	SearchFilters, SearchHit, SearchReport, SearchRequest, SearchResponse, SearchTextRequest,
};
pub use training::{FactorSignal, PatternChanges, TrainingOutcome, TrainingReport, TrainingRequest};
pub use usage::{RecordUsageRequest, RecordUsageResponse, UsageView};
pub use weights::WeightsResponse;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use alchemy_config::{Config, EmbeddingProviderConfig};
use alchemy_providers::embedding;
use alchemy_storage::{Deadline, RecordStore, db::Db, models::EmbeddingStatus};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, alchemy_providers::Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

/// Entry point for every outbound operation.
///
/// Record-level reads and writes go through `records`; feedback, weights, patterns, and job
/// state always live in `db`.
pub struct AlchemyService {
	pub cfg: Config,
	pub db: Db,
	pub records: Arc<dyn RecordStore>,
	pub providers: Providers,
}
impl AlchemyService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self::with_providers(cfg, db, Providers::default())
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		let records: Arc<dyn RecordStore> = Arc::new(db.clone());

		Self { cfg, db, records, providers }
	}

	pub fn with_record_store(
		cfg: Config,
		db: Db,
		records: Arc<dyn RecordStore>,
		providers: Providers,
	) -> Self {
		Self { cfg, db, records, providers }
	}

	pub(crate) fn deadline(&self, timeout_ms: Option<u64>) -> Deadline {
		match timeout_ms.unwrap_or(self.cfg.service.request_timeout_ms) {
			0 => Deadline::none(),
			ms => Deadline::after(Duration::from_millis(ms)),
		}
	}

	/// Embeds one text with the configured provider.
	pub(crate) async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
		let vectors =
			self.providers.embedding.embed(&self.cfg.embedding, &[text.to_string()]).await?;

		vectors.into_iter().next().ok_or_else(|| Error::EmbeddingUnavailable {
			message: "Embedding provider returned no vectors.".to_string(),
		})
	}

	/// Status of a vector claimed to come from `model`.
	pub(crate) fn embedding_status(&self, model: &str, vector: &[f32]) -> EmbeddingStatus {
		match self.cfg.embedding.dimension_for(model) {
			Some(dim) if dim as usize == vector.len() => EmbeddingStatus::Ok,
			_ => EmbeddingStatus::DimensionMismatch,
		}
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, alchemy_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

pub(crate) fn check_vector(vector: &[f32]) -> Result<()> {
	if vector.is_empty() {
		return Err(Error::InvalidRequest { message: "Embedding must not be empty.".to_string() });
	}
	if let Some(index) = vector.iter().position(|value| !value.is_finite()) {
		return Err(Error::MalformedVector {
			message: format!("Embedding component {index} is not finite."),
		});
	}

	Ok(())
}

pub(crate) fn check_unit(label: &str, value: f32) -> Result<()> {
	if !(0.0..=1.0).contains(&value) {
		return Err(Error::InvalidRequest { message: format!("{label} must be in the range 0.0-1.0.") });
	}

	Ok(())
}
