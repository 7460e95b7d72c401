use std::{collections::HashMap, path::PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub embedding: EmbeddingProviderConfig,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub lifecycle: Lifecycle,
	#[serde(default)]
	pub learning: Learning,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
	/// Upper bound applied to foreground operations that do not carry their own timeout.
	#[serde(default = "default_request_timeout_ms")]
	pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub sqlite: Sqlite,
}

#[derive(Debug, Deserialize)]
pub struct Sqlite {
	pub path: PathBuf,
	pub pool_max_conns: u32,
	#[serde(default = "default_busy_timeout_ms")]
	pub busy_timeout_ms: u64,
	#[serde(default = "default_max_conflict_retries")]
	pub max_conflict_retries: u32,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Known vector widths for other embedding models already present in the store.
	#[serde(default)]
	pub registered_dimensions: HashMap<String, u32>,
}
impl EmbeddingProviderConfig {
	/// Dimension registered for `model`, falling back to the active model's dimensions.
	pub fn dimension_for(&self, model: &str) -> Option<u32> {
		if model == self.model {
			return Some(self.dimensions);
		}

		self.registered_dimensions.get(model).copied()
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Records below this relevance never enter the candidate pool.
	pub relevance_floor: f32,
	pub candidate_multiplier: u32,
	pub scan_batch_size: u32,
	pub default_limit: u32,
	pub default_min_similarity: f32,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			relevance_floor: 0.1,
			candidate_multiplier: 10,
			scan_batch_size: 256,
			default_limit: 10,
			default_min_similarity: 0.0,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub weights: RankingWeights,
	pub temperature: TemperatureBand,
	/// Per-phase overrides keyed by phase name, e.g. "prima-materia".
	pub phase_temperature: HashMap<String, TemperatureBand>,
	pub recency_tau_days: f32,
	pub performance_alpha: f32,
	pub lineage_depth: u32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			weights: RankingWeights::default(),
			temperature: TemperatureBand { min: 0.6, max: 0.8, falloff: 0.7 },
			phase_temperature: HashMap::from([
				("prima-materia".to_string(), TemperatureBand { min: 0.7, max: 0.9, falloff: 0.7 }),
				("solutio".to_string(), TemperatureBand { min: 0.6, max: 0.8, falloff: 0.7 }),
				("coagulatio".to_string(), TemperatureBand { min: 0.5, max: 0.7, falloff: 0.7 }),
			]),
			recency_tau_days: 30.0,
			performance_alpha: 0.3,
			lineage_depth: 3,
		}
	}
}

/// Seed values for the persisted weight row.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
	pub temperature: f32,
	pub token_usage: f32,
	pub context: f32,
	pub recency: f32,
	pub performance: f32,
}
impl Default for RankingWeights {
	fn default() -> Self {
		Self { temperature: 0.2, token_usage: 0.2, context: 0.3, recency: 0.1, performance: 0.2 }
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TemperatureBand {
	pub min: f32,
	pub max: f32,
	/// Distance outside the band at which the factor reaches zero.
	pub falloff: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Lifecycle {
	pub decay_interval_secs: u64,
	pub decay_factor: f32,
	pub decay_floor: f32,
	pub boost_increment: f32,
	pub cleanup_interval_secs: u64,
	pub cleanup_threshold: f32,
	pub retention_days: u32,
	pub consolidation_interval_secs: u64,
	pub batch_size: u32,
}
impl Default for Lifecycle {
	fn default() -> Self {
		Self {
			decay_interval_secs: 3_600,
			decay_factor: 0.99,
			decay_floor: 0.01,
			boost_increment: 0.1,
			cleanup_interval_secs: 86_400,
			cleanup_threshold: 0.1,
			retention_days: 90,
			consolidation_interval_secs: 21_600,
			batch_size: 500,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Learning {
	pub min_samples: u32,
	pub learning_rate: f32,
	/// Cap on the absolute change of any single weight per training run.
	pub max_step: f32,
	pub success_threshold: f32,
	pub failure_threshold: f32,
	pub max_patterns: u32,
	pub min_confidence: f32,
	pub training_interval_secs: u64,
	pub max_retries: u32,
}
impl Default for Learning {
	fn default() -> Self {
		Self {
			min_samples: 100,
			learning_rate: 0.1,
			max_step: 0.05,
			success_threshold: 0.8,
			failure_threshold: 0.3,
			max_patterns: 1_000,
			min_confidence: 0.6,
			training_interval_secs: 86_400,
			max_retries: 3,
		}
	}
}

fn default_request_timeout_ms() -> u64 {
	30_000
}

fn default_busy_timeout_ms() -> u64 {
	5_000
}

fn default_max_conflict_retries() -> u32 {
	3
}
