//! Multi-factor relevance scoring.
//!
//! Every factor is normalized independently into `[0, 1]` and the final score is the plain
//! weighted sum of the factors. Weights are not renormalized, so a weight set that sums to
//! more than one produces scores above one.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::Phase;
use alchemy_config::{Ranking, TemperatureBand};

/// Value used for factors whose input is unknown.
pub const NEUTRAL: f32 = 0.5;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
	Temperature,
	TokenUsage,
	Context,
	Recency,
	Performance,
}
impl Factor {
	pub const ALL: [Factor; 5] =
		[Factor::Temperature, Factor::TokenUsage, Factor::Context, Factor::Recency, Factor::Performance];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Temperature => "temperature",
			Self::TokenUsage => "token_usage",
			Self::Context => "context",
			Self::Recency => "recency",
			Self::Performance => "performance",
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Weights {
	pub temperature: f32,
	pub token_usage: f32,
	pub context: f32,
	pub recency: f32,
	pub performance: f32,
}
impl Weights {
	pub fn get(&self, factor: Factor) -> f32 {
		match factor {
			Factor::Temperature => self.temperature,
			Factor::TokenUsage => self.token_usage,
			Factor::Context => self.context,
			Factor::Recency => self.recency,
			Factor::Performance => self.performance,
		}
	}

	pub fn set(&mut self, factor: Factor, value: f32) {
		let slot = match factor {
			Factor::Temperature => &mut self.temperature,
			Factor::TokenUsage => &mut self.token_usage,
			Factor::Context => &mut self.context,
			Factor::Recency => &mut self.recency,
			Factor::Performance => &mut self.performance,
		};

		*slot = value;
	}
}
impl From<alchemy_config::RankingWeights> for Weights {
	fn from(seed: alchemy_config::RankingWeights) -> Self {
		Self {
			temperature: seed.temperature,
			token_usage: seed.token_usage,
			context: seed.context,
			recency: seed.recency,
			performance: seed.performance,
		}
	}
}

/// Per-factor values of one scored record, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Factors {
	pub temperature: f32,
	pub token_usage: f32,
	pub context: f32,
	pub recency: f32,
	pub performance: f32,
}
impl Factors {
	pub fn get(&self, factor: Factor) -> f32 {
		match factor {
			Factor::Temperature => self.temperature,
			Factor::TokenUsage => self.token_usage,
			Factor::Context => self.context,
			Factor::Recency => self.recency,
			Factor::Performance => self.performance,
		}
	}

	pub fn score(&self, weights: &Weights) -> f32 {
		Factor::ALL.into_iter().map(|factor| weights.get(factor) * self.get(factor)).sum()
	}
}

#[derive(Clone, Copy, Debug)]
pub struct FactorInput {
	pub phase: Phase,
	pub temperature: f32,
	pub max_tokens: i64,
	pub actual_tokens: i64,
	/// Similarity to the query, when ranking a search result set.
	pub similarity: Option<f32>,
	/// Days since last use, or since creation for records never used.
	pub age_days: f64,
	/// Moving average of past effectiveness for the record or its lineage.
	pub performance: Option<f32>,
}

pub fn factors(cfg: &Ranking, input: &FactorInput) -> Factors {
	Factors {
		temperature: temperature_factor(cfg, input.phase, input.temperature),
		token_usage: token_factor(input.max_tokens, input.actual_tokens),
		context: context_factor(input.similarity),
		recency: recency_factor(cfg.recency_tau_days, input.age_days),
		performance: input.performance.map(clamp_unit).unwrap_or(NEUTRAL),
	}
}

pub fn temperature_band(cfg: &Ranking, phase: Phase) -> &TemperatureBand {
	cfg.phase_temperature.get(phase.as_str()).unwrap_or(&cfg.temperature)
}

pub fn temperature_factor(cfg: &Ranking, phase: Phase, temperature: f32) -> f32 {
	let band = temperature_band(cfg, phase);
	let distance = if temperature < band.min {
		band.min - temperature
	} else if temperature > band.max {
		temperature - band.max
	} else {
		0.0
	};

	clamp_unit(1.0 - distance / band.falloff)
}

pub fn token_factor(max_tokens: i64, actual_tokens: i64) -> f32 {
	if max_tokens <= 0 {
		return NEUTRAL;
	}

	clamp_unit(1.0 - actual_tokens.max(0) as f32 / max_tokens as f32)
}

pub fn context_factor(similarity: Option<f32>) -> f32 {
	similarity.map(clamp_unit).unwrap_or(0.0)
}

pub fn recency_factor(tau_days: f32, age_days: f64) -> f32 {
	let age_days = age_days.max(0.0);

	clamp_unit((-age_days / f64::from(tau_days)).exp() as f32)
}

/// Exponential moving average seeded with the first value, in iteration order.
pub fn ema<I>(alpha: f32, values: I) -> Option<f32>
where
	I: IntoIterator<Item = f32>,
{
	values.into_iter().fold(None, |acc, value| match acc {
		None => Some(value),
		Some(prev) => Some(alpha * value + (1.0 - alpha) * prev),
	})
}

/// Descending by primary score, then descending by relevance, then ascending by id.
pub fn compare_desc<I>(a: (f32, f32, &I), b: (f32, f32, &I)) -> Ordering
where
	I: Ord + ?Sized,
{
	b.0.total_cmp(&a.0).then_with(|| b.1.total_cmp(&a.1)).then_with(|| a.2.cmp(b.2))
}

pub fn clamp_unit(value: f32) -> f32 {
	if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
