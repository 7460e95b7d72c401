//! Feedback analysis for the weight trainer.
//!
//! A factor's adjustment signal is the mean co-movement of its historical value and the
//! observed effectiveness around the neutral midpoint: `4 * (factor - 0.5) * (effectiveness -
//! 0.5)`, which lies in `[-1, 1]`. A factor that is high when outcomes are good gains weight.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
	Phase,
	ranking::{self, Factor, Weights},
};
use alchemy_config::Learning;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
	Idle,
	Collecting,
	Analyzing,
	Updating,
	Aborted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
	Success,
	Failure,
	Neutral,
}

pub fn classify(effectiveness: f32, cfg: &Learning) -> Outcome {
	if effectiveness > cfg.success_threshold {
		Outcome::Success
	} else if effectiveness < cfg.failure_threshold {
		Outcome::Failure
	} else {
		Outcome::Neutral
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
	Success,
	Failure,
	Optimization,
}
impl PatternType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failure => "failure",
			Self::Optimization => "optimization",
		}
	}
}
impl fmt::Display for PatternType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for PatternType {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"success" => Ok(Self::Success),
			"failure" => Ok(Self::Failure),
			"optimization" => Ok(Self::Optimization),
			_ => Err(format!("Unknown pattern type {raw:?}.")),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct PatternObservation {
	pub pattern_type: PatternType,
	pub signature: String,
	pub confidence: f32,
}

pub fn signature(phase: Phase, temperature: f32, actual_tokens: i64) -> String {
	let temperature = if temperature < 0.4 {
		"low"
	} else if temperature <= 0.8 {
		"mid"
	} else {
		"high"
	};
	let tokens = match actual_tokens {
		..=500 => "lean",
		501..=2_000 => "moderate",
		_ => "heavy",
	};

	format!("phase={phase};temperature={temperature};tokens={tokens}")
}

/// Patterns implied by one feedback event. Neutral events imply none.
pub fn observe(
	outcome: Outcome,
	effectiveness: f32,
	signature: &str,
	derived: bool,
) -> Vec<PatternObservation> {
	let observation = |pattern_type, confidence| PatternObservation {
		pattern_type,
		signature: signature.to_string(),
		confidence,
	};

	match outcome {
		Outcome::Success if derived => vec![
			observation(PatternType::Success, effectiveness),
			observation(PatternType::Optimization, effectiveness),
		],
		Outcome::Success => vec![observation(PatternType::Success, effectiveness)],
		Outcome::Failure => vec![observation(PatternType::Failure, 1.0 - effectiveness)],
		Outcome::Neutral => Vec::new(),
	}
}

/// Running mean of observation confidences.
pub fn merge_confidence(confidence: f32, usage_count: i64, observed: f32) -> f32 {
	let count = usage_count.max(0) as f32;

	ranking::clamp_unit((confidence * count + observed) / (count + 1.0))
}

/// Consolidation drops patterns below half the configured confidence bar.
pub fn prune_threshold(cfg: &Learning) -> f32 {
	cfg.min_confidence / 2.0
}

pub fn co_movement(value: f32, effectiveness: f32) -> f64 {
	4.0 * (f64::from(value) - 0.5) * (f64::from(effectiveness) - 0.5)
}

#[derive(Clone, Debug, Default)]
pub struct SignalAccumulator {
	sums: [f64; 5],
	counts: [u32; 5],
}
impl SignalAccumulator {
	pub fn add(&mut self, factor: Factor, value: f32, effectiveness: f32) {
		let slot = slot(factor);

		self.sums[slot] += co_movement(value, effectiveness);
		self.counts[slot] += 1;
	}

	pub fn samples(&self, factor: Factor) -> u32 {
		self.counts[slot(factor)]
	}

	/// Mean co-movement, or `None` when the factor had no usable samples.
	pub fn signal(&self, factor: Factor) -> Option<f32> {
		let slot = slot(factor);

		if self.counts[slot] == 0 {
			return None;
		}

		Some((self.sums[slot] / f64::from(self.counts[slot])).clamp(-1.0, 1.0) as f32)
	}
}

pub fn step(old: f32, signal: f32, cfg: &Learning) -> f32 {
	let delta = (cfg.learning_rate * signal).clamp(-cfg.max_step, cfg.max_step);

	ranking::clamp_unit(old + delta)
}

pub fn apply(weights: &Weights, signals: &SignalAccumulator, cfg: &Learning) -> Weights {
	let mut next = *weights;

	for factor in Factor::ALL {
		if let Some(signal) = signals.signal(factor) {
			next.set(factor, step(weights.get(factor), signal, cfg));
		}
	}

	next
}

fn slot(factor: Factor) -> usize {
	match factor {
		Factor::Temperature => 0,
		Factor::TokenUsage => 1,
		Factor::Context => 2,
		Factor::Recency => 3,
		Factor::Performance => 4,
	}
}
