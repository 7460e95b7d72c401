//! Learning-to-rank: turns accumulated feedback into pattern updates and new ranking weights.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Error, Result, rank};
use alchemy_domain::{
	learning::{self, Outcome, PatternObservation, SignalAccumulator, TrainingState},
	ranking::{self, Factor, Weights},
};
use alchemy_storage::{
	feedback,
	jobs::{self, Job},
	models::{FeedbackEvent, PromptRecord},
	patterns, weights,
};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TrainingRequest {
	/// Train even when fewer than `learning.min_samples` events are pending.
	#[serde(default)]
	pub force: bool,
	/// Analyze and report without writing patterns, weights, or the watermark.
	#[serde(default)]
	pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingOutcome {
	Completed,
	DryRun,
	AbortedInsufficientData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactorSignal {
	pub factor: Factor,
	/// Mean co-movement of the factor with effectiveness; `None` without samples.
	pub signal: Option<f32>,
	pub samples: u32,
	pub delta: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatternChanges {
	pub observed: usize,
	pub upserted: usize,
	pub evicted: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingReport {
	pub outcome: TrainingOutcome,
	pub states: Vec<TrainingState>,
	pub attempts: u32,
	pub events: usize,
	pub success: usize,
	pub failure: usize,
	pub neutral: usize,
	pub watermark_before: i64,
	pub watermark_after: i64,
	pub weights_version_before: i64,
	pub weights_version_after: i64,
	pub old_weights: Weights,
	pub new_weights: Weights,
	pub signals: Vec<FactorSignal>,
	pub patterns: PatternChanges,
}

struct Analysis {
	success: usize,
	failure: usize,
	neutral: usize,
	signals: SignalAccumulator,
	observations: Vec<PatternObservation>,
}

impl AlchemyService {
	pub async fn run_training(&self, req: TrainingRequest) -> Result<TrainingReport> {
		self.run_training_at(req, OffsetDateTime::now_utc()).await
	}

	/// Runs the trainer, retrying the whole run when a concurrent commit wins.
	pub async fn run_training_at(
		&self,
		req: TrainingRequest,
		now: OffsetDateTime,
	) -> Result<TrainingReport> {
		let mut attempt = 0;

		loop {
			attempt += 1;

			match self.train_once(req, now).await {
				Err(Error::TransactionConflict { message })
					if attempt <= self.cfg.learning.max_retries =>
				{
					tracing::warn!(
						attempt,
						conflict = %message,
						"Training lost a commit race; retrying."
					);
				},
				Ok(mut report) => {
					report.attempts = attempt;

					return Ok(report);
				},
				Err(err) => return Err(err),
			}
		}
	}

	async fn train_once(&self, req: TrainingRequest, now: OffsetDateTime) -> Result<TrainingReport> {
		let cfg = &self.cfg.learning;
		let mut states = vec![TrainingState::Idle, TrainingState::Collecting];
		let job = jobs::load(&self.db.pool, Job::Training).await?;
		let events = feedback::since(&self.db.pool, job.watermark_seq).await?;
		let stored = weights::current(&self.db.pool).await?;
		let mut report = TrainingReport {
			outcome: TrainingOutcome::AbortedInsufficientData,
			states: Vec::new(),
			attempts: 0,
			events: events.len(),
			success: 0,
			failure: 0,
			neutral: 0,
			watermark_before: job.watermark_seq,
			watermark_after: job.watermark_seq,
			weights_version_before: stored.version,
			weights_version_after: stored.version,
			old_weights: stored.weights,
			new_weights: stored.weights,
			signals: Vec::new(),
			patterns: PatternChanges::default(),
		};

		tracing::info!(
			pending = events.len(),
			watermark = job.watermark_seq,
			"Training collected feedback."
		);

		if events.is_empty() || (events.len() < cfg.min_samples as usize && !req.force) {
			states.push(TrainingState::Aborted);

			report.states = states;

			tracing::info!(
				pending = events.len(),
				min_samples = cfg.min_samples,
				"Training aborted for insufficient data."
			);

			return Ok(report);
		}

		states.push(TrainingState::Analyzing);

		let analysis = self.analyze(&events).await?;
		let new_weights = learning::apply(&stored.weights, &analysis.signals, cfg);

		report.success = analysis.success;
		report.failure = analysis.failure;
		report.neutral = analysis.neutral;
		report.new_weights = new_weights;
		report.patterns.observed = analysis.observations.len();
		report.signals = Factor::ALL
			.into_iter()
			.map(|factor| FactorSignal {
				factor,
				signal: analysis.signals.signal(factor),
				samples: analysis.signals.samples(factor),
				delta: new_weights.get(factor) - stored.weights.get(factor),
			})
			.collect();

		if req.dry_run {
			states.push(TrainingState::Idle);

			report.outcome = TrainingOutcome::DryRun;
			report.states = states;

			return Ok(report);
		}

		states.push(TrainingState::Updating);

		// Events are read in sequence order, so the last one is the new watermark.
		let (last_seq, last_at) = events
			.last()
			.map(|event| (event.seq, event.created_at))
			.ok_or_else(|| Error::Storage { message: "Feedback window vanished.".to_string() })?;
		let mut tx = self.db.pool.begin().await?;

		for observation in &analysis.observations {
			patterns::upsert(&mut tx, observation, now).await?;
		}

		let evicted = patterns::enforce_cap(&mut tx, cfg.max_patterns).await?;
		let version = weights::compare_and_set(&mut tx, stored.version, &new_weights, now).await?;

		jobs::advance_watermark(&mut tx, job.watermark_seq, last_seq, Some(last_at), now).await?;

		tx.commit().await?;
		states.push(TrainingState::Idle);

		report.outcome = TrainingOutcome::Completed;
		report.states = states;
		report.watermark_after = last_seq;
		report.weights_version_after = version;
		report.patterns.upserted = analysis.observations.len();
		report.patterns.evicted = evicted;

		tracing::info!(
			events = report.events,
			success = report.success,
			failure = report.failure,
			version,
			watermark = last_seq,
			"Ranking weights updated."
		);

		Ok(report)
	}

	async fn analyze(&self, events: &[FeedbackEvent]) -> Result<Analysis> {
		let cfg = &self.cfg;
		let mut ids: Vec<Uuid> = events.iter().map(|event| event.prompt_id).collect();

		ids.sort();
		ids.dedup();

		let records: HashMap<Uuid, PromptRecord> = self
			.records
			.get_many(&ids)
			.await?
			.into_iter()
			.map(|record| (record.id, record))
			.collect();
		let history = feedback::history(&self.db.pool, &ids).await?;
		let mut analysis = Analysis {
			success: 0,
			failure: 0,
			neutral: 0,
			signals: SignalAccumulator::default(),
			observations: Vec::new(),
		};

		for event in events {
			let effectiveness = event.effectiveness;
			let outcome = learning::classify(effectiveness, &cfg.learning);

			match outcome {
				Outcome::Success => analysis.success += 1,
				Outcome::Failure => analysis.failure += 1,
				Outcome::Neutral => analysis.neutral += 1,
			}

			if let Some(similarity) = event.similarity {
				analysis.signals.add(
					Factor::Context,
					ranking::context_factor(Some(similarity)),
					effectiveness,
				);
			}

			// Records deleted since the event still count toward the partition.
			let Some(record) = records.get(&event.prompt_id) else {
				continue;
			};

			analysis.signals.add(
				Factor::Temperature,
				ranking::temperature_factor(&cfg.ranking, record.phase, record.temperature),
				effectiveness,
			);
			analysis.signals.add(
				Factor::TokenUsage,
				ranking::token_factor(record.max_tokens, record.actual_tokens),
				effectiveness,
			);
			analysis.signals.add(
				Factor::Recency,
				ranking::recency_factor(
					cfg.ranking.recency_tau_days,
					rank::age_days(record.created_at, event.created_at),
				),
				effectiveness,
			);

			let earlier = history
				.get(&record.id)
				.into_iter()
				.flatten()
				.take_while(|(seq, _)| *seq < event.seq)
				.map(|(_, eff)| *eff);

			let performance = match ranking::ema(cfg.ranking.performance_alpha, earlier) {
				Some(performance) => Some(performance),
				None => self.lineage_performance(record, Some(event.seq)).await?,
			};

			if let Some(performance) = performance {
				analysis.signals.add(Factor::Performance, performance, effectiveness);
			}

			let signature =
				learning::signature(record.phase, record.temperature, record.actual_tokens);

			analysis.observations.extend(learning::observe(
				outcome,
				effectiveness,
				&signature,
				record.parent_id.is_some(),
			));
		}

		Ok(analysis)
	}
}
