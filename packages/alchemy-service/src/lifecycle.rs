//! Scheduled relevance passes: decay, cleanup, and pattern consolidation.
//!
//! Each pass records its last run in job state and is a no-op until its interval has elapsed
//! again, so hosts may invoke them as often as they like.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{AlchemyService, Result};
use alchemy_domain::{learning, lifecycle};
use alchemy_storage::{
	jobs::{self, Job, JobState},
	patterns,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecayReport {
	pub due: bool,
	/// Whether this call performed the tick. Dry runs never do.
	pub ran: bool,
	pub dry_run: bool,
	#[serde(with = "crate::time_serde::option")]
	pub idle_since: Option<OffsetDateTime>,
	pub candidates: u64,
	pub decayed: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StaleView {
	pub id: Uuid,
	pub relevance_score: f32,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupReport {
	pub due: bool,
	pub ran: bool,
	pub dry_run: bool,
	#[serde(with = "crate::time_serde")]
	pub created_before: OffsetDateTime,
	pub candidates: Vec<StaleView>,
	pub deleted: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsolidationReport {
	pub due: bool,
	pub ran: bool,
	pub dry_run: bool,
	pub prune_threshold: f32,
	pub pruned: u64,
	pub evicted: u64,
	pub remaining: i64,
}

/// Result of one pass inside a maintenance run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PassOutcome<T> {
	Completed(T),
	Failed(String),
}
impl<T> PassOutcome<T> {
	pub fn report(&self) -> Option<&T> {
		match self {
			Self::Completed(report) => Some(report),
			Self::Failed(_) => None,
		}
	}

	fn from_result(pass: &str, result: Result<T>) -> Self {
		match result {
			Ok(report) => Self::Completed(report),
			Err(err) => {
				tracing::error!(pass, error = %err, "Maintenance pass failed.");

				Self::Failed(err.to_string())
			},
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaintenanceReport {
	pub dry_run: bool,
	pub decay: PassOutcome<DecayReport>,
	pub consolidation: PassOutcome<ConsolidationReport>,
	pub cleanup: PassOutcome<CleanupReport>,
}

impl AlchemyService {
	pub async fn run_lifecycle_maintenance(&self, dry_run: bool) -> MaintenanceReport {
		self.run_lifecycle_maintenance_at(dry_run, OffsetDateTime::now_utc()).await
	}

	/// Runs every pass. A failed pass is reported and does not stop the others.
	pub async fn run_lifecycle_maintenance_at(
		&self,
		dry_run: bool,
		now: OffsetDateTime,
	) -> MaintenanceReport {
		let decay = PassOutcome::from_result("decay", self.run_decay_at(dry_run, now).await);
		let consolidation = PassOutcome::from_result(
			"pattern_consolidation",
			self.consolidate_patterns_at(dry_run, now).await,
		);
		let cleanup = PassOutcome::from_result("cleanup", self.run_cleanup_at(dry_run, now).await);

		MaintenanceReport { dry_run, decay, consolidation, cleanup }
	}

	pub async fn run_decay(&self, dry_run: bool) -> Result<DecayReport> {
		self.run_decay_at(dry_run, OffsetDateTime::now_utc()).await
	}

	/// One decay tick over every record left unused since the previous tick.
	pub async fn run_decay_at(&self, dry_run: bool, now: OffsetDateTime) -> Result<DecayReport> {
		let cfg = &self.cfg.lifecycle;
		let state = jobs::load(&self.db.pool, Job::Decay).await?;
		let due = lifecycle::is_due(state.last_run_at, now, cfg.decay_interval_secs);
		// A first tick treats records idle for one full interval as unused.
		let idle_since = state.last_run_at.unwrap_or_else(|| {
			now.checked_sub(interval(cfg.decay_interval_secs)).unwrap_or(OffsetDateTime::UNIX_EPOCH)
		});
		let mut report = DecayReport {
			due,
			ran: false,
			dry_run,
			idle_since: Some(idle_since),
			candidates: 0,
			decayed: 0,
		};

		if !dry_run && (!due || !self.claim(Job::Decay, &state, now).await?) {
			tracing::debug!(due, "Decay tick skipped.");

			return Ok(report);
		}

		let mut after = None;

		loop {
			let ids = self
				.records
				.decay_candidates(idle_since, cfg.decay_floor, after, cfg.batch_size)
				.await?;
			let Some(last) = ids.last().copied() else {
				break;
			};

			report.candidates += ids.len() as u64;

			if !dry_run {
				for id in &ids {
					let decayed = self
						.records
						.decay_record(*id, cfg.decay_factor, cfg.decay_floor, idle_since, now)
						.await?;

					if decayed.is_some() {
						report.decayed += 1;
					}
				}
			}

			if ids.len() < cfg.batch_size as usize {
				break;
			}

			after = Some(last);
		}

		report.ran = !dry_run;

		tracing::info!(
			dry_run,
			candidates = report.candidates,
			decayed = report.decayed,
			"Decay tick finished."
		);

		Ok(report)
	}

	pub async fn run_cleanup(&self, dry_run: bool) -> Result<CleanupReport> {
		self.run_cleanup_at(dry_run, OffsetDateTime::now_utc()).await
	}

	/// Deletes records at or below the cleanup threshold that outlived the retention window.
	pub async fn run_cleanup_at(&self, dry_run: bool, now: OffsetDateTime) -> Result<CleanupReport> {
		let cfg = &self.cfg.lifecycle;
		let state = jobs::load(&self.db.pool, Job::Cleanup).await?;
		let due = lifecycle::is_due(state.last_run_at, now, cfg.cleanup_interval_secs);
		let created_before = now - lifecycle::retention_window(cfg);
		let mut report = CleanupReport {
			due,
			ran: false,
			dry_run,
			created_before,
			candidates: Vec::new(),
			deleted: Vec::new(),
		};

		if !dry_run && (!due || !self.claim(Job::Cleanup, &state, now).await?) {
			tracing::debug!(due, "Cleanup skipped.");

			return Ok(report);
		}

		let mut after = None;

		loop {
			let page = self
				.records
				.cleanup_candidates(cfg.cleanup_threshold, created_before, after, cfg.batch_size)
				.await?;
			let Some(last) = page.last().map(|stale| stale.id) else {
				break;
			};
			let full_page = page.len() >= cfg.batch_size as usize;

			for stale in page {
				if !lifecycle::is_stale(stale.relevance_score, stale.created_at, now, cfg) {
					continue;
				}
				if !dry_run
					&& self
						.records
						.delete_if_stale(stale.id, cfg.cleanup_threshold, created_before)
						.await?
				{
					tracing::info!(prompt_id = %stale.id, "Stale prompt deleted.");

					report.deleted.push(stale.id);
				}

				report.candidates.push(StaleView {
					id: stale.id,
					relevance_score: stale.relevance_score,
					created_at: stale.created_at,
				});
			}

			if !full_page {
				break;
			}

			after = Some(last);
		}

		report.ran = !dry_run;

		tracing::info!(
			dry_run,
			candidates = report.candidates.len(),
			deleted = report.deleted.len(),
			"Cleanup finished."
		);

		Ok(report)
	}

	pub async fn consolidate_patterns(&self, dry_run: bool) -> Result<ConsolidationReport> {
		self.consolidate_patterns_at(dry_run, OffsetDateTime::now_utc()).await
	}

	/// Drops weak patterns and enforces the pattern cap in one transaction.
	pub async fn consolidate_patterns_at(
		&self,
		dry_run: bool,
		now: OffsetDateTime,
	) -> Result<ConsolidationReport> {
		let learning_cfg = &self.cfg.learning;
		let state = jobs::load(&self.db.pool, Job::PatternConsolidation).await?;
		let due = lifecycle::is_due(
			state.last_run_at,
			now,
			self.cfg.lifecycle.consolidation_interval_secs,
		);
		let prune_threshold = learning::prune_threshold(learning_cfg);
		let mut report = ConsolidationReport {
			due,
			ran: false,
			dry_run,
			prune_threshold,
			pruned: 0,
			evicted: 0,
			remaining: 0,
		};

		if dry_run {
			let total = patterns::count(&self.db.pool).await?;
			let weak = patterns::count_below(&self.db.pool, prune_threshold).await?;
			let kept = total - weak;
			let evicted = (kept - i64::from(learning_cfg.max_patterns)).max(0);

			report.pruned = weak as u64;
			report.evicted = evicted as u64;
			report.remaining = kept - evicted;

			return Ok(report);
		}
		if !due {
			report.remaining = patterns::count(&self.db.pool).await?;

			return Ok(report);
		}

		let cap = learning_cfg.max_patterns;
		let previous = state.last_run_at;
		let outcome = self
			.db
			.retry_on_conflict("consolidate_patterns", move || async move {
				let mut tx = self.db.pool.begin().await?;

				if !jobs::claim_run(&mut tx, Job::PatternConsolidation, previous, now).await? {
					return Ok(None);
				}

				let pruned = patterns::prune_below(&mut tx, prune_threshold).await?;
				let evicted = patterns::enforce_cap(&mut tx, cap).await?;
				let remaining = patterns::count(&mut *tx).await?;

				tx.commit().await?;

				Ok(Some((pruned, evicted, remaining)))
			})
			.await?;

		if let Some((pruned, evicted, remaining)) = outcome {
			report.ran = true;
			report.pruned = pruned;
			report.evicted = evicted;
			report.remaining = remaining;

			tracing::info!(pruned, evicted, remaining, "Patterns consolidated.");
		}

		Ok(report)
	}

	async fn claim(&self, job: Job, state: &JobState, now: OffsetDateTime) -> Result<bool> {
		let previous = state.last_run_at;
		let claimed = self
			.db
			.retry_on_conflict("claim_run", move || async move {
				let mut conn = self.db.pool.acquire().await?;

				jobs::claim_run(&mut conn, job, previous, now).await
			})
			.await?;

		if !claimed {
			tracing::debug!(job = job.as_str(), "Another runner claimed this tick.");
		}

		Ok(claimed)
	}
}

fn interval(secs: u64) -> Duration {
	Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
