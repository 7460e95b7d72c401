use std::time::Duration as StdDuration;

use color_eyre::Result;
use time::OffsetDateTime;
use tokio::time as tokio_time;

use alchemy_domain::lifecycle;
use alchemy_service::{AlchemyService, MaintenanceReport, TrainingReport, TrainingRequest};
use alchemy_storage::jobs::{self, Job};

const TICK_INTERVAL_MS: u64 = 30_000;

pub struct WorkerState {
	pub service: AlchemyService,
	pub tick_interval: StdDuration,
	last_training_attempt: Option<OffsetDateTime>,
}
impl WorkerState {
	pub fn new(service: AlchemyService) -> Self {
		Self {
			service,
			tick_interval: StdDuration::from_millis(TICK_INTERVAL_MS),
			last_training_attempt: None,
		}
	}
}

/// What one scheduler tick did.
#[derive(Debug)]
pub struct TickReport {
	pub maintenance: MaintenanceReport,
	/// `None` when training was not due.
	pub training: Option<Result<TrainingReport, String>>,
}

pub async fn run_worker(mut state: WorkerState) -> Result<()> {
	let shutdown = tokio::signal::ctrl_c();

	tokio::pin!(shutdown);

	tracing::info!(tick_ms = state.tick_interval.as_millis() as u64, "Worker started.");

	loop {
		tick(&mut state, OffsetDateTime::now_utc()).await;

		tokio::select! {
			result = &mut shutdown => {
				result?;

				tracing::info!("Worker shutting down.");

				return Ok(());
			},
			_ = tokio_time::sleep(state.tick_interval) => {},
		}
	}
}

/// Runs every pass that is due at `now`. Failures are logged and retried on a later tick.
pub async fn tick(state: &mut WorkerState, now: OffsetDateTime) -> TickReport {
	let maintenance = state.service.run_lifecycle_maintenance_at(false, now).await;

	tracing::debug!(
		decay = maintenance.decay.report().is_some_and(|report| report.ran),
		cleanup = maintenance.cleanup.report().is_some_and(|report| report.ran),
		consolidation = maintenance.consolidation.report().is_some_and(|report| report.ran),
		"Maintenance tick finished."
	);

	let training = match training_due(state, now).await {
		Ok(true) => {
			state.last_training_attempt = Some(now);

			let result = state.service.run_training_at(TrainingRequest::default(), now).await;

			if let Err(err) = &result {
				tracing::error!(error = %err, "Training run failed.");
			}

			Some(result.map_err(|err| err.to_string()))
		},
		Ok(false) => None,
		Err(err) => {
			tracing::error!(error = %err, "Failed to read training schedule.");

			None
		},
	};

	TickReport { maintenance, training }
}

// Aborted runs leave the persisted schedule untouched, so attempts are also spaced locally.
async fn training_due(state: &WorkerState, now: OffsetDateTime) -> Result<bool> {
	let interval = state.service.cfg.learning.training_interval_secs;

	if !lifecycle::is_due(state.last_training_attempt, now, interval) {
		return Ok(false);
	}

	let job = jobs::load(&state.service.db.pool, Job::Training).await?;

	Ok(lifecycle::is_due(job.last_run_at, now, interval))
}

#[cfg(test)]
mod tests {
	use std::path::Path;

	use time::{Duration, macros::datetime};

	use super::*;
	use alchemy_domain::ranking::Weights;
	use alchemy_service::TrainingOutcome;
	use alchemy_storage::db::Db;
	use alchemy_testkit::TestDatabase;

	const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

	async fn open_state(test_db: &TestDatabase) -> WorkerState {
		let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../alchemy.example.toml");
		let mut cfg = alchemy_config::load(&path).expect("Failed to load example config.");

		cfg.storage.sqlite.path = test_db.path().to_path_buf();

		let db = Db::connect(&cfg.storage.sqlite).await.expect("Failed to open SQLite database.");

		db.ensure_schema(Weights::from(cfg.ranking.weights), NOW)
			.await
			.expect("Failed to ensure schema.");

		WorkerState::new(AlchemyService::new(cfg, db))
	}

	#[tokio::test]
	async fn ticks_only_run_passes_that_are_due() {
		let test_db = TestDatabase::new().expect("Failed to allocate test database.");
		let mut state = open_state(&test_db).await;
		let first = tick(&mut state, NOW).await;

		assert!(first.maintenance.decay.report().is_some_and(|report| report.ran));
		assert!(first.maintenance.cleanup.report().is_some_and(|report| report.ran));
		assert!(first.maintenance.consolidation.report().is_some_and(|report| report.ran));
		assert!(matches!(
			first.training,
			Some(Ok(ref report)) if report.outcome == TrainingOutcome::AbortedInsufficientData
		));

		let second = tick(&mut state, NOW + Duration::minutes(1)).await;

		assert!(second.maintenance.decay.report().is_some_and(|report| !report.due));
		assert!(second.maintenance.cleanup.report().is_some_and(|report| !report.due));
		assert!(second.training.is_none());

		let later = tick(&mut state, NOW + Duration::hours(1)).await;

		assert!(later.maintenance.decay.report().is_some_and(|report| report.ran));
		assert!(later.maintenance.cleanup.report().is_some_and(|report| !report.due));

		state.service.db.pool.close().await;
		test_db.cleanup().await.expect("Failed to cleanup test database.");
	}
}
