use std::sync::Arc;

use time::Duration;

use super::{NOW, StubEmbedding, close, open_service, put_request};
use alchemy_service::{Error, GetRequest, PassOutcome, RecordUsageRequest};
use alchemy_testkit::TestDatabase;

async fn relevance(service: &alchemy_service::AlchemyService, id: uuid::Uuid) -> f32 {
	service
		.get(GetRequest { id, track_usage: false, timeout_ms: None })
		.await
		.expect("Failed to fetch prompt.")
		.relevance_score
}

#[tokio::test]
async fn decay_ticks_once_per_interval_and_spares_used_records() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let idle = service
		.put_at(put_request("idle prompt", None), NOW - Duration::hours(2))
		.await
		.expect("Failed to save prompt.");
	let busy = service
		.put_at(put_request("busy prompt", None), NOW - Duration::hours(2))
		.await
		.expect("Failed to save prompt.");
	let preview = service.run_decay_at(true, NOW).await.expect("Dry run failed.");

	assert!(preview.due);
	assert!(!preview.ran);
	assert_eq!(preview.candidates, 2);
	assert_eq!(relevance(&service, idle.id).await, 1.0);

	let first = service.run_decay_at(false, NOW).await.expect("Decay failed.");

	assert!(first.ran);
	assert_eq!(first.decayed, 2);
	assert!((relevance(&service, idle.id).await - 0.99).abs() < 1e-6);

	let repeat =
		service.run_decay_at(false, NOW + Duration::minutes(10)).await.expect("Decay failed.");

	assert!(!repeat.due);
	assert!(!repeat.ran);
	assert!((relevance(&service, idle.id).await - 0.99).abs() < 1e-6);

	service
		.record_usage_at(
			RecordUsageRequest { ids: vec![busy.id], timeout_ms: None },
			NOW + Duration::minutes(30),
		)
		.await
		.expect("Failed to record usage.");

	let second = service.run_decay_at(false, NOW + Duration::hours(1)).await.expect("Decay failed.");

	assert!(second.ran);
	assert_eq!(second.decayed, 1);
	assert!((relevance(&service, idle.id).await - 0.9801).abs() < 1e-5);
	assert_eq!(relevance(&service, busy.id).await, 1.0);

	close(service, test_db).await;
}

#[tokio::test]
async fn cleanup_deletes_live_and_only_reports_in_dry_run() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let old = service
		.put_at(put_request("old faded prompt", None), NOW - Duration::days(100))
		.await
		.expect("Failed to save prompt.");
	let young = service
		.put_at(put_request("young faded prompt", None), NOW - Duration::days(10))
		.await
		.expect("Failed to save prompt.");

	for id in [old.id, young.id] {
		service
			.records
			.decay_record(id, 0.05, 0.01, NOW, NOW)
			.await
			.expect("Failed to lower relevance.");
	}

	let preview = service.run_cleanup_at(true, NOW).await.expect("Dry run failed.");

	assert_eq!(preview.candidates.iter().map(|stale| stale.id).collect::<Vec<_>>(), vec![old.id]);
	assert!(preview.deleted.is_empty());
	assert!((relevance(&service, old.id).await - 0.05).abs() < 1e-6);

	let live = service.run_cleanup_at(false, NOW).await.expect("Cleanup failed.");

	assert_eq!(live.deleted, vec![old.id]);

	let err = service
		.get(GetRequest { id: old.id, track_usage: false, timeout_ms: None })
		.await
		.expect_err("Deleted prompt must be gone.");

	assert!(matches!(err, Error::NotFound { .. }));
	assert!((relevance(&service, young.id).await - 0.05).abs() < 1e-6);

	close(service, test_db).await;
}

#[tokio::test]
async fn maintenance_dry_run_mutates_nothing() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let saved = service
		.put_at(put_request("quiet prompt", None), NOW - Duration::days(1))
		.await
		.expect("Failed to save prompt.");
	let report = service.run_lifecycle_maintenance_at(true, NOW).await;

	assert!(report.dry_run);
	assert!(matches!(report.decay, PassOutcome::Completed(ref decay) if decay.candidates == 1));
	assert!(matches!(report.consolidation, PassOutcome::Completed(_)));
	assert!(matches!(report.cleanup, PassOutcome::Completed(_)));
	assert_eq!(relevance(&service, saved.id).await, 1.0);

	let live = service.run_lifecycle_maintenance_at(false, NOW).await;
	let decay = live.decay.report().expect("Decay pass must complete.");

	assert!(decay.ran);
	assert!((relevance(&service, saved.id).await - 0.99).abs() < 1e-6);

	close(service, test_db).await;
}
