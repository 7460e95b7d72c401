use std::sync::Arc;

use time::Duration;

use super::{NOW, StubEmbedding, close, open_service, put_request};
use alchemy_domain::ranking::Factor;
use alchemy_service::{
	AlchemyService, RecordFeedbackRequest, TrainingOutcome, TrainingReport, TrainingRequest,
};
use alchemy_testkit::TestDatabase;

/// Stores one prompt and `count` feedback events one second apart; returns the last seq.
async fn seed_feedback(service: &AlchemyService, count: i64, effectiveness: f32) -> i64 {
	let created_at = NOW - Duration::days(1);
	let saved = service
		.put_at(put_request("summarize the diff", None), created_at)
		.await
		.expect("Failed to save prompt.");
	let mut last_seq = 0;

	for i in 1..=count {
		let response = service
			.record_feedback_at(
				RecordFeedbackRequest {
					prompt_id: saved.id,
					effectiveness,
					rating: None,
					similarity: None,
					session_id: None,
					context: String::new(),
					timeout_ms: None,
				},
				created_at + Duration::seconds(i),
			)
			.await
			.expect("Failed to record feedback.");

		last_seq = response.seq;
	}

	last_seq
}

fn delta(report: &TrainingReport, factor: Factor) -> f32 {
	report.new_weights.get(factor) - report.old_weights.get(factor)
}

#[tokio::test]
async fn successful_window_moves_weights_by_capped_steps() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let last_seq = seed_feedback(&service, 150, 0.9).await;
	let preview = service
		.run_training_at(TrainingRequest { force: false, dry_run: true }, NOW)
		.await
		.expect("Dry run failed.");

	assert_eq!(preview.outcome, TrainingOutcome::DryRun);
	assert_eq!(preview.weights_version_after, 1);
	assert_eq!(service.current_weights().await.expect("Failed to read weights.").version, 1);

	let report = service
		.run_training_at(TrainingRequest::default(), NOW)
		.await
		.expect("Training failed.");

	assert_eq!(report.outcome, TrainingOutcome::Completed);
	assert_eq!(report.new_weights, preview.new_weights);
	assert_eq!(report.events, 150);
	assert_eq!(report.success, 150);
	assert_eq!(report.weights_version_before, 1);
	assert_eq!(report.weights_version_after, 2);
	assert_eq!(report.watermark_after, last_seq);
	assert_eq!(report.patterns.upserted, 150);

	// Strong signals hit the step cap; tokens (0.8 factor) move 0.048.
	assert!((delta(&report, Factor::Performance) - 0.05).abs() < 1e-5);
	assert!((delta(&report, Factor::Temperature) - 0.05).abs() < 1e-5);
	assert!((delta(&report, Factor::Recency) - 0.05).abs() < 1e-5);
	assert!((delta(&report, Factor::TokenUsage) - 0.048).abs() < 1e-4);
	assert_eq!(report.new_weights.context, report.old_weights.context);

	let committed = service.current_weights().await.expect("Failed to read weights.");

	assert_eq!(committed.version, 2);
	assert_eq!(committed.weights, report.new_weights);

	let rerun = service
		.run_training_at(TrainingRequest { force: true, dry_run: false }, NOW + Duration::hours(1))
		.await
		.expect("Rerun failed.");

	assert_eq!(rerun.outcome, TrainingOutcome::AbortedInsufficientData);
	assert_eq!(rerun.events, 0);
	assert_eq!(service.current_weights().await.expect("Failed to read weights.").version, 2);

	close(service, test_db).await;
}

#[tokio::test]
async fn small_windows_leave_weights_untouched_unless_forced() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;

	seed_feedback(&service, 10, 0.1).await;

	let before = service.current_weights().await.expect("Failed to read weights.");
	let report = service
		.run_training_at(TrainingRequest::default(), NOW)
		.await
		.expect("Training failed.");
	let after = service.current_weights().await.expect("Failed to read weights.");

	assert_eq!(report.outcome, TrainingOutcome::AbortedInsufficientData);
	assert_eq!(report.watermark_after, report.watermark_before);
	assert_eq!(after.weights, before.weights);
	assert_eq!(after.version, before.version);
	assert_eq!(after.updated_at, before.updated_at);

	let forced = service
		.run_training_at(TrainingRequest { force: true, dry_run: false }, NOW)
		.await
		.expect("Forced training failed.");

	assert_eq!(forced.outcome, TrainingOutcome::Completed);
	assert_eq!(forced.failure, 10);
	assert_eq!(forced.weights_version_after, 2);
	// Poor outcomes on an in-band prompt pull the temperature weight down.
	assert!(forced.new_weights.temperature < forced.old_weights.temperature);

	close(service, test_db).await;
}

#[tokio::test]
async fn empty_window_aborts_even_when_forced() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let report = service
		.run_training_at(TrainingRequest { force: true, dry_run: false }, NOW)
		.await
		.expect("Training failed.");

	assert_eq!(report.outcome, TrainingOutcome::AbortedInsufficientData);
	assert_eq!(report.events, 0);
	assert_eq!(report.weights_version_after, 1);

	close(service, test_db).await;
}

#[tokio::test]
async fn derived_prompts_learn_from_ancestor_feedback() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let created_at = NOW - Duration::days(1);
	let parent = service
		.put_at(put_request("draft a release note", None), created_at)
		.await
		.expect("Failed to save parent.");
	let mut child_req = put_request("draft a terse release note", None);

	child_req.parent_id = Some(parent.id);

	let child = service.put_at(child_req, created_at).await.expect("Failed to save child.");

	for (offset, prompt_id) in [(1, parent.id), (2, child.id)] {
		service
			.record_feedback_at(
				RecordFeedbackRequest {
					prompt_id,
					effectiveness: 0.9,
					rating: None,
					similarity: None,
					session_id: None,
					context: String::new(),
					timeout_ms: None,
				},
				created_at + Duration::minutes(offset),
			)
			.await
			.expect("Failed to record feedback.");
	}

	let report = service
		.run_training_at(TrainingRequest { force: true, dry_run: true }, NOW)
		.await
		.expect("Training failed.");
	let performance = report
		.signals
		.iter()
		.find(|signal| signal.factor == Factor::Performance)
		.expect("Performance signal missing.");

	// The parent's own first event has no history; the child inherits the parent's.
	assert_eq!(performance.samples, 1);
	assert!(performance.delta > 0.0);

	close(service, test_db).await;
}
