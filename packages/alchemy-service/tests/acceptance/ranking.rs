use std::sync::Arc;

use time::Duration;
use uuid::Uuid;

use super::{NOW, StubEmbedding, basis, close, open_service, put_request};
use alchemy_domain::{Phase, ranking::Weights};
use alchemy_service::{
	AddRelationshipRequest, Error, RankCandidate, RankRequest, RecordFeedbackRequest, SearchRequest,
};
use alchemy_testkit::TestDatabase;

fn feedback(prompt_id: Uuid, effectiveness: f32) -> RecordFeedbackRequest {
	RecordFeedbackRequest {
		prompt_id,
		effectiveness,
		rating: Some(5),
		similarity: None,
		session_id: None,
		context: String::new(),
		timeout_ms: None,
	}
}

#[tokio::test]
async fn ranking_uses_lineage_performance_and_reports_factors() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let parent = service
		.put_at(put_request("parent prompt", None), NOW - Duration::days(2))
		.await
		.expect("Failed to save parent.");
	let mut child_req = put_request("child prompt", None);

	child_req.parent_id = Some(parent.id);

	let child =
		service.put_at(child_req, NOW - Duration::days(1)).await.expect("Failed to save child.");
	let mut cold_req = put_request("unrelated prompt", None);

	cold_req.phase = Phase::Coagulatio;
	cold_req.temperature = 1.5;

	let cold =
		service.put_at(cold_req, NOW - Duration::days(1)).await.expect("Failed to save prompt.");

	service
		.record_feedback_at(feedback(parent.id, 0.9), NOW - Duration::hours(12))
		.await
		.expect("Failed to record feedback.");

	let ghost = Uuid::new_v4();
	let response = service
		.rank_at(
			RankRequest {
				candidates: vec![
					RankCandidate { id: cold.id, similarity: Some(0.2) },
					RankCandidate { id: child.id, similarity: Some(0.9) },
					RankCandidate { id: ghost, similarity: None },
				],
				weights: None,
				timeout_ms: None,
			},
			NOW,
		)
		.await
		.expect("Ranking failed.");

	assert_eq!(response.weights_version, Some(1));
	assert_eq!(response.missing, vec![ghost]);
	assert_eq!(response.items.len(), 2);
	assert_eq!(response.items[0].id, child.id);

	let child_item = &response.items[0];
	let cold_item = &response.items[1];

	assert!((child_item.factors.performance - 0.9).abs() < 1e-6);
	assert!((child_item.factors.context - 0.9).abs() < 1e-6);
	assert_eq!(cold_item.factors.performance, 0.5);
	// 1.5 sits 0.8 above the coagulatio band, beyond its falloff.
	assert_eq!(cold_item.factors.temperature, 0.0);
	assert!(child_item.score > cold_item.score);

	let expected = child_item.factors.score(&response.weights);

	assert!((child_item.score - expected).abs() < 1e-6);

	close(service, test_db).await;
}

#[tokio::test]
async fn caller_weights_override_committed_weights() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let a = service
		.put_at(put_request("alpha", Some(basis(0))), NOW)
		.await
		.expect("Failed to save prompt.");
	let b = service
		.put_at(put_request("beta", Some(vec![0.8, 0.6, 0.0, 0.0])), NOW)
		.await
		.expect("Failed to save prompt.");
	let hits = service
		.search(SearchRequest {
			embedding: basis(0),
			filters: Default::default(),
			limit: Some(5),
			min_similarity: None,
			timeout_ms: None,
		})
		.await
		.expect("Search failed.");
	let context_only = Weights {
		temperature: 0.0,
		token_usage: 0.0,
		context: 1.0,
		recency: 0.0,
		performance: 0.0,
	};
	let response = service
		.rank_at(
			RankRequest {
				candidates: hits.rank_candidates(),
				weights: Some(context_only),
				timeout_ms: None,
			},
			NOW,
		)
		.await
		.expect("Ranking failed.");

	assert_eq!(response.weights_version, None);
	assert_eq!(response.items.iter().map(|item| item.id).collect::<Vec<_>>(), vec![a.id, b.id]);
	assert!((response.items[0].score - 1.0).abs() < 1e-5);
	assert!((response.items[1].score - 0.8).abs() < 1e-5);

	let invalid = Weights { context: 1.5, ..context_only };
	let err = service
		.rank_at(RankRequest { candidates: Vec::new(), weights: Some(invalid), timeout_ms: None }, NOW)
		.await
		.expect_err("Out-of-range weights must be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	close(service, test_db).await;
}

#[tokio::test]
async fn relationships_require_both_endpoints() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let a = service.put_at(put_request("source", None), NOW).await.expect("Failed to save.");
	let b = service.put_at(put_request("target", None), NOW).await.expect("Failed to save.");
	let request = |target_id| AddRelationshipRequest {
		source_id: a.id,
		target_id,
		relationship_type: alchemy_domain::RelationshipType::InspiredBy,
		strength: 0.4,
		context: "variation".to_string(),
	};

	service.add_relationship_at(request(b.id), NOW).await.expect("Failed to relate prompts.");

	let err = service
		.add_relationship_at(request(Uuid::new_v4()), NOW)
		.await
		.expect_err("A missing endpoint must be rejected.");

	assert!(matches!(err, Error::NotFound { .. }));

	let listed = service.relationships(b.id).await.expect("Failed to list relationships.");

	assert_eq!(listed.relationships.len(), 1);
	assert_eq!(listed.relationships[0].source_id, a.id);

	close(service, test_db).await;
}
