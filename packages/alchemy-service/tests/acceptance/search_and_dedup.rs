use std::sync::{Arc, atomic::Ordering};

use time::Duration;
use uuid::Uuid;

use super::{DIM, NOW, StubEmbedding, basis, close, open_service, put_request};
use alchemy_service::{AlchemyService, Error, GetRequest, SearchRequest, SearchTextRequest};
use alchemy_testkit::TestDatabase;

#[tokio::test]
async fn saving_identical_content_twice_keeps_one_record() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let stub = Arc::new(StubEmbedding::new(&[("Write a sort function", basis(0))]));
	let service = open_service(&test_db, stub.clone()).await;
	let first = service
		.put_at(put_request("Write a sort function", None), NOW)
		.await
		.expect("Failed to save prompt.");
	let second = service
		.put_at(put_request("Write a  sort function ", None), NOW)
		.await
		.expect("Failed to save duplicate prompt.");

	assert!(first.created);
	assert!(!second.created);
	assert_eq!(first.id, second.id);
	assert_eq!(second.usage_count, 2);
	assert_eq!(first.embedding_status, "ok");
	assert_eq!(stub.calls.load(Ordering::SeqCst), 2);

	let record = service
		.get(GetRequest { id: first.id, track_usage: false, timeout_ms: None })
		.await
		.expect("Failed to fetch prompt.");

	assert_eq!(record.usage_count, 2);
	assert_eq!(record.embedding_dim, Some(DIM));

	close(service, test_db).await;
}

#[tokio::test]
async fn querying_with_a_stored_embedding_returns_that_record_first() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let vectors = [
		vec![1.0, 0.0, 0.0, 0.0],
		vec![0.0, 1.0, 0.0, 0.0],
		vec![0.6, 0.8, 0.0, 0.0],
		vec![0.0, 0.0, 1.0, 0.0],
		vec![0.0, 0.0, 0.6, 0.8],
	];
	let mut ids = Vec::new();

	for (index, vector) in vectors.iter().enumerate() {
		let saved = service
			.put_at(put_request(&format!("prompt {index}"), Some(vector.clone())), NOW)
			.await
			.expect("Failed to save prompt.");

		ids.push(saved.id);
	}

	let response = service
		.search(SearchRequest {
			embedding: vectors[2].clone(),
			filters: Default::default(),
			limit: Some(5),
			min_similarity: Some(0.1),
			timeout_ms: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(response.hits[0].record.id, ids[2]);
	assert!((response.hits[0].similarity - 1.0).abs() < 1e-5);
	// Orthogonal records fall below the minimum similarity.
	assert_eq!(response.hits.len(), 3);
	assert_eq!(response.report.below_min_similarity, 2);

	for pair in response.hits.windows(2) {
		assert!(pair[0].similarity >= pair[1].similarity);
	}
	for hit in &response.hits {
		assert!(hit.similarity >= 0.1);
	}

	close(service, test_db).await;
}

#[tokio::test]
async fn mismatched_dimensions_are_rejected_or_skipped() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let mut unregistered = put_request("unknown model", Some(vec![1.0, 0.0, 0.0, 0.0]));

	if let Some(embedding) = unregistered.embedding.as_mut() {
		embedding.model = "mystery-embedding".to_string();
	}

	let mut legacy = put_request("legacy model", Some(vec![1.0, 0.0, 0.0]));

	if let Some(embedding) = legacy.embedding.as_mut() {
		embedding.model = "legacy-embedding".to_string();
	}

	let unregistered = service.put_at(unregistered, NOW).await.expect("Failed to save prompt.");
	let legacy = service.put_at(legacy, NOW).await.expect("Failed to save prompt.");

	service
		.put_at(put_request("current model", Some(vec![1.0, 0.0, 0.0, 0.0])), NOW)
		.await
		.expect("Failed to save prompt.");

	assert_eq!(unregistered.embedding_status, "dimension_mismatch");
	assert_eq!(legacy.embedding_status, "ok");

	let response = service
		.search(SearchRequest {
			embedding: basis(0),
			filters: Default::default(),
			limit: None,
			min_similarity: None,
			timeout_ms: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(response.hits.len(), 1);
	assert_eq!(response.report.skipped_dimension_mismatch, 2);

	let err = service
		.search(SearchRequest {
			embedding: vec![1.0, 0.0, 0.0],
			filters: Default::default(),
			limit: None,
			min_similarity: None,
			timeout_ms: None,
		})
		.await
		.expect_err("A short query must be rejected.");

	assert!(matches!(err, Error::DimensionMismatch { expected: DIM, actual: 3 }));

	close(service, test_db).await;
}

#[tokio::test]
async fn provider_failures_store_without_embedding() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let saved = service
		.put_at(put_request("no vector for me", None), NOW)
		.await
		.expect("Saving must succeed without an embedding.");

	assert!(saved.created);
	assert_eq!(saved.embedding_status, "missing");
	assert!(saved.embedding_error.is_some());

	let err = service
		.search_text(SearchTextRequest {
			text: "no vector for me".to_string(),
			filters: Default::default(),
			limit: None,
			min_similarity: None,
			timeout_ms: None,
		})
		.await
		.expect_err("Search must surface the provider failure.");

	assert!(matches!(err, Error::EmbeddingUnavailable { .. }));

	close(service, test_db).await;
}

#[tokio::test]
async fn text_search_embeds_the_query() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let stub = Arc::new(StubEmbedding::new(&[
		("sort numbers", basis(1)),
		("parse json", basis(2)),
		("sorting query", vec![0.0, 0.9, 0.1, 0.0]),
	]));
	let service = open_service(&test_db, stub).await;
	let sort = service.put_at(put_request("sort numbers", None), NOW).await.expect("Failed to save.");

	service.put_at(put_request("parse json", None), NOW).await.expect("Failed to save.");

	let response = service
		.search_text(SearchTextRequest {
			text: "sorting query".to_string(),
			filters: Default::default(),
			limit: Some(1),
			min_similarity: None,
			timeout_ms: None,
		})
		.await
		.expect("Text search failed.");

	assert_eq!(response.hits.len(), 1);
	assert_eq!(response.hits[0].record.id, sort.id);

	close(service, test_db).await;
}

fn query(embedding: Vec<f32>) -> SearchRequest {
	SearchRequest {
		embedding,
		filters: Default::default(),
		limit: Some(10),
		min_similarity: None,
		timeout_ms: None,
	}
}

async fn save(service: &AlchemyService, content: &str, embedding: Vec<f32>) -> Uuid {
	service
		.put_at(put_request(content, Some(embedding)), NOW - Duration::hours(1))
		.await
		.expect("Failed to save prompt.")
		.id
}

async fn lower_relevance(service: &AlchemyService, id: Uuid, factor: f32) {
	service
		.records
		.decay_record(id, factor, 0.01, NOW, NOW)
		.await
		.expect("Failed to lower relevance.");
}

#[tokio::test]
async fn zero_norm_embeddings_are_skipped_and_counted() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let unit = save(&service, "unit vector", basis(0)).await;

	save(&service, "zero vector", vec![0.0; DIM]).await;

	let response = service.search(query(basis(0))).await.expect("Search failed.");

	assert_eq!(response.hits.len(), 1);
	assert_eq!(response.hits[0].record.id, unit);
	assert_eq!(response.report.candidates, 2);
	assert_eq!(response.report.scored, 1);
	assert_eq!(response.report.skipped_zero_norm, 1);

	close(service, test_db).await;
}

#[tokio::test]
async fn equal_similarities_order_by_relevance_then_id() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let faded = save(&service, "first twin", basis(1)).await;
	let b = save(&service, "second twin", basis(1)).await;
	let c = save(&service, "third twin", basis(1)).await;

	lower_relevance(&service, faded, 0.5).await;

	let response = service.search(query(basis(1))).await.expect("Search failed.");
	let mut fresh = [b, c];

	fresh.sort();

	assert_eq!(
		response.hits.iter().map(|hit| hit.record.id).collect::<Vec<_>>(),
		vec![fresh[0], fresh[1], faded]
	);
	assert!(response.hits.iter().all(|hit| hit.similarity == response.hits[0].similarity));
	assert_eq!(response.hits[2].record.relevance_score, 0.5);

	close(service, test_db).await;
}

#[tokio::test]
async fn records_below_the_relevance_floor_never_match() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let service = open_service(&test_db, Arc::new(StubEmbedding::new(&[]))).await;
	let faded = save(&service, "faded prompt", basis(2)).await;
	let kept = save(&service, "kept prompt", vec![0.0, 0.6, 0.8, 0.0]).await;

	lower_relevance(&service, faded, 0.05).await;

	let response = service.search(query(basis(2))).await.expect("Search failed.");

	assert_eq!(response.hits.iter().map(|hit| hit.record.id).collect::<Vec<_>>(), vec![kept]);
	assert_eq!(response.report.candidates, 1);

	close(service, test_db).await;
}
