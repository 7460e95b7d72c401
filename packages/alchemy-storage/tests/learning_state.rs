use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

use alchemy_config::{RankingWeights, Sqlite};
use alchemy_domain::{
	learning::{PatternObservation, PatternType},
	ranking::Weights,
};
use alchemy_storage::{
	Error, feedback,
	db::Db,
	jobs::{self, Job},
	models::NewFeedback,
	patterns, weights,
};
use alchemy_testkit::TestDatabase;

const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

async fn open_db(test_db: &TestDatabase) -> Db {
	let cfg = Sqlite {
		path: test_db.path().to_path_buf(),
		pool_max_conns: 2,
		busy_timeout_ms: 5_000,
		max_conflict_retries: 3,
	};
	let db = Db::connect(&cfg).await.expect("Failed to open SQLite database.");

	db.ensure_schema(Weights::from(RankingWeights::default()), NOW)
		.await
		.expect("Failed to ensure schema.");

	db
}

fn observation(pattern_type: PatternType, signature: &str, confidence: f32) -> PatternObservation {
	PatternObservation { pattern_type, signature: signature.to_string(), confidence }
}

#[tokio::test]
async fn schema_bootstrap_is_idempotent_and_seeds_weights_once() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let db = open_db(&test_db).await;
	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let mut tuned = Weights::from(RankingWeights::default());

	tuned.context = 0.45;

	let version = weights::compare_and_set(&mut conn, 1, &tuned, NOW)
		.await
		.expect("Failed to update weights.");

	drop(conn);

	// A second bootstrap must not reset the tuned weights.
	db.ensure_schema(Weights::from(RankingWeights::default()), NOW + Duration::hours(1))
		.await
		.expect("Failed to re-run schema bootstrap.");

	let stored = weights::current(&db.pool).await.expect("Failed to read weights.");

	assert_eq!(version, 2);
	assert_eq!(stored.version, 2);
	assert_eq!(stored.weights, tuned);

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
async fn stale_weight_version_is_rejected() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let db = open_db(&test_db).await;
	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let base = Weights::from(RankingWeights::default());

	weights::compare_and_set(&mut conn, 1, &base, NOW).await.expect("First update must win.");

	let err = weights::compare_and_set(&mut conn, 1, &base, NOW)
		.await
		.expect_err("Second update against the same version must fail.");

	assert!(err.is_conflict());

	drop(conn);
	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
async fn patterns_merge_and_respect_the_cap() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let db = open_db(&test_db).await;
	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let signature = "phase=solutio;temperature=mid;tokens=lean";

	patterns::upsert(&mut conn, &observation(PatternType::Success, signature, 0.9), NOW)
		.await
		.expect("Failed to insert pattern.");

	let merged = patterns::upsert(
		&mut conn,
		&observation(PatternType::Success, signature, 0.5),
		NOW + Duration::minutes(1),
	)
	.await
	.expect("Failed to merge pattern.");

	assert_eq!(merged.usage_count, 2);
	assert!((merged.confidence_score - 0.7).abs() < 1e-6);

	patterns::upsert(&mut conn, &observation(PatternType::Failure, "weak", 0.2), NOW)
		.await
		.expect("Failed to insert pattern.");
	patterns::upsert(&mut conn, &observation(PatternType::Optimization, "mid", 0.6), NOW)
		.await
		.expect("Failed to insert pattern.");

	assert_eq!(patterns::count_below(&mut *conn, 0.3).await.expect("Failed to count."), 1);
	assert_eq!(patterns::prune_below(&mut conn, 0.3).await.expect("Failed to prune."), 1);
	assert_eq!(patterns::enforce_cap(&mut conn, 1).await.expect("Failed to enforce cap."), 1);
	assert_eq!(patterns::enforce_cap(&mut conn, 1).await.expect("Failed to enforce cap."), 0);

	let remaining = patterns::list(&mut *conn).await.expect("Failed to list patterns.");

	assert_eq!(remaining.len(), 1);
	assert_eq!(remaining[0].signature, signature);

	drop(conn);
	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
async fn job_ticks_are_claimed_once() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let db = open_db(&test_db).await;
	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
	let state = jobs::load(&mut *conn, Job::Decay).await.expect("Failed to load job state.");

	assert_eq!(state.last_run_at, None);
	assert!(jobs::claim_run(&mut conn, Job::Decay, None, NOW).await.expect("Failed to claim."));
	assert!(!jobs::claim_run(&mut conn, Job::Decay, None, NOW).await.expect("Failed to claim."));

	let later = NOW + Duration::hours(1);

	assert!(
		jobs::claim_run(&mut conn, Job::Decay, Some(NOW), later).await.expect("Failed to claim.")
	);

	let state = jobs::load(&mut *conn, Job::Decay).await.expect("Failed to load job state.");

	assert_eq!(state.last_run_at, Some(later));

	drop(conn);
	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
async fn feedback_is_read_past_the_watermark() {
	let test_db = TestDatabase::new().expect("Failed to allocate test database.");
	let db = open_db(&test_db).await;
	let prompt_id = Uuid::new_v4();
	let mut seqs = Vec::new();

	for (index, effectiveness) in [0.9_f32, 0.2, 0.5].into_iter().enumerate() {
		let event = feedback::insert(
			&db.pool,
			&NewFeedback {
				prompt_id,
				effectiveness,
				rating: Some(4),
				similarity: None,
				session_id: None,
				context: String::new(),
			},
			NOW + Duration::seconds(index as i64),
		)
		.await
		.expect("Failed to insert feedback.");

		seqs.push(event.seq);
	}

	let out_of_range = feedback::insert(
		&db.pool,
		&NewFeedback {
			prompt_id,
			effectiveness: 1.5,
			rating: None,
			similarity: None,
			session_id: None,
			context: String::new(),
		},
		NOW,
	)
	.await;

	assert!(matches!(out_of_range, Err(Error::InvalidArgument(_))));

	let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");

	jobs::advance_watermark(&mut conn, 0, seqs[0], Some(NOW), NOW)
		.await
		.expect("Failed to advance watermark.");

	let err = jobs::advance_watermark(&mut conn, 0, seqs[1], Some(NOW), NOW)
		.await
		.expect_err("A stale watermark must not advance.");

	assert!(err.is_conflict());

	let state = jobs::load(&mut *conn, Job::Training).await.expect("Failed to load job state.");
	let pending =
		feedback::since(&mut *conn, state.watermark_seq).await.expect("Failed to read feedback.");

	assert_eq!(pending.iter().map(|event| event.seq).collect::<Vec<_>>(), seqs[1..].to_vec());

	let history = feedback::history(&db.pool, &[prompt_id]).await.expect("Failed to read history.");

	assert_eq!(history.get(&prompt_id).map(Vec::len), Some(3));

	drop(conn);
	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
