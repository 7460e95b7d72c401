use time::{Duration, OffsetDateTime};

use alchemy_config::Lifecycle;

/// One decay tick. Returns `None` for scores already at or below the floor.
pub fn decay(score: f32, cfg: &Lifecycle) -> Option<f32> {
	if score <= cfg.decay_floor {
		return None;
	}

	Some((score * cfg.decay_factor).max(cfg.decay_floor))
}

pub fn boost(score: f32, cfg: &Lifecycle) -> f32 {
	(score + cfg.boost_increment).min(1.0)
}

pub fn retention_window(cfg: &Lifecycle) -> Duration {
	Duration::days(i64::from(cfg.retention_days))
}

pub fn is_stale(
	score: f32,
	created_at: OffsetDateTime,
	now: OffsetDateTime,
	cfg: &Lifecycle,
) -> bool {
	score <= cfg.cleanup_threshold && now - created_at > retention_window(cfg)
}

/// Whether a scheduled pass is due, given when it last committed.
pub fn is_due(last_run_at: Option<OffsetDateTime>, now: OffsetDateTime, interval_secs: u64) -> bool {
	let interval = Duration::seconds(i64::try_from(interval_secs).unwrap_or(i64::MAX));

	match last_run_at {
		None => true,
		Some(last) => now - last >= interval,
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn thirty_idle_ticks_from_full_relevance() {
		let cfg = Lifecycle::default();
		let mut score = 1.0;

		for _ in 0..30 {
			score = decay(score, &cfg).expect("Score above floor must decay.");
		}

		assert!((score - 0.740).abs() < 1e-3, "score = {score}");
	}

	#[test]
	fn decay_never_crosses_floor() {
		let cfg = Lifecycle { decay_factor: 0.5, decay_floor: 0.2, ..Lifecycle::default() };

		assert_eq!(decay(0.3, &cfg), Some(0.2));
		assert_eq!(decay(0.2, &cfg), None);
		assert_eq!(decay(0.05, &cfg), None);
	}

	#[test]
	fn boost_saturates_at_one() {
		let cfg = Lifecycle::default();

		assert_eq!(boost(0.95, &cfg), 1.0);
		assert!((boost(0.5, &cfg) - 0.6).abs() < 1e-6);
	}

	#[test]
	fn staleness_needs_low_score_and_age() {
		let cfg = Lifecycle::default();
		let now = datetime!(2026-04-10 00:00 UTC);
		let old = now - Duration::days(100);
		let young = now - Duration::days(10);

		assert!(is_stale(0.05, old, now, &cfg));
		assert!(!is_stale(0.05, young, now, &cfg));
		assert!(!is_stale(0.5, old, now, &cfg));
	}

	#[test]
	fn first_run_is_always_due() {
		let now = datetime!(2026-04-10 00:00 UTC);

		assert!(is_due(None, now, 3_600));
		assert!(!is_due(Some(now - Duration::minutes(30)), now, 3_600));
		assert!(is_due(Some(now - Duration::hours(1)), now, 3_600));
	}
}
