use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Error, Result};
use alchemy_domain::ranking::{self, FactorInput, Factors, Weights};
use alchemy_storage::{Error as StorageError, feedback, models::PromptRecord, weights};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankCandidate {
	pub id: Uuid,
	/// Similarity to the query when the candidate came from a search.
	#[serde(default)]
	pub similarity: Option<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankRequest {
	pub candidates: Vec<RankCandidate>,
	/// Overrides the committed weights for this call only.
	#[serde(default)]
	pub weights: Option<Weights>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankedItem {
	pub id: Uuid,
	pub score: f32,
	pub relevance_score: f32,
	pub factors: Factors,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RankResponse {
	pub items: Vec<RankedItem>,
	pub weights: Weights,
	/// Committed version the weights came from; `None` for caller-supplied weights.
	pub weights_version: Option<i64>,
	/// Candidates that no longer exist.
	pub missing: Vec<Uuid>,
}

impl AlchemyService {
	pub async fn rank(&self, req: RankRequest) -> Result<RankResponse> {
		self.rank_at(req, OffsetDateTime::now_utc()).await
	}

	pub async fn rank_at(&self, req: RankRequest, now: OffsetDateTime) -> Result<RankResponse> {
		let deadline = self.deadline(req.timeout_ms);
		let (weights, weights_version) = match req.weights {
			Some(weights) => {
				for factor in ranking::Factor::ALL {
					crate::check_unit(&format!("weights.{}", factor.as_str()), weights.get(factor))?;
				}

				(weights, None)
			},
			None => {
				let stored = weights::current(&self.db.pool).await?;

				(stored.weights, Some(stored.version))
			},
		};
		let mut seen = HashSet::new();
		let candidates: Vec<RankCandidate> =
			req.candidates.into_iter().filter(|candidate| seen.insert(candidate.id)).collect();
		let ids: Vec<Uuid> = candidates.iter().map(|candidate| candidate.id).collect();
		let records = deadline.run(self.records.get_many(&ids)).await?;
		let by_id: HashMap<Uuid, &PromptRecord> =
			records.iter().map(|record| (record.id, record)).collect();
		let history = deadline.run(feedback::history(&self.db.pool, &ids)).await?;
		let mut missing = Vec::new();
		let mut items = Vec::with_capacity(records.len());

		for candidate in &candidates {
			deadline.check()?;

			let Some(record) = by_id.get(&candidate.id) else {
				missing.push(candidate.id);

				continue;
			};
			let performance = match history.get(&record.id) {
				Some(events) if !events.is_empty() => self.performance(events),
				_ => self.lineage_performance(record, None).await?,
			};
			let factors = ranking::factors(
				&self.cfg.ranking,
				&FactorInput {
					phase: record.phase,
					temperature: record.temperature,
					max_tokens: record.max_tokens,
					actual_tokens: record.actual_tokens,
					similarity: candidate.similarity,
					age_days: age_days(record.last_touched_at(), now),
					performance,
				},
			);

			items.push(RankedItem {
				id: record.id,
				score: factors.score(&weights),
				relevance_score: record.relevance_score,
				factors,
			});
		}

		items.sort_by(|a, b| {
			ranking::compare_desc(
				(a.score, a.relevance_score, &a.id),
				(b.score, b.relevance_score, &b.id),
			)
		});

		if !missing.is_empty() {
			tracing::warn!(missing = missing.len(), "Ranking skipped candidates that no longer exist.");
		}

		Ok(RankResponse { items, weights, weights_version, missing })
	}

	pub(crate) fn performance(&self, events: &[(i64, f32)]) -> Option<f32> {
		ranking::ema(self.cfg.ranking.performance_alpha, events.iter().map(|(_, eff)| *eff))
	}

	/// Effectiveness of the closest ancestor with feedback, up to the configured depth.
	///
	/// With `before_seq`, only ancestor feedback older than that sequence number counts.
	pub(crate) async fn lineage_performance(
		&self,
		record: &PromptRecord,
		before_seq: Option<i64>,
	) -> Result<Option<f32>> {
		let mut parent_id = record.parent_id;

		for _ in 0..self.cfg.ranking.lineage_depth {
			let Some(id) = parent_id else {
				break;
			};
			let history = feedback::history(&self.db.pool, &[id]).await?;
			let events: Vec<(i64, f32)> = history
				.get(&id)
				.into_iter()
				.flatten()
				.copied()
				.filter(|(seq, _)| before_seq.is_none_or(|before| *seq < before))
				.collect();

			if !events.is_empty() {
				return Ok(self.performance(&events));
			}

			parent_id = match self.records.get(id).await {
				Ok(parent) => parent.parent_id,
				Err(StorageError::NotFound(_)) => None,
				Err(err) => return Err(Error::from(err)),
			};
		}

		Ok(None)
	}
}

pub(crate) fn age_days(since: OffsetDateTime, now: OffsetDateTime) -> f64 {
	((now - since).as_seconds_f64() / 86_400.0).max(0.0)
}
