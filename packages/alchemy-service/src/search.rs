use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AlchemyService, Error, Result, get::PromptView, rank::RankCandidate};
use alchemy_domain::{Phase, ranking, vector};
use alchemy_storage::{
	models::EmbeddingStatus,
	store::{CandidateScan, RecordFilter, ScanOrder},
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchFilters {
	#[serde(default)]
	pub phase: Option<Phase>,
	#[serde(default)]
	pub provider: Option<String>,
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default, with = "crate::time_serde::option")]
	pub created_after: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde::option")]
	pub created_before: Option<OffsetDateTime>,
}
impl From<SearchFilters> for RecordFilter {
	fn from(filters: SearchFilters) -> Self {
		Self {
			phase: filters.phase,
			provider: filters.provider,
			model: filters.model,
			tags: filters.tags,
			created_after: filters.created_after,
			created_before: filters.created_before,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub embedding: Vec<f32>,
	#[serde(default)]
	pub filters: SearchFilters,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub min_similarity: Option<f32>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchTextRequest {
	pub text: String,
	#[serde(default)]
	pub filters: SearchFilters,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub min_similarity: Option<f32>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
	pub record: PromptView,
	pub similarity: f32,
}

/// Candidates examined and why the rest were left out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
	pub candidates: usize,
	pub scored: usize,
	pub below_min_similarity: usize,
	pub skipped_missing: usize,
	pub skipped_dimension_mismatch: usize,
	pub skipped_malformed: usize,
	pub skipped_zero_norm: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub hits: Vec<SearchHit>,
	pub report: SearchReport,
}
impl SearchResponse {
	/// Hits as ranking candidates, carrying their similarity into the context factor.
	pub fn rank_candidates(&self) -> Vec<RankCandidate> {
		self.hits
			.iter()
			.map(|hit| RankCandidate { id: hit.record.id, similarity: Some(hit.similarity) })
			.collect()
	}
}

impl AlchemyService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let expected = self.cfg.embedding.dimensions as usize;

		if req.embedding.len() != expected {
			return Err(Error::DimensionMismatch { expected, actual: req.embedding.len() });
		}

		crate::check_vector(&req.embedding)?;

		if vector::is_zero_norm(&req.embedding) {
			return Err(Error::InvalidRequest {
				message: "Query embedding must have a non-zero norm.".to_string(),
			});
		}

		let limit = req.limit.unwrap_or(self.cfg.search.default_limit);
		let min_similarity = req.min_similarity.unwrap_or(self.cfg.search.default_min_similarity);

		if limit == 0 {
			return Err(Error::InvalidRequest {
				message: "limit must be greater than zero.".to_string(),
			});
		}
		if !(-1.0..=1.0).contains(&min_similarity) {
			return Err(Error::InvalidRequest {
				message: "min_similarity must be in the range -1.0-1.0.".to_string(),
			});
		}

		let scan = CandidateScan {
			filter: req.filters.into(),
			relevance_floor: self.cfg.search.relevance_floor,
			order: ScanOrder::Relevance,
			limit: limit.saturating_mul(self.cfg.search.candidate_multiplier),
			batch_size: self.cfg.search.scan_batch_size,
		};
		let candidates =
			self.records.scan_candidates(&scan, self.deadline(req.timeout_ms)).await?;
		let mut report = SearchReport { candidates: candidates.len(), ..SearchReport::default() };
		let mut scored = Vec::new();

		for record in candidates {
			match record.embedding_status {
				EmbeddingStatus::Ok => {},
				EmbeddingStatus::Missing => {
					report.skipped_missing += 1;

					continue;
				},
				EmbeddingStatus::DimensionMismatch => {
					report.skipped_dimension_mismatch += 1;

					continue;
				},
				EmbeddingStatus::Malformed => {
					report.skipped_malformed += 1;

					continue;
				},
			}

			let Some(embedding) = record.searchable_embedding() else {
				report.skipped_missing += 1;

				continue;
			};

			if embedding.len() != expected {
				tracing::debug!(
					prompt_id = %record.id,
					dim = embedding.len(),
					"Skipping candidate from a different embedding space."
				);

				report.skipped_dimension_mismatch += 1;

				continue;
			}

			let Some(similarity) = vector::cosine_similarity(&req.embedding, embedding) else {
				report.skipped_zero_norm += 1;

				continue;
			};

			report.scored += 1;

			if similarity < min_similarity {
				report.below_min_similarity += 1;

				continue;
			}

			scored.push((similarity, record));
		}

		scored.sort_by(|(sim_a, a), (sim_b, b)| {
			ranking::compare_desc(
				(*sim_a, a.relevance_score, &a.id),
				(*sim_b, b.relevance_score, &b.id),
			)
		});
		scored.truncate(limit as usize);

		tracing::debug!(
			candidates = report.candidates,
			hits = scored.len(),
			skipped_missing = report.skipped_missing,
			skipped_dimension_mismatch = report.skipped_dimension_mismatch,
			skipped_malformed = report.skipped_malformed,
			skipped_zero_norm = report.skipped_zero_norm,
			"Search finished."
		);

		let hits = scored
			.into_iter()
			.map(|(similarity, record)| SearchHit { record: PromptView::from(&record), similarity })
			.collect();

		Ok(SearchResponse { hits, report })
	}

	pub async fn search_text(&self, req: SearchTextRequest) -> Result<SearchResponse> {
		let text = alchemy_domain::content::normalize(&req.text);

		if text.is_empty() {
			return Err(Error::InvalidRequest { message: "text must not be empty.".to_string() });
		}

		let embedding = self.embed_text(&text).await?;

		self.search(SearchRequest {
			embedding,
			filters: req.filters,
			limit: req.limit,
			min_similarity: req.min_similarity,
			timeout_ms: req.timeout_ms,
		})
		.await
	}
}
