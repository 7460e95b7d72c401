use std::{fmt, str::FromStr};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, timestamp};
use alchemy_domain::{Phase, RelationshipType, learning::PatternType, vector};

/// Whether a stored embedding can take part in similarity search.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EmbeddingStatus {
	Ok,
	Missing,
	DimensionMismatch,
	Malformed,
}
impl EmbeddingStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Missing => "missing",
			Self::DimensionMismatch => "dimension_mismatch",
			Self::Malformed => "malformed",
		}
	}
}
impl fmt::Display for EmbeddingStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for EmbeddingStatus {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"ok" => Ok(Self::Ok),
			"missing" => Ok(Self::Missing),
			"dimension_mismatch" => Ok(Self::DimensionMismatch),
			"malformed" => Ok(Self::Malformed),
			_ => Err(Error::Corrupt(format!("Unknown embedding status {raw:?}."))),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct PromptRecord {
	pub id: Uuid,
	pub content: String,
	pub content_hash: String,
	pub phase: Phase,
	pub provider: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: i64,
	pub actual_tokens: i64,
	pub tags: Vec<String>,
	pub parent_id: Option<Uuid>,
	pub session_id: Option<String>,
	pub embedding: Option<Vec<f32>>,
	pub embedding_model: Option<String>,
	pub embedding_provider: Option<String>,
	pub embedding_status: EmbeddingStatus,
	pub relevance_score: f32,
	pub usage_count: i64,
	pub last_used_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl PromptRecord {
	/// Last use, or creation for records never used.
	pub fn last_touched_at(&self) -> OffsetDateTime {
		self.last_used_at.unwrap_or(self.created_at)
	}

	pub fn searchable_embedding(&self) -> Option<&[f32]> {
		match self.embedding_status {
			EmbeddingStatus::Ok => self.embedding.as_deref(),
			_ => None,
		}
	}
}

#[derive(Clone, Debug)]
pub struct NewEmbedding {
	pub vector: Vec<f32>,
	pub model: String,
	pub provider: String,
	/// Decided by the caller against the dimension registered for `model`.
	pub status: EmbeddingStatus,
}

#[derive(Clone, Debug)]
pub struct NewRecord {
	pub content: String,
	pub phase: Phase,
	pub provider: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: i64,
	pub actual_tokens: i64,
	pub tags: Vec<String>,
	pub parent_id: Option<Uuid>,
	pub session_id: Option<String>,
	pub embedding: Option<NewEmbedding>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PutOutcome {
	pub id: Uuid,
	pub created: bool,
	pub usage_count: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UsageOutcome {
	pub id: Uuid,
	pub relevance_score: f32,
	pub usage_count: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaleRecord {
	pub id: Uuid,
	pub relevance_score: f32,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
	pub source_id: Uuid,
	pub target_id: Uuid,
	pub relationship_type: RelationshipType,
	pub strength: f32,
	pub context: String,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackEvent {
	pub seq: i64,
	pub id: Uuid,
	pub prompt_id: Uuid,
	pub effectiveness: f32,
	pub rating: Option<u8>,
	pub similarity: Option<f32>,
	pub session_id: Option<String>,
	pub context: String,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct NewFeedback {
	pub prompt_id: Uuid,
	pub effectiveness: f32,
	pub rating: Option<u8>,
	pub similarity: Option<f32>,
	pub session_id: Option<String>,
	pub context: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
	pub id: Uuid,
	pub pattern_type: PatternType,
	pub signature: String,
	pub confidence_score: f32,
	pub usage_count: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PromptRow {
	pub(crate) id: Uuid,
	pub(crate) content: String,
	pub(crate) content_hash: String,
	pub(crate) phase: String,
	pub(crate) provider: String,
	pub(crate) model: String,
	pub(crate) temperature: f64,
	pub(crate) max_tokens: i64,
	pub(crate) actual_tokens: i64,
	pub(crate) tags: String,
	pub(crate) parent_id: Option<Uuid>,
	pub(crate) session_id: Option<String>,
	pub(crate) embedding: Option<Vec<u8>>,
	pub(crate) embedding_dim: Option<i64>,
	pub(crate) embedding_model: Option<String>,
	pub(crate) embedding_provider: Option<String>,
	pub(crate) embedding_status: String,
	pub(crate) relevance_score: f64,
	pub(crate) usage_count: i64,
	pub(crate) last_used_at: Option<i64>,
	pub(crate) created_at: i64,
	pub(crate) updated_at: i64,
}
impl PromptRow {
	pub(crate) fn into_record(self) -> Result<PromptRecord> {
		let phase = Phase::from_str(&self.phase).map_err(Error::Corrupt)?;
		let tags: Vec<String> = serde_json::from_str(&self.tags)?;
		let mut embedding_status = EmbeddingStatus::from_str(&self.embedding_status)?;
		let embedding = match self.embedding.as_deref() {
			None => None,
			Some(blob) => match vector::decode(blob) {
				Ok(vec) if Some(vec.len() as i64) == self.embedding_dim => Some(vec),
				Ok(vec) => {
					tracing::warn!(
						prompt_id = %self.id,
						stored_dim = ?self.embedding_dim,
						decoded_dim = vec.len(),
						"Embedding blob length disagrees with stored dimension."
					);

					embedding_status = EmbeddingStatus::Malformed;

					None
				},
				Err(err) => {
					tracing::warn!(prompt_id = %self.id, error = %err, "Embedding blob is malformed.");

					embedding_status = EmbeddingStatus::Malformed;

					None
				},
			},
		};

		if embedding.is_none() && embedding_status == EmbeddingStatus::Ok {
			embedding_status = EmbeddingStatus::Missing;
		}

		Ok(PromptRecord {
			id: self.id,
			content: self.content,
			content_hash: self.content_hash,
			phase,
			provider: self.provider,
			model: self.model,
			temperature: self.temperature as f32,
			max_tokens: self.max_tokens,
			actual_tokens: self.actual_tokens,
			tags,
			parent_id: self.parent_id,
			session_id: self.session_id,
			embedding,
			embedding_model: self.embedding_model,
			embedding_provider: self.embedding_provider,
			embedding_status,
			relevance_score: self.relevance_score as f32,
			usage_count: self.usage_count,
			last_used_at: timestamp::from_millis_opt(self.last_used_at)?,
			created_at: timestamp::from_millis(self.created_at)?,
			updated_at: timestamp::from_millis(self.updated_at)?,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RelationshipRow {
	pub(crate) source_id: Uuid,
	pub(crate) target_id: Uuid,
	pub(crate) relationship_type: String,
	pub(crate) strength: f64,
	pub(crate) context: String,
	pub(crate) created_at: i64,
}
impl RelationshipRow {
	pub(crate) fn into_relationship(self) -> Result<Relationship> {
		Ok(Relationship {
			source_id: self.source_id,
			target_id: self.target_id,
			relationship_type: RelationshipType::from_str(&self.relationship_type)
				.map_err(Error::Corrupt)?,
			strength: self.strength as f32,
			context: self.context,
			created_at: timestamp::from_millis(self.created_at)?,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedbackRow {
	pub(crate) seq: i64,
	pub(crate) id: Uuid,
	pub(crate) prompt_id: Uuid,
	pub(crate) effectiveness: f64,
	pub(crate) rating: Option<i64>,
	pub(crate) similarity: Option<f64>,
	pub(crate) session_id: Option<String>,
	pub(crate) context: String,
	pub(crate) created_at: i64,
}
impl FeedbackRow {
	pub(crate) fn into_event(self) -> Result<FeedbackEvent> {
		let rating = self
			.rating
			.map(|rating| {
				u8::try_from(rating)
					.map_err(|_| Error::Corrupt(format!("Rating {rating} is out of range.")))
			})
			.transpose()?;

		Ok(FeedbackEvent {
			seq: self.seq,
			id: self.id,
			prompt_id: self.prompt_id,
			effectiveness: self.effectiveness as f32,
			rating,
			similarity: self.similarity.map(|value| value as f32),
			session_id: self.session_id,
			context: self.context,
			created_at: timestamp::from_millis(self.created_at)?,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PatternRow {
	pub(crate) id: Uuid,
	pub(crate) pattern_type: String,
	pub(crate) signature: String,
	pub(crate) confidence_score: f64,
	pub(crate) usage_count: i64,
	pub(crate) created_at: i64,
	pub(crate) updated_at: i64,
}
impl PatternRow {
	pub(crate) fn into_pattern(self) -> Result<Pattern> {
		Ok(Pattern {
			id: self.id,
			pattern_type: PatternType::from_str(&self.pattern_type).map_err(Error::Corrupt)?,
			signature: self.signature,
			confidence_score: self.confidence_score as f32,
			usage_count: self.usage_count,
			created_at: timestamp::from_millis(self.created_at)?,
			updated_at: timestamp::from_millis(self.updated_at)?,
		})
	}
}
