use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Error, Result};
use alchemy_domain::{Phase, content};
use alchemy_storage::models::{EmbeddingStatus, NewEmbedding, NewRecord};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PutRequest {
	pub content: String,
	pub phase: Phase,
	pub provider: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: i64,
	pub actual_tokens: i64,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub parent_id: Option<Uuid>,
	#[serde(default)]
	pub session_id: Option<String>,
	/// Precomputed vector. When absent the configured embedding provider is called.
	#[serde(default)]
	pub embedding: Option<EmbeddingInput>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingInput {
	pub vector: Vec<f32>,
	pub model: String,
	pub provider: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PutResponse {
	pub id: Uuid,
	/// `false` when the content matched an existing record.
	pub created: bool,
	pub usage_count: i64,
	/// Status of the embedding offered with this call.
	pub embedding_status: String,
	/// Why no embedding was offered, when the provider failed.
	pub embedding_error: Option<String>,
}

impl AlchemyService {
	pub async fn put(&self, req: PutRequest) -> Result<PutResponse> {
		self.put_at(req, OffsetDateTime::now_utc()).await
	}

	pub async fn put_at(&self, req: PutRequest, now: OffsetDateTime) -> Result<PutResponse> {
		let deadline = self.deadline(req.timeout_ms);
		let normalized = content::normalize(&req.content);

		validate(&req, &normalized)?;

		let (embedding, embedding_error) = match req.embedding {
			Some(input) => {
				crate::check_vector(&input.vector)?;

				let status = self.embedding_status(&input.model, &input.vector);

				(
					Some(NewEmbedding {
						vector: input.vector,
						model: input.model,
						provider: input.provider,
						status,
					}),
					None,
				)
			},
			None => match self.embed_for_storage(&normalized).await {
				Ok(embedding) => (Some(embedding), None),
				Err(err) => {
					tracing::warn!(error = %err, "Storing prompt without an embedding.");

					(None, Some(err.to_string()))
				},
			},
		};
		let embedding_status =
			embedding.as_ref().map(|embedding| embedding.status).unwrap_or(EmbeddingStatus::Missing);

		if embedding_status == EmbeddingStatus::DimensionMismatch {
			tracing::warn!(
				embedding_model = embedding.as_ref().map(|e| e.model.as_str()).unwrap_or_default(),
				"Embedding dimension does not match the registered model; it is excluded from search."
			);
		}

		let record = NewRecord {
			content: req.content.trim().to_string(),
			phase: req.phase,
			provider: req.provider.trim().to_string(),
			model: req.model.trim().to_string(),
			temperature: req.temperature,
			max_tokens: req.max_tokens,
			actual_tokens: req.actual_tokens,
			tags: clean_tags(req.tags),
			parent_id: req.parent_id,
			session_id: req.session_id.filter(|session| !session.trim().is_empty()),
			embedding,
		};
		let outcome = deadline.run(self.records.put(&record, now)).await?;

		tracing::info!(
			prompt_id = %outcome.id,
			created = outcome.created,
			usage_count = outcome.usage_count,
			"Prompt stored."
		);

		Ok(PutResponse {
			id: outcome.id,
			created: outcome.created,
			usage_count: outcome.usage_count,
			embedding_status: embedding_status.as_str().to_string(),
			embedding_error,
		})
	}

	async fn embed_for_storage(&self, text: &str) -> Result<NewEmbedding> {
		let vector = self.embed_text(text).await?;

		crate::check_vector(&vector)?;

		let model = self.cfg.embedding.model.clone();
		let status = self.embedding_status(&model, &vector);

		Ok(NewEmbedding { vector, model, provider: self.cfg.embedding.provider_id.clone(), status })
	}
}

fn validate(req: &PutRequest, normalized: &str) -> Result<()> {
	if normalized.is_empty() {
		return Err(Error::InvalidRequest { message: "content must not be empty.".to_string() });
	}
	if !req.temperature.is_finite() || req.temperature < 0.0 {
		return Err(Error::InvalidRequest {
			message: "temperature must be a non-negative number.".to_string(),
		});
	}
	if req.max_tokens < 0 || req.actual_tokens < 0 {
		return Err(Error::InvalidRequest {
			message: "max_tokens and actual_tokens must not be negative.".to_string(),
		});
	}

	Ok(())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(tags.len());

	for tag in tags {
		let tag = tag.trim();

		if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
			out.push(tag.to_string());
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tags_are_trimmed_and_deduplicated() {
		let tags = vec![" rust ".to_string(), String::new(), "rust".to_string(), "code".to_string()];

		assert_eq!(clean_tags(tags), vec!["rust".to_string(), "code".to_string()]);
	}
}
