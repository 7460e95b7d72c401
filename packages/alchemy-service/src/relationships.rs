use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlchemyService, Error, Result};
use alchemy_domain::RelationshipType;
use alchemy_storage::models::Relationship;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddRelationshipRequest {
	pub source_id: Uuid,
	pub target_id: Uuid,
	pub relationship_type: RelationshipType,
	pub strength: f32,
	#[serde(default)]
	pub context: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipView {
	pub source_id: Uuid,
	pub target_id: Uuid,
	pub relationship_type: RelationshipType,
	pub strength: f32,
	pub context: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl From<Relationship> for RelationshipView {
	fn from(rel: Relationship) -> Self {
		Self {
			source_id: rel.source_id,
			target_id: rel.target_id,
			relationship_type: rel.relationship_type,
			strength: rel.strength,
			context: rel.context,
			created_at: rel.created_at,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipsResponse {
	pub id: Uuid,
	pub relationships: Vec<RelationshipView>,
}

impl AlchemyService {
	pub async fn add_relationship(&self, req: AddRelationshipRequest) -> Result<RelationshipView> {
		self.add_relationship_at(req, OffsetDateTime::now_utc()).await
	}

	pub async fn add_relationship_at(
		&self,
		req: AddRelationshipRequest,
		now: OffsetDateTime,
	) -> Result<RelationshipView> {
		crate::check_unit("strength", req.strength)?;

		if req.source_id == req.target_id {
			return Err(Error::InvalidRequest {
				message: "source_id and target_id must differ.".to_string(),
			});
		}

		let relationship = Relationship {
			source_id: req.source_id,
			target_id: req.target_id,
			relationship_type: req.relationship_type,
			strength: req.strength,
			context: req.context.trim().to_string(),
			created_at: now,
		};

		self.records.add_relationship(&relationship).await?;

		tracing::info!(
			source_id = %relationship.source_id,
			target_id = %relationship.target_id,
			relationship_type = %relationship.relationship_type,
			"Relationship stored."
		);

		Ok(RelationshipView::from(relationship))
	}

	/// Relationships where `id` is either endpoint.
	pub async fn relationships(&self, id: Uuid) -> Result<RelationshipsResponse> {
		let relationships = self.records.relationships(id).await?;

		Ok(RelationshipsResponse {
			id,
			relationships: relationships.into_iter().map(RelationshipView::from).collect(),
		})
	}
}
