//! In-process [`RecordStore`] for tests and embedding hosts without a database file.

use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Deadline, Error, Result,
	models::{
		EmbeddingStatus, NewRecord, PromptRecord, PutOutcome, Relationship, StaleRecord,
		UsageOutcome,
	},
	store::{BoxFuture, CandidateScan, RecordStore, ScanOrder},
};
use alchemy_domain::{content, ranking};

#[derive(Default)]
struct State {
	records: HashMap<Uuid, PromptRecord>,
	by_hash: HashMap<String, Uuid>,
	relationships: Vec<Relationship>,
}

#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.lock().records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn put_now(&self, record: &NewRecord, now: OffsetDateTime) -> Result<PutOutcome> {
		let content_hash = content::content_hash(&record.content);
		let mut state = self.lock();

		if let Some(id) = state.by_hash.get(&content_hash).copied() {
			let existing = state
				.records
				.get_mut(&id)
				.ok_or_else(|| Error::Corrupt(format!("Hash index points at missing prompt {id}.")))?;

			existing.usage_count += 1;
			existing.last_used_at = Some(now);
			existing.updated_at = now;

			if let Some(embedding) = record.embedding.as_ref()
				&& embedding.status == EmbeddingStatus::Ok
				&& existing.embedding_status != EmbeddingStatus::Ok
			{
				existing.embedding = Some(embedding.vector.clone());
				existing.embedding_model = Some(embedding.model.clone());
				existing.embedding_provider = Some(embedding.provider.clone());
				existing.embedding_status = EmbeddingStatus::Ok;
			}

			return Ok(PutOutcome { id, created: false, usage_count: existing.usage_count });
		}
		if let Some(parent_id) = record.parent_id
			&& !state.records.contains_key(&parent_id)
		{
			return Err(Error::NotFound(format!("Parent prompt {parent_id} not found.")));
		}

		let id = Uuid::new_v4();
		let embedding = record.embedding.as_ref();
		let stored = PromptRecord {
			id,
			content: record.content.clone(),
			content_hash: content_hash.clone(),
			phase: record.phase,
			provider: record.provider.clone(),
			model: record.model.clone(),
			temperature: record.temperature,
			max_tokens: record.max_tokens,
			actual_tokens: record.actual_tokens,
			tags: record.tags.clone(),
			parent_id: record.parent_id,
			session_id: record.session_id.clone(),
			embedding: embedding.map(|embedding| embedding.vector.clone()),
			embedding_model: embedding.map(|embedding| embedding.model.clone()),
			embedding_provider: embedding.map(|embedding| embedding.provider.clone()),
			embedding_status: embedding
				.map(|embedding| embedding.status)
				.unwrap_or(EmbeddingStatus::Missing),
			relevance_score: 1.0,
			usage_count: 1,
			last_used_at: None,
			created_at: now,
			updated_at: now,
		};

		state.by_hash.insert(content_hash, id);
		state.records.insert(id, stored);

		Ok(PutOutcome { id, created: true, usage_count: 1 })
	}

	fn remove(state: &mut State, id: Uuid) -> bool {
		let Some(record) = state.records.remove(&id) else {
			return false;
		};

		state.by_hash.remove(&record.content_hash);
		state.relationships.retain(|rel| rel.source_id != id && rel.target_id != id);

		for other in state.records.values_mut() {
			if other.parent_id == Some(id) {
				other.parent_id = None;
			}
		}

		true
	}
}

impl RecordStore for MemoryStore {
	fn put<'a>(
		&'a self,
		record: &'a NewRecord,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<PutOutcome>> {
		Box::pin(async move { self.put_now(record, now) })
	}

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<PromptRecord>> {
		Box::pin(async move {
			self.lock()
				.records
				.get(&id)
				.cloned()
				.ok_or_else(|| Error::NotFound(format!("Prompt {id} not found.")))
		})
	}

	fn get_many<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<PromptRecord>>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(ids.iter().filter_map(|id| state.records.get(id).cloned()).collect())
		})
	}

	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(Self::remove(&mut self.lock(), id)) })
	}

	fn scan_candidates<'a>(
		&'a self,
		scan: &'a CandidateScan,
		deadline: Deadline,
	) -> BoxFuture<'a, Result<Vec<PromptRecord>>> {
		Box::pin(async move {
			deadline.check()?;

			// The lock is taken per batch so writers interleave with long scans.
			let ids: Vec<Uuid> = self.lock().records.keys().copied().collect();
			let mut matched = Vec::new();

			for batch in ids.chunks(scan.batch_size.max(1) as usize) {
				deadline.check()?;

				let state = self.lock();

				matched.extend(
					batch
						.iter()
						.filter_map(|id| state.records.get(id))
						.filter(|record| record.relevance_score >= scan.relevance_floor)
						.filter(|record| scan.filter.matches(record))
						.cloned(),
				);
			}

			match scan.order {
				ScanOrder::Relevance => matched.sort_by(|a, b| {
					ranking::compare_desc(
						(a.relevance_score, a.usage_count as f32, &a.id),
						(b.relevance_score, b.usage_count as f32, &b.id),
					)
				}),
				ScanOrder::Recent => matched
					.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))),
			}

			matched.truncate(scan.limit as usize);

			Ok(matched)
		})
	}

	fn record_usage<'a>(
		&'a self,
		id: Uuid,
		boost_increment: f32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<UsageOutcome>> {
		Box::pin(async move {
			let mut state = self.lock();
			let record = state
				.records
				.get_mut(&id)
				.ok_or_else(|| Error::NotFound(format!("Prompt {id} not found.")))?;

			record.relevance_score = (record.relevance_score + boost_increment).min(1.0);
			record.usage_count += 1;
			record.last_used_at = Some(now);
			record.updated_at = now;

			Ok(UsageOutcome {
				id,
				relevance_score: record.relevance_score,
				usage_count: record.usage_count,
			})
		})
	}

	fn decay_candidates<'a>(
		&'a self,
		idle_since: OffsetDateTime,
		floor: f32,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		Box::pin(async move {
			let mut ids: Vec<Uuid> = self
				.lock()
				.records
				.values()
				.filter(|record| record.relevance_score > floor)
				.filter(|record| record.last_touched_at() <= idle_since)
				.filter(|record| after.is_none_or(|after| record.id > after))
				.map(|record| record.id)
				.collect();

			ids.sort();
			ids.truncate(limit as usize);

			Ok(ids)
		})
	}

	fn decay_record<'a>(
		&'a self,
		id: Uuid,
		factor: f32,
		floor: f32,
		idle_since: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<f32>>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(record) = state.records.get_mut(&id) else {
				return Ok(None);
			};

			if record.relevance_score <= floor || record.last_touched_at() > idle_since {
				return Ok(None);
			}

			record.relevance_score = (record.relevance_score * factor).max(floor);
			record.updated_at = now;

			Ok(Some(record.relevance_score))
		})
	}

	fn cleanup_candidates<'a>(
		&'a self,
		threshold: f32,
		created_before: OffsetDateTime,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StaleRecord>>> {
		Box::pin(async move {
			let mut stale: Vec<StaleRecord> = self
				.lock()
				.records
				.values()
				.filter(|record| record.relevance_score <= threshold)
				.filter(|record| record.created_at < created_before)
				.filter(|record| after.is_none_or(|after| record.id > after))
				.map(|record| StaleRecord {
					id: record.id,
					relevance_score: record.relevance_score,
					created_at: record.created_at,
				})
				.collect();

			stale.sort_by_key(|record| record.id);
			stale.truncate(limit as usize);

			Ok(stale)
		})
	}

	fn delete_if_stale<'a>(
		&'a self,
		id: Uuid,
		threshold: f32,
		created_before: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let still_stale = state.records.get(&id).is_some_and(|record| {
				record.relevance_score <= threshold && record.created_at < created_before
			});

			Ok(still_stale && Self::remove(&mut state, id))
		})
	}

	fn add_relationship<'a>(&'a self, relationship: &'a Relationship) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if !(0.0..=1.0).contains(&relationship.strength) {
				return Err(Error::InvalidArgument(
					"Relationship strength must be in the range 0.0-1.0.".to_string(),
				));
			}

			let mut state = self.lock();

			if !state.records.contains_key(&relationship.source_id)
				|| !state.records.contains_key(&relationship.target_id)
			{
				return Err(Error::NotFound("Relationship endpoint not found.".to_string()));
			}

			if let Some(existing) = state.relationships.iter_mut().find(|rel| {
				rel.source_id == relationship.source_id
					&& rel.target_id == relationship.target_id
					&& rel.relationship_type == relationship.relationship_type
			}) {
				existing.strength = relationship.strength;
				existing.context = relationship.context.clone();
			} else {
				state.relationships.push(relationship.clone());
			}

			Ok(())
		})
	}

	fn relationships<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Vec<Relationship>>> {
		Box::pin(async move {
			let mut related: Vec<Relationship> = self
				.lock()
				.relationships
				.iter()
				.filter(|rel| rel.source_id == id || rel.target_id == id)
				.cloned()
				.collect();

			related.sort_by(|a, b| {
				a.created_at
					.cmp(&b.created_at)
					.then_with(|| a.source_id.cmp(&b.source_id))
					.then_with(|| a.target_id.cmp(&b.target_id))
					.then_with(|| a.relationship_type.as_str().cmp(b.relationship_type.as_str()))
			});

			Ok(related)
		})
	}
}
