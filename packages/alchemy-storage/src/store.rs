use std::{future::Future, pin::Pin};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Deadline, Result,
	models::{
		NewRecord, PromptRecord, PutOutcome, Relationship, StaleRecord, UsageOutcome,
	},
};
use alchemy_domain::Phase;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordFilter {
	pub phase: Option<Phase>,
	pub provider: Option<String>,
	pub model: Option<String>,
	/// Every listed tag must be present.
	pub tags: Vec<String>,
	pub created_after: Option<OffsetDateTime>,
	pub created_before: Option<OffsetDateTime>,
}
impl RecordFilter {
	pub fn matches(&self, record: &PromptRecord) -> bool {
		if self.phase.is_some_and(|phase| phase != record.phase) {
			return false;
		}
		if self.provider.as_deref().is_some_and(|provider| provider != record.provider) {
			return false;
		}
		if self.model.as_deref().is_some_and(|model| model != record.model) {
			return false;
		}
		if !self.tags.iter().all(|tag| record.tags.contains(tag)) {
			return false;
		}
		if self.created_after.is_some_and(|after| record.created_at < after) {
			return false;
		}
		if self.created_before.is_some_and(|before| record.created_at >= before) {
			return false;
		}

		true
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ScanOrder {
	/// Relevance descending, then usage descending, then id ascending.
	#[default]
	Relevance,
	/// Creation time descending, then id ascending.
	Recent,
}

#[derive(Clone, Debug)]
pub struct CandidateScan {
	pub filter: RecordFilter,
	/// Inclusive lower bound on relevance.
	pub relevance_floor: f32,
	pub order: ScanOrder,
	pub limit: u32,
	/// Rows fetched per page; the deadline is checked between pages.
	pub batch_size: u32,
}

/// Record-level persistence shared by the SQLite store and the in-memory store.
///
/// Every mutating method is atomic on its own. Methods that take `now` never read the clock.
pub trait RecordStore
where
	Self: Send + Sync,
{
	/// Inserts a record, or bumps usage on the existing record with the same normalized content.
	fn put<'a>(&'a self, record: &'a NewRecord, now: OffsetDateTime)
	-> BoxFuture<'a, Result<PutOutcome>>;

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<PromptRecord>>;

	/// Records in the order of `ids`; missing ids are skipped.
	fn get_many<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<PromptRecord>>>;

	/// Removes the record and its relationships. Returns whether a record was removed.
	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<bool>>;

	fn scan_candidates<'a>(
		&'a self,
		scan: &'a CandidateScan,
		deadline: Deadline,
	) -> BoxFuture<'a, Result<Vec<PromptRecord>>>;

	/// Applies a usage boost: relevance up by `boost_increment` (capped at one), usage count up by
	/// one, last use set to `now`.
	fn record_usage<'a>(
		&'a self,
		id: Uuid,
		boost_increment: f32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<UsageOutcome>>;

	/// Ids above `floor` whose last use (or creation) is at or before `idle_since`, ascending by id
	/// and strictly after `after`.
	fn decay_candidates<'a>(
		&'a self,
		idle_since: OffsetDateTime,
		floor: f32,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Uuid>>>;

	/// Decays one record if it still qualifies. Returns the new score when it changed.
	fn decay_record<'a>(
		&'a self,
		id: Uuid,
		factor: f32,
		floor: f32,
		idle_since: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Option<f32>>>;

	/// Records at or below `threshold` created before `created_before`, ascending by id and
	/// strictly after `after`.
	fn cleanup_candidates<'a>(
		&'a self,
		threshold: f32,
		created_before: OffsetDateTime,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StaleRecord>>>;

	/// Deletes the record only if it still matches the cleanup predicate.
	fn delete_if_stale<'a>(
		&'a self,
		id: Uuid,
		threshold: f32,
		created_before: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// Creates or replaces the relationship keyed by source, target, and type.
	fn add_relationship<'a>(&'a self, relationship: &'a Relationship) -> BoxFuture<'a, Result<()>>;

	/// Relationships where the record is either endpoint.
	fn relationships<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Vec<Relationship>>>;
}
