pub mod content;
pub mod learning;
pub mod lifecycle;
pub mod phase;
pub mod ranking;
pub mod relationship;
pub mod vector;

pub use phase::Phase;
pub use relationship::RelationshipType;
