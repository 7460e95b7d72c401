pub mod db;
pub mod deadline;
pub mod feedback;
pub mod jobs;
pub mod memory;
pub mod models;
pub mod patterns;
pub mod records;
pub mod schema;
pub mod store;
pub mod weights;

mod error;
mod timestamp;

pub use deadline::Deadline;
pub use error::Error;
pub use store::{BoxFuture, RecordStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
