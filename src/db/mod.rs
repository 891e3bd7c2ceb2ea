//! Database layer for ibops
//!
//! MongoDB storage behind the `Repository` seam, with an in-memory twin for
//! dev mode and tests.
//! Pattern adapted from holo-host/rust/util_libs/db

pub mod mongo;
pub mod repository;
pub mod schemas;
mod stores;

pub use mongo::{MongoClient, MongoCollection};
pub use repository::{get_scoped, modify_scoped, retry_on_conflict, MemoryRepository, Record, Repository};
pub use schemas::Metadata;
pub use stores::Stores;
