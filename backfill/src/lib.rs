//! One-time bulk load of Postgres tables into MemSQL.
//!
//! Each table of the [`catalog::Catalog`] is reconciled, emptied and reloaded through an
//! external dump, compression and load pipeline, then verified by row count. The source
//! checkpoint captured before the first table tells where a continuous replication stream has
//! to pick up.

pub mod catalog;
pub mod compression;
pub mod destination;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod identifier;
mod macros;
pub mod orchestrator;
pub mod pipeline;
pub mod schema;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction;
pub mod types;
pub mod verify;
