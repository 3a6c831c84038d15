//! Source database abstraction and its Postgres implementation.

mod base;
pub mod postgres;

pub use base::SourceDatabase;
