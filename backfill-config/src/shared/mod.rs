//! Shared configuration types for the backfill loader.

mod backfill;
mod base;
mod connection;

pub use backfill::*;
pub use base::*;
pub use connection::*;
