//! Destination abstractions for the backfill.
//!
//! [`DestinationDatabase`] owns the session the truncate and reload transaction runs on and
//! knows how to build the external process importing a streamed table.

mod base;
pub mod memsql;

pub use base::DestinationDatabase;
