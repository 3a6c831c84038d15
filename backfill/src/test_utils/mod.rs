//! Test doubles and database helpers for backfill tests.
//!
//! [`memory`] holds a source and a destination that keep their tables in memory but still run
//! real `sh` processes for every pipeline stage, so the stream protocol is exercised end to
//! end without any database. [`database`] creates throwaway Postgres and MemSQL databases for
//! tests running against live servers.

pub mod database;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod memory;
