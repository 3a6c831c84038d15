//! Configuration management for the backfill loader.
//!
//! Provides environment detection, layered configuration loading from YAML/JSON files and
//! `APP_`-prefixed environment variables, secret handling, and the shared configuration types
//! describing the source Postgres database, the destination MemSQL database and the table load.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
