//! Postgres access for the backfill source side.
//!
//! Connection pooling, `information_schema` lookups, row counts and checkpoint queries through
//! [`sqlx`]. The bulk export itself runs through `psql` and is assembled by the `backfill` crate.

pub mod schema;
pub mod sqlx;
pub mod types;
