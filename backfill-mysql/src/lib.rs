//! MemSQL access for the backfill destination side.
//!
//! MemSQL speaks the MySQL protocol, so everything here goes through the [`sqlx`] MySQL driver.
//! Bulk loading itself runs through the `mysql` client and is assembled by the `backfill` crate.

pub mod schema;
pub mod sqlx;
pub mod types;
