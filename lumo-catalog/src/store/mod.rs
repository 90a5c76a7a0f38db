//! Catalog store
//!
//! SQLite persistence for the catalog record model. One module per entity
//! family, free functions over `&SqlitePool` (or a transaction), raw SQL
//! with bound parameters. Writes are atomic at record granularity; loaders
//! group structural multi-record changes in explicit transactions.
//!
//! The store never emits change notifications itself; reconcilers and
//! editorial mutators emit through the bus, which the pipeline driver
//! gates during ingest.

pub mod courses;
pub mod course_runs;
pub mod history;
pub mod organizations;
pub mod orphans;
pub mod partners;
pub mod programs;
pub mod schema;
pub mod seats;
pub mod translations;
pub mod types;

#[cfg(test)]
pub mod test_support;

pub use schema::init_schema;
