//! Storage Module
//!
//! Embedded SQLite persistence: schema migrations, typed CRUD for every
//! record kind, and the FTS5 keyword-search primitive.

pub mod migrations;
mod sqlite;

pub use sqlite::{DomainStats, Store, StoreCounts};
