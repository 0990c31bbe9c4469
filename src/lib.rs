//! rowseed - foreign-key closure exporter
//!
//! Takes one row of a PostgreSQL database, follows its outbound foreign keys
//! transitively and renders everything it found as a transactional,
//! re-runnable SQL seed script. Usable as a library ([`export::Exporter`]),
//! through the `rowseed-export` command or over HTTP (`rowseed`).

pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod models;
pub mod routes;
pub mod state;
