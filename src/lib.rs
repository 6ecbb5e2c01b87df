//! # Promo Ingest
//!
//! Imports promotional-campaign exports into a submissions database.
//!
//! Each uploaded CSV/TSV goes through a fixed pipeline: the schema sniffer
//! decodes it and classifies its columns, the filename is mined for an
//! artist/song hint, every row is reconciled against the song catalog, and
//! the commit engine writes one submission per valid row keyed by the
//! file's idempotency key so a retried upload never duplicates rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │  Sniff   │──▶│ Reconcile│──▶│   Commit    │──▶│  SQLite  │
//! │ + hint   │   │ + match  │   │ idempotent  │   │  store   │
//! └──────────┘   └────┬─────┘   └─────────────┘   └──────────┘
//!                     │ catalog
//!          ┌──────────┴─────────┐
//!          ▼                    ▼
//!     ┌──────────┐        ┌──────────┐
//!     │   CLI    │        │   HTTP   │
//!     │ (promo)  │        │  (axum)  │
//!     └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Per-file terminal errors |
//! | [`normalize`] | Text normalization for matching |
//! | [`sniff`] | Decoding, delimiter and column-role detection |
//! | [`filename_hint`] | Artist/title hints from upload filenames |
//! | [`catalog`] | Catalog lookup trait with SQLite and in-memory backends |
//! | [`matcher`] | Row-to-catalog song matching |
//! | [`reconcile`] | Row extraction, validation and matching |
//! | [`idempotency`] | Content hashing and import keys |
//! | [`store`] | Submission and campaign persistence |
//! | [`commit`] | Idempotent commit of reconciled rows |
//! | [`stats`] | Submission statistics and per-track summaries |
//! | [`batch`] | Multi-file imports with bounded concurrency |
//! | [`importer`] | Facade used by the CLI and HTTP server |
//! | [`progress`] | Batch progress reporting |
//! | [`discover`] | Directory scanning for batch imports |
//! | [`import_cmd`] | CLI command implementations |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod batch;
pub mod catalog;
pub mod commit;
pub mod config;
pub mod db;
pub mod discover;
pub mod error;
pub mod filename_hint;
pub mod idempotency;
pub mod import_cmd;
pub mod importer;
pub mod logging;
pub mod matcher;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reconcile;
pub mod server;
pub mod sniff;
pub mod stats;
pub mod store;
