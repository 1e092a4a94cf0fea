//! Factgraph - static architecture facts for JavaScript/TypeScript codebases.
//!
//! Factgraph scans a source tree without executing it and reports the
//! services, HTTP routes, database models, auth policies, payload shapes
//! and business flows it finds, merged into one deterministic JSON graph.
//!
//! # Architecture
//!
//! - `extract`: per-file detectors; `scan_source` is a pure function of
//!   `(path, text, options)`
//! - `runner`: bounded concurrent reads, parallel scans, then one merge
//! - `aggregate`: cross-file merge, conflict policy and output limits
//! - `config`: YAML configuration with defaults
//! - `discover` / `manifest`: file discovery and `package.json` lookup
//! - `report`: JSON and terminal output
//!
//! # Adding a Framework
//!
//! Route shapes live in `extract/routes.rs`, model dialects in
//! `extract/dialect.rs`. Each detector canonicalizes names through
//! `extract/canonical.rs` before returning them.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod discover;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod report;
pub mod runner;

pub use aggregate::{aggregate, AggregateStats, Aggregator, FactGraph};
pub use config::{Config, ConflictPolicy};
pub use error::{AggregateError, ConfigError, ScanError};
pub use extract::types::{Entity, EntityKind, FileFacts};
pub use extract::{extract, scan_source, ScanOptions, SourceUnit};
pub use runner::{FileFailure, FsReader, Runner, ScanOutcome, SourceReader};
