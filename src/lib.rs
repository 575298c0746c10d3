//! Feed ingestion: scheduled polling of RSS/Atom feeds, idempotent storage of
//! their items in SQLite, and heuristic discovery of feed URLs for a website.
//!
//! - [`storage`] - SQLite store; `articles.guid` uniqueness makes re-fetches no-ops
//! - [`feed`] - parsing, normalization, fetching and discovery
//! - [`scheduler`] - fixed-interval polling with bounded concurrency
//! - [`config`] - TOML configuration with environment overrides

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
