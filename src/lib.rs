//! # clihub
//!
//! A registry of command-line tools with intent-aware hybrid search, for
//! agents that need to pick the right tool for a task.
//!
//! Ranking lives in the `clihub-core` crate, which has no I/O of its own.
//! This crate supplies the concrete pieces around it: the registry loader,
//! remote embedding backends, the SQLite vector index and unmet-request log,
//! the CLI front-ends, and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │  Registry  │──▶│     SearchEngine      │◀──│ SQLite index │
//! │ JSON files │   │ lexical + semantic +  │   │  + misses    │
//! └────────────┘   │ intent + coverage     │   └──────────────┘
//!                  └──────────┬───────────┘
//!                     ┌───────┴───────┐
//!                     ▼               ▼
//!                ┌──────────┐   ┌──────────┐
//!                │   CLI    │   │   HTTP   │
//!                └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and the intent-table file |
//! | [`registry`] | Registry loading, validation, bounded store reads |
//! | [`embedding`] | OpenAI and Ollama embedding backends |
//! | [`vector_index`] | SQLite-backed entry-embedding index |
//! | [`misses`] | Unmet-request log |
//! | [`hub`] | Wiring from config to a ready engine |
//! | [`search`] | CLI search front-ends |
//! | [`index_cmd`] | Vector index maintenance |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod hub;
pub mod index_cmd;
pub mod migrate;
pub mod misses;
pub mod registry;
pub mod search;
pub mod server;
pub mod vector_index;
