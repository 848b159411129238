//! # clihub core
//!
//! Runtime-agnostic search and ranking logic for the clihub registry: data
//! models, tokenizer, intent taxonomy, embedding cache, store traits, the
//! ranking combiner and the coverage-enforcing selector.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O. The
//! application crate supplies store implementations, remote embedding
//! backends and the persistent vector index.

pub mod coverage;
pub mod embedding;
pub mod intent;
pub mod models;
pub mod rank;
pub mod scoring;
pub mod search;
pub mod select;
pub mod similarity;
pub mod store;
pub mod tokenize;
