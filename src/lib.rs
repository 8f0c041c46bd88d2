//! # Blinko AI
//!
//! Retrieval and tool-execution core of the Blinko note assistant.
//!
//! ## Architecture
//!
//! ```text
//! Document ──► Chunker ──► EmbeddingClient ──► IndexManager ──► VectorStore
//!                              ▲                    ▲
//!                      ProviderResolver       RetrievalPipeline ◄── retrieve(query, k)
//!
//! Agent ──► ToolRegistry ──► validate ──► CallerContext ──► NoteMutationApi
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`http`] | Shared outbound HTTP client (proxy, timeout) |
//! | [`provider`] | Provider resolver and embedding/inference/audio clients |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite vector store and per-path store registry |
//! | [`corpus`] | Document sources for index rebuilds |
//! | [`index`] | Index lifecycle: rebuild-before-use, single-flight writers |
//! | [`pipeline`] | Ingest and retrieval |
//! | [`tools`] | Agent tools: `delete-notes`, `batch-update-notes` |
//! | [`context`] | Process-scoped context wiring everything together |
//!
//! Runtime-free pieces (models, capability registry, chunkers, the
//! embedding client trait, the vector store trait) live in the
//! `blinko-ai-core` crate, re-exported as [`ai_core`].

pub use blinko_ai_core as ai_core;

pub mod config;
pub mod context;
pub mod corpus;
pub mod db;
pub mod http;
pub mod index;
pub mod migrate;
pub mod pipeline;
pub mod provider;
pub mod sqlite_store;
pub mod tools;
