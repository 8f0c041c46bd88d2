//! # Blinko AI Core
//!
//! Runtime-free building blocks of the assistant's retrieval pipeline:
//! data models, the model capability registry, the two chunking
//! strategies, the embedding client trait, and the vector store
//! abstraction with an in-memory implementation.
//!
//! This crate has no tokio, sqlx, or HTTP dependencies. Network-backed
//! clients and the SQLite store live in the `blinko-ai` crate.

pub mod capability;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod store;
