//! # vectorgate-core
//!
//! Pure data models, scoring math, the paragraph-boundary chunker, and the
//! pluggable adapter traits (`EmbeddingProvider`, `VectorStoreBackend`)
//! shared by the vectorgate gateway. No tokio, no sqlx, no filesystem or
//! network I/O — this crate compiles to both native targets and
//! `wasm32-unknown-unknown`.
//!
//! Concrete provider adapters, the SQLite-backed store, the orchestration
//! graph runtime, the HTTP/MCP surfaces, and the CLI all live in the
//! `vectorgate-server` app crate.

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod models;
pub mod prompts;
pub mod search;
pub mod store;

pub use errors::GatewayError;
