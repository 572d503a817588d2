//! vectorgate-server: concrete provider adapters, SQLite-backed registries
//! and stores, the chat orchestration graph runtime, the vector store
//! engine's I/O, the testbed runner, the MCP bridge, and the Axum HTTP
//! surface.

pub mod config;
pub mod db;
pub mod graph;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod providers;
pub mod registries;
pub mod testbed;
pub mod vectorstore;
