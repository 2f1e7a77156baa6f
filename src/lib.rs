#![deny(missing_docs)]

//! Core library for the Docchat question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat completion client abstraction and retry policy.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Document processing pipeline: normalization, chunking, ingestion, retrieval.
pub mod processing;
/// Supabase row store and object storage integration.
pub mod supabase;
