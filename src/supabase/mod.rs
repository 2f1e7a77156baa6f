//! Supabase integration: PostgREST chunk rows and object storage.

pub mod client;
pub mod storage;
pub mod types;

pub use client::SupabaseService;
pub use storage::ObjectStorage;
pub use types::{ChunkRowMeta, MatchedChunk, NewChunkRow, StoreError};
