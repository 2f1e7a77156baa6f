//! Document processing: extraction, normalization, chunking, and the
//! pipeline service that ties them to the backend clients.

pub mod chunking;
pub mod extract;
pub mod normalize;
mod service;
pub mod types;

pub use service::{ProcessingApi, ProcessingService};
pub use types::{
    ChatAnswer, ChatError, DocumentSummary, IngestError, IngestOutcome, SourceRef,
};
