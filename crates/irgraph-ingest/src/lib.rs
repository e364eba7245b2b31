//! irgraph-ingest: drives persistence passes and exposes the query gateway.
//!
//! A pass clears the tenant's previous graph, persists the new one, and
//! looks up its tracked variables, all in a background task whose progress
//! is observed through a status channel.

pub mod error;
pub mod pipeline;

pub use error::{IngestError, Result};
pub use pipeline::AnalysisJob;
