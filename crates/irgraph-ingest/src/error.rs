//! Error types for the irgraph-ingest crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Graph error: {0}")]
    Graph(#[from] irgraph_graph::GraphError),

    #[error("Persistence failed: {0}")]
    Persist(#[from] irgraph_graph::PersistError),

    #[error(transparent)]
    Query(#[from] irgraph_graph::QueryError),

    #[error(transparent)]
    Core(#[from] irgraph_core::IrGraphError),

    #[error("Analysis job aborted: {0}")]
    JobAborted(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
