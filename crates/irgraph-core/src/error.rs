use thiserror::Error;

/// Top-level error type for irgraph domain operations.
#[derive(Error, Debug)]
pub enum IrGraphError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid program graph: node {slot} references missing slot {target} via {relationship}")]
    DanglingSlot {
        slot: usize,
        relationship: String,
        target: usize,
    },

    #[error("Invalid program graph: {kind} declares no relationship named {relationship}")]
    UnknownRelationship { kind: String, relationship: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IrGraphError>;
