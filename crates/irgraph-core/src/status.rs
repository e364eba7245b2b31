//! Lifecycle of one analysis-and-persist pass.
//!
//! A pass runs in the background; callers poll the current
//! [`AnalysisStatus`] and read the [`PassReport`] once it finishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Stage a pass is in. Serialized as `SCREAMING_SNAKE_CASE` for polling clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "status")]
pub enum AnalysisStatus {
    Created,
    Clearing,
    PersistingNodes,
    PersistingEdges,
    Completed,
    Failed { stage: String, message: String },
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Clearing => "CLEARING",
            Self::PersistingNodes => "PERSISTING_NODES",
            Self::PersistingEdges => "PERSISTING_EDGES",
            Self::Completed => "COMPLETED",
            Self::Failed { .. } => "FAILED",
        }
    }
}

/// Summary of a finished pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub tenant_id: TenantId,
    pub nodes_cleared: u64,
    pub nodes_persisted: usize,
    pub nodes_filtered: usize,
    pub edges_persisted: usize,
    pub edges_dropped: usize,
    /// Names of variables tagged `TrackedVariable`.
    pub tracked_variables: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
