//! In-memory mock implementation of GraphStore for testing.
//!
//! Records every batch and read it receives, and can be told to fail a
//! specific write batch to exercise partial-write handling.
//! Compiled under `#[cfg(test)]` or the `mock` feature.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use irgraph_core::{RelationshipRecord, TenantId};

use crate::client::GraphError;
use crate::project::RawValue;
use crate::store::{GraphStore, NodeRow};

/// One call received by the mock, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    CreateNodes(usize),
    EnsureIdIndex,
    CreateRelationships(usize),
    ClearTenant(TenantId),
    Read,
}

#[derive(Default)]
struct MockState {
    calls: RwLock<Vec<StoreCall>>,
    nodes: RwLock<Vec<Vec<NodeRow>>>,
    relationships: RwLock<Vec<(TenantId, Vec<RelationshipRecord>)>>,
    reads: RwLock<Vec<(TenantId, String, usize)>>,
    read_results: RwLock<VecDeque<Vec<Vec<RawValue>>>>,
    read_failure: RwLock<Option<String>>,
    fail_node_batch: RwLock<Option<usize>>,
    fail_relationship_batch: RwLock<Option<usize>>,
    fail_index: RwLock<bool>,
    node_attempts: RwLock<usize>,
    relationship_attempts: RwLock<usize>,
}

/// Cloning shares the recorded state.
#[derive(Clone, Default)]
pub struct MockGraphStore {
    state: Arc<MockState>,
}

impl MockGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Failure injection ────────────────────────────────────────

    /// Fail the node batch with this zero-based attempt index.
    pub async fn fail_node_batch(&self, index: usize) {
        *self.state.fail_node_batch.write().await = Some(index);
    }

    /// Fail the relationship batch with this zero-based attempt index.
    pub async fn fail_relationship_batch(&self, index: usize) {
        *self.state.fail_relationship_batch.write().await = Some(index);
    }

    pub async fn fail_index(&self) {
        *self.state.fail_index.write().await = true;
    }

    pub async fn fail_reads(&self, message: &str) {
        *self.state.read_failure.write().await = Some(message.to_string());
    }

    /// Queue rows returned by the next read.
    pub async fn push_read_result(&self, rows: Vec<Vec<RawValue>>) {
        self.state.read_results.write().await.push_back(rows);
    }

    // ── Inspection ───────────────────────────────────────────────

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.calls.read().await.clone()
    }

    /// Committed node batches.
    pub async fn node_batches(&self) -> Vec<Vec<NodeRow>> {
        self.state.nodes.read().await.clone()
    }

    /// Every committed node row.
    pub async fn nodes(&self) -> Vec<NodeRow> {
        self.state.nodes.read().await.iter().flatten().cloned().collect()
    }

    pub async fn relationships(&self) -> Vec<RelationshipRecord> {
        self.state
            .relationships
            .read()
            .await
            .iter()
            .flat_map(|(_, batch)| batch.iter().cloned())
            .collect()
    }

    /// Every read as `(tenant, cypher, limit)`.
    pub async fn reads(&self) -> Vec<(TenantId, String, usize)> {
        self.state.reads.read().await.clone()
    }

    async fn record(&self, call: StoreCall) {
        self.state.calls.write().await.push(call);
    }
}

fn injected(what: &str, index: usize) -> GraphError {
    GraphError::Connection(format!("injected failure in {what} batch {index}"))
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn create_nodes(&self, rows: &[NodeRow]) -> Result<(), GraphError> {
        self.record(StoreCall::CreateNodes(rows.len())).await;

        let attempt = {
            let mut attempts = self.state.node_attempts.write().await;
            let current = *attempts;
            *attempts += 1;
            current
        };
        if *self.state.fail_node_batch.read().await == Some(attempt) {
            return Err(injected("node", attempt));
        }

        self.state.nodes.write().await.push(rows.to_vec());
        Ok(())
    }

    async fn ensure_id_index(&self) -> Result<(), GraphError> {
        self.record(StoreCall::EnsureIdIndex).await;
        if *self.state.fail_index.read().await {
            return Err(GraphError::Connection("injected index failure".to_string()));
        }
        Ok(())
    }

    async fn create_relationships(
        &self,
        tenant: &TenantId,
        records: &[RelationshipRecord],
    ) -> Result<(), GraphError> {
        self.record(StoreCall::CreateRelationships(records.len())).await;

        let attempt = {
            let mut attempts = self.state.relationship_attempts.write().await;
            let current = *attempts;
            *attempts += 1;
            current
        };
        if *self.state.fail_relationship_batch.read().await == Some(attempt) {
            return Err(injected("relationship", attempt));
        }

        self.state
            .relationships
            .write()
            .await
            .push((tenant.clone(), records.to_vec()));
        Ok(())
    }

    async fn clear_tenant(&self, tenant: &TenantId) -> Result<u64, GraphError> {
        self.record(StoreCall::ClearTenant(tenant.clone())).await;

        let mut removed = 0u64;
        for batch in self.state.nodes.write().await.iter_mut() {
            let before = batch.len();
            batch.retain(|row| {
                row.properties.get("projectId").and_then(|v| v.as_str()) != Some(tenant.as_str())
            });
            removed += (before - batch.len()) as u64;
        }
        self.state
            .relationships
            .write()
            .await
            .retain(|(t, _)| t != tenant);
        Ok(removed)
    }

    async fn read(
        &self,
        tenant: &TenantId,
        cypher: &str,
        limit: usize,
    ) -> Result<Vec<Vec<RawValue>>, GraphError> {
        self.record(StoreCall::Read).await;
        self.state
            .reads
            .write()
            .await
            .push((tenant.clone(), cypher.to_string(), limit));

        if let Some(message) = self.state.read_failure.read().await.clone() {
            return Err(GraphError::Conversion(message));
        }

        let mut rows = self
            .state
            .read_results
            .write()
            .await
            .pop_front()
            .unwrap_or_default();
        rows.truncate(limit);
        Ok(rows)
    }
}
