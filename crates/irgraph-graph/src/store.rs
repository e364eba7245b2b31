//! Abstract interface over the property-graph store.
//!
//! Persistence and querying only talk to the store through [`GraphStore`],
//! so both can be exercised against an in-memory mock.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use irgraph_core::{RelationshipRecord, TenantId};

use crate::client::{GraphClient, GraphError};
use crate::project::RawValue;

/// A node ready to be created: its full label set and flattened properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl NodeRow {
    /// The persisted identity, if the row carries one.
    pub fn id(&self) -> Option<&str> {
        self.properties.get("id").and_then(|v| v.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create every row in one committed write.
    async fn create_nodes(&self, rows: &[NodeRow]) -> Result<(), GraphError>;

    /// Ensure the node identity property is indexed. Idempotent.
    async fn ensure_id_index(&self) -> Result<(), GraphError>;

    /// Create every record in one committed write, resolving endpoints by
    /// identity within `tenant`.
    async fn create_relationships(
        &self,
        tenant: &TenantId,
        records: &[RelationshipRecord],
    ) -> Result<(), GraphError>;

    /// Delete every node of `tenant` with its relationships. Returns the node count.
    async fn clear_tenant(&self, tenant: &TenantId) -> Result<u64, GraphError>;

    /// Run a read query with `$projectId` bound to `tenant`, returning at most `limit` rows.
    async fn read(
        &self,
        tenant: &TenantId,
        cypher: &str,
        limit: usize,
    ) -> Result<Vec<Vec<RawValue>>, GraphError>;
}

#[async_trait]
impl<T: GraphStore + ?Sized> GraphStore for Arc<T> {
    async fn create_nodes(&self, rows: &[NodeRow]) -> Result<(), GraphError> {
        (**self).create_nodes(rows).await
    }

    async fn ensure_id_index(&self) -> Result<(), GraphError> {
        (**self).ensure_id_index().await
    }

    async fn create_relationships(
        &self,
        tenant: &TenantId,
        records: &[RelationshipRecord],
    ) -> Result<(), GraphError> {
        (**self).create_relationships(tenant, records).await
    }

    async fn clear_tenant(&self, tenant: &TenantId) -> Result<u64, GraphError> {
        (**self).clear_tenant(tenant).await
    }

    async fn read(
        &self,
        tenant: &TenantId,
        cypher: &str,
        limit: usize,
    ) -> Result<Vec<Vec<RawValue>>, GraphError> {
        (**self).read(tenant, cypher, limit).await
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn create_nodes(&self, rows: &[NodeRow]) -> Result<(), GraphError> {
        self.create_node_batch(rows).await
    }

    async fn ensure_id_index(&self) -> Result<(), GraphError> {
        self.create_id_index().await
    }

    async fn create_relationships(
        &self,
        tenant: &TenantId,
        records: &[RelationshipRecord],
    ) -> Result<(), GraphError> {
        self.create_relationship_batch(tenant, records).await
    }

    async fn clear_tenant(&self, tenant: &TenantId) -> Result<u64, GraphError> {
        self.delete_tenant_nodes(tenant).await
    }

    async fn read(
        &self,
        tenant: &TenantId,
        cypher: &str,
        limit: usize,
    ) -> Result<Vec<Vec<RawValue>>, GraphError> {
        self.read_rows(tenant, cypher, limit).await
    }
}
