//! Write operations for the program graph.
//!
//! Nodes and relationships are created in bulk with `UNWIND` over a
//! parameter list. Labels and relationship types are dynamic, so creation
//! goes through APOC. Each batch runs in its own transaction.

use std::collections::{BTreeMap, HashMap};

use neo4rs::{query, BoltType};

use irgraph_core::program::NODE_LABEL;
use irgraph_core::{RelationshipRecord, TenantId};

use crate::client::{GraphClient, GraphError};
use crate::store::NodeRow;

impl GraphClient {
    /// Create a batch of nodes in a single transaction.
    pub async fn create_node_batch(&self, rows: &[NodeRow]) -> Result<(), GraphError> {
        if rows.is_empty() {
            return Ok(());
        }

        let params: Vec<HashMap<String, BoltType>> = rows
            .iter()
            .map(|row| {
                let mut m: HashMap<String, BoltType> = HashMap::new();
                m.insert("labels".to_string(), row.labels.clone().into());
                m.insert("properties".to_string(), properties_to_bolt(&row.properties).into());
                m
            })
            .collect();

        let q = query(
            "UNWIND $rows AS row
             CALL apoc.create.node(row.labels, row.properties) YIELD node
             RETURN count(node) AS created",
        )
        .param("rows", params);

        let mut txn = self.start_txn().await?;
        txn.run(q).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Index the identity property of every persisted node.
    pub async fn create_id_index(&self) -> Result<(), GraphError> {
        let cypher = format!("CREATE INDEX node_id IF NOT EXISTS FOR (n:{NODE_LABEL}) ON (n.id)");
        self.run(query(&cypher)).await
    }

    /// Create a batch of relationships in a single transaction.
    ///
    /// Both endpoints are matched by `id` and `projectId`, so identities
    /// reused across tenants never link unrelated graphs.
    pub async fn create_relationship_batch(
        &self,
        tenant: &TenantId,
        records: &[RelationshipRecord],
    ) -> Result<(), GraphError> {
        if records.is_empty() {
            return Ok(());
        }

        let params: Vec<HashMap<String, BoltType>> = records
            .iter()
            .map(|record| {
                let mut properties = properties_to_bolt(&record.properties);
                properties.insert("projectId".to_string(), tenant.as_str().into());

                let mut m: HashMap<String, BoltType> = HashMap::new();
                m.insert("startId".to_string(), record.start_id.to_string().into());
                m.insert("endId".to_string(), record.end_id.to_string().into());
                m.insert("type".to_string(), record.rel_type.clone().into());
                m.insert("properties".to_string(), properties.into());
                m
            })
            .collect();

        let cypher = format!(
            "UNWIND $rels AS r
             MATCH (s:{NODE_LABEL} {{id: r.startId, projectId: $projectId}})
             MATCH (e:{NODE_LABEL} {{id: r.endId, projectId: $projectId}})
             CALL apoc.create.relationship(s, r.type, r.properties, e) YIELD rel
             RETURN count(rel) AS created"
        );
        let q = query(&cypher)
            .param("rels", params)
            .param("projectId", tenant.as_str());

        let mut txn = self.start_txn().await?;
        txn.run(q).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Delete every node of `tenant` and its relationships.
    pub async fn delete_tenant_nodes(&self, tenant: &TenantId) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (n {projectId: $projectId})
             DETACH DELETE n
             RETURN count(n) AS deleted",
        )
        .param("projectId", tenant.as_str());

        let deleted = match self.query_one(q).await? {
            Some(row) => row.get::<i64>("deleted").unwrap_or(0),
            None => 0,
        };
        tracing::info!(tenant = %tenant, deleted, "Cleared tenant graph");
        Ok(deleted.max(0) as u64)
    }
}

/// Convert a JSON property map to Bolt values, skipping nulls.
fn properties_to_bolt(
    properties: &BTreeMap<String, serde_json::Value>,
) -> HashMap<String, BoltType> {
    properties
        .iter()
        .filter_map(|(k, v)| json_to_bolt(v).map(|b| (k.clone(), b)))
        .collect()
}

/// Scalars map to their Bolt counterpart. Arrays and objects are stored as
/// JSON text since store properties cannot nest.
fn json_to_bolt(value: &serde_json::Value) -> Option<BoltType> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.into()),
            None => n.as_f64().map(Into::into),
        },
        Value::String(s) => Some(s.clone().into()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string().into()),
    }
}
