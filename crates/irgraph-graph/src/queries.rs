//! Read operations for the program graph.

use neo4rs::query;

use irgraph_core::TenantId;

use crate::bolt;
use crate::client::{GraphClient, GraphError};
use crate::project::RawValue;

impl GraphClient {
    /// Run a read query with `$projectId` bound and convert each row.
    ///
    /// The query runs in a rolled-back transaction. The caller is
    /// responsible for making `cypher` tenant-scoped; this only binds the
    /// parameter.
    pub async fn read_rows(
        &self,
        tenant: &TenantId,
        cypher: &str,
        limit: usize,
    ) -> Result<Vec<Vec<RawValue>>, GraphError> {
        let q = query(cypher).param("projectId", tenant.as_str());
        let rows = self.query_rows_read_only(q, limit).await?;
        tracing::debug!(tenant = %tenant, rows = rows.len(), "Read query finished");

        rows.iter().map(bolt::row_values).collect()
    }

    /// Count the nodes stored for `tenant`.
    pub async fn count_tenant_nodes(&self, tenant: &TenantId) -> Result<i64, GraphError> {
        let q = query("MATCH (n {projectId: $projectId}) RETURN count(n) AS cnt")
            .param("projectId", tenant.as_str());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}
