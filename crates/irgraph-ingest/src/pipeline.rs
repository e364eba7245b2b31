//! One analysis-and-persist pass per tenant, run as a background task.
//!
//! The pass clears the tenant's stored graph, persists nodes, then
//! relationships, then looks up tracked variables. Progress is published
//! on a `watch` channel so callers can poll it while the task runs.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use irgraph_core::config::Settings;
use irgraph_core::program::ProgramGraph;
use irgraph_core::relations;
use irgraph_core::status::{AnalysisStatus, PassReport};
use irgraph_core::TenantId;
use irgraph_graph::{GraphPersister, GraphStore, QueryGateway};

use crate::error::{IngestError, Result};

/// Handle to a running pass.
pub struct AnalysisJob {
    tenant: TenantId,
    status: watch::Receiver<AnalysisStatus>,
    handle: JoinHandle<Result<PassReport>>,
}

impl AnalysisJob {
    /// Start a pass for `tenant` on the tokio runtime.
    pub fn spawn<S>(store: S, settings: &Settings, tenant: TenantId, graph: ProgramGraph) -> Self
    where
        S: GraphStore + Clone + 'static,
    {
        let (tx, rx) = watch::channel(AnalysisStatus::Created);
        let settings = settings.clone();
        let task_tenant = tenant.clone();

        let handle = tokio::spawn(async move {
            let result = run_pass(store, &settings, &task_tenant, &graph, &tx).await;
            if let Err(e) = &result {
                let stage = tx.borrow().stage_name().to_string();
                tracing::error!(tenant = %task_tenant, stage = %stage, error = %e, "Analysis pass failed");
                tx.send_replace(AnalysisStatus::Failed {
                    stage,
                    message: e.to_string(),
                });
            }
            result
        });

        Self {
            tenant,
            status: rx,
            handle,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Current stage of the pass.
    pub fn status(&self) -> AnalysisStatus {
        self.status.borrow().clone()
    }

    /// A receiver notified on every stage change.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisStatus> {
        self.status.clone()
    }

    /// Wait for the pass to finish.
    pub async fn wait(self) -> Result<PassReport> {
        self.handle
            .await
            .map_err(|e| IngestError::JobAborted(e.to_string()))?
    }
}

/// Run one pass to completion, publishing each stage on `status`.
///
/// A failure leaves `status` at the stage that failed. Chunks committed
/// before the failure stay in the store.
pub async fn run_pass<S>(
    store: S,
    settings: &Settings,
    tenant: &TenantId,
    graph: &ProgramGraph,
    status: &watch::Sender<AnalysisStatus>,
) -> Result<PassReport>
where
    S: GraphStore + Clone,
{
    let started_at = chrono::Utc::now();

    status.send_replace(AnalysisStatus::Clearing);
    let nodes_cleared = store.clear_tenant(tenant).await?;

    let persister = GraphPersister::new(store.clone(), &settings.persist);

    status.send_replace(AnalysisStatus::PersistingNodes);
    let prepared = persister.prepare_nodes(graph, tenant);
    persister.write_nodes(&prepared.rows, tenant).await?;

    status.send_replace(AnalysisStatus::PersistingEdges);
    let collected = relations::collect_relationships(graph, &prepared.id_map);
    let edges_persisted = persister.persist_edges(&collected.records, tenant).await?;

    let gateway = QueryGateway::new(store, &settings.query);
    let tracked_variables = match gateway.tracked_variables(tenant).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(tenant = %tenant, error = %e, "Tracked variable lookup failed");
            Vec::new()
        }
    };

    let report = PassReport {
        tenant_id: tenant.clone(),
        nodes_cleared,
        nodes_persisted: prepared.rows.len(),
        nodes_filtered: prepared.filtered,
        edges_persisted,
        edges_dropped: collected.unresolved
            + collected.filtered
            + (collected.records.len() - edges_persisted),
        tracked_variables,
        started_at,
        finished_at: chrono::Utc::now(),
    };

    tracing::info!(
        tenant = %tenant,
        nodes = report.nodes_persisted,
        edges = report.edges_persisted,
        tracked = report.tracked_variables.len(),
        duration_ms = report.duration_ms(),
        "Analysis pass complete"
    );
    status.send_replace(AnalysisStatus::Completed);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use irgraph_core::program::{NodeKind, ProgramEdge, ProgramNode, RelationshipValue};
    use irgraph_core::NodeSlot;
    use irgraph_graph::mock::{MockGraphStore, StoreCall};
    use irgraph_graph::project::{RawNode, RawValue};

    fn small_graph() -> ProgramGraph {
        ProgramGraph::new(vec![
            ProgramNode::new(1, NodeKind::FunctionDeclaration)
                .with_property("name", "_ZN3app4main17h0123456789abcdefE")
                .with_relationship("BODY", RelationshipValue::Single(NodeSlot(1)))
                .with_relationship("LANGUAGE", RelationshipValue::Single(NodeSlot(3))),
            ProgramNode::new(2, NodeKind::Block).with_relationship(
                "STATEMENTS",
                RelationshipValue::Edges(vec![ProgramEdge {
                    target: NodeSlot(2),
                    properties: BTreeMap::new(),
                }]),
            ),
            ProgramNode::new(3, NodeKind::ReturnStatement),
            ProgramNode::new(4, NodeKind::Language),
            ProgramNode::new(5, NodeKind::UnknownType),
        ])
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.persist.node_chunk_size = 2;
        settings
    }

    #[tokio::test]
    async fn pass_clears_then_persists() {
        let store = MockGraphStore::new();
        let tenant = TenantId::from("t1");

        let job = AnalysisJob::spawn(store.clone(), &settings(), tenant.clone(), small_graph());
        let report = job.wait().await.unwrap();

        assert_eq!(report.nodes_persisted, 4);
        assert_eq!(report.nodes_filtered, 1);
        assert_eq!(report.edges_persisted, 2);
        assert_eq!(report.edges_dropped, 1);
        assert!(report.finished_at >= report.started_at);

        let calls = store.calls().await;
        assert_eq!(calls[0], StoreCall::ClearTenant(tenant));
        assert_eq!(
            &calls[1..],
            &[
                StoreCall::CreateNodes(2),
                StoreCall::CreateNodes(2),
                StoreCall::EnsureIdIndex,
                StoreCall::CreateRelationships(2),
                StoreCall::Read,
            ]
        );
    }

    #[tokio::test]
    async fn status_ends_completed() {
        let job = AnalysisJob::spawn(
            MockGraphStore::new(),
            &settings(),
            TenantId::from("t1"),
            small_graph(),
        );
        let mut status = job.subscribe();
        job.wait().await.unwrap();

        assert_eq!(*status.borrow_and_update(), AnalysisStatus::Completed);
    }

    #[tokio::test]
    async fn failed_chunk_marks_stage() {
        let store = MockGraphStore::new();
        store.fail_node_batch(1).await;

        let job = AnalysisJob::spawn(store.clone(), &settings(), TenantId::from("t1"), small_graph());
        let status = job.subscribe();
        let err = job.wait().await.unwrap_err();

        assert!(matches!(err, IngestError::Persist(_)));
        match &*status.borrow() {
            AnalysisStatus::Failed { stage, message } => {
                assert_eq!(stage, "PERSISTING_NODES");
                assert!(message.contains("chunk 1"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        // the first chunk stays committed
        assert_eq!(store.nodes().await.len(), 2);
    }

    #[tokio::test]
    async fn rerun_replaces_previous_graph() {
        let store = MockGraphStore::new();
        let tenant = TenantId::from("t1");

        AnalysisJob::spawn(store.clone(), &settings(), tenant.clone(), small_graph())
            .wait()
            .await
            .unwrap();
        let report = AnalysisJob::spawn(store.clone(), &settings(), tenant, small_graph())
            .wait()
            .await
            .unwrap();

        assert_eq!(report.nodes_cleared, 4);
        assert_eq!(store.nodes().await.len(), 4);
    }

    #[tokio::test]
    async fn tracked_variables_land_in_report() {
        let store = MockGraphStore::new();
        store
            .push_read_result(vec![vec![RawValue::Node(RawNode {
                id: 7,
                labels: vec!["VariableDeclaration".to_string(), "TrackedVariable".to_string()],
                properties: BTreeMap::from([(
                    "name".to_string(),
                    RawValue::Scalar("total".to_string()),
                )]),
            })]])
            .await;

        let report = AnalysisJob::spawn(store, &settings(), TenantId::from("t1"), small_graph())
            .wait()
            .await
            .unwrap();
        assert_eq!(report.tracked_variables, vec!["total".to_string()]);
    }

    #[tokio::test]
    async fn tracked_lookup_failure_is_not_fatal() {
        let store = MockGraphStore::new();
        store.fail_reads("connection reset").await;

        let job = AnalysisJob::spawn(store, &settings(), TenantId::from("t1"), small_graph());
        let status = job.subscribe();
        let report = job.wait().await.unwrap();

        assert!(report.tracked_variables.is_empty());
        assert_eq!(*status.borrow(), AnalysisStatus::Completed);
    }
}
