//! Persistence of a program graph into the shared store.
//!
//! A pass assigns a fresh identity to every persisted node, rewrites its
//! names to their demangled form, attaches heuristic tags and the tenant,
//! and writes nodes and then relationships in fixed-size chunks. Each chunk
//! commits on its own: when a chunk fails, earlier chunks stay in the store.

use std::time::Instant;

use irgraph_core::config::PersistSettings;
use irgraph_core::program::{NodeKind, ProgramGraph, ProgramNode};
use irgraph_core::relations::{self, FILTERED_EDGES};
use irgraph_core::{demangle, IdMap, NodeSlot, RelationshipRecord, Tag, TenantId};

use crate::client::GraphError;
use crate::store::{GraphStore, NodeRow};

/// Node kinds never written to the store.
pub const FILTERED_NODES: &[NodeKind] = &[NodeKind::UnknownType];

/// Functions whose demangled name starts with one of these are runtime or
/// standard-library code and are not scanned for tracked variables.
pub const UNTRACKED_FUNCTION_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "proc_macro::",
    "std_detect::",
    "test::",
    "__rust",
    "__CxxFrame",
    "llvm.",
    "literal_",
];

/// Callee name of the debug-declare intrinsic.
pub const DBG_DECLARE: &str = "llvm.dbg.declare";

const MAIN_SUFFIX: &str = "::main";

/// Terminal failure of a persistence pass.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Failed to ensure node id index: {0}")]
    Index(#[source] GraphError),

    #[error("Node chunk {chunk} failed after {committed} committed chunks: {source}")]
    NodeChunk {
        chunk: usize,
        committed: usize,
        #[source]
        source: GraphError,
    },

    #[error("Relationship chunk {chunk} failed after {committed} committed chunks: {source}")]
    EdgeChunk {
        chunk: usize,
        committed: usize,
        #[source]
        source: GraphError,
    },
}

/// Output of [`GraphPersister::prepare_nodes`].
#[derive(Debug, Clone, Default)]
pub struct PreparedNodes {
    pub id_map: IdMap,
    /// One row per persisted node, in slot order.
    pub rows: Vec<NodeRow>,
    /// Nodes skipped because their kind is filtered.
    pub filtered: usize,
    /// Tags attached to persisted nodes.
    pub tags: Vec<(NodeSlot, Tag)>,
}

/// Counts from a full [`GraphPersister::persist_graph`] pass.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub id_map: IdMap,
    pub nodes_persisted: usize,
    pub nodes_filtered: usize,
    pub edges_persisted: usize,
    /// Relationships dropped as filtered or with an unpersisted endpoint.
    pub edges_dropped: usize,
    pub tags: Vec<(NodeSlot, Tag)>,
}

pub struct GraphPersister<S> {
    store: S,
    node_chunk_size: usize,
    edge_chunk_size: usize,
}

impl<S: GraphStore> GraphPersister<S> {
    pub fn new(store: S, settings: &PersistSettings) -> Self {
        Self {
            store,
            node_chunk_size: settings.node_chunk_size.max(1),
            edge_chunk_size: settings.edge_chunk_size.max(1),
        }
    }

    /// Build the identity map and store rows for every non-filtered node.
    ///
    /// Pure: nothing is written.
    pub fn prepare_nodes(&self, graph: &ProgramGraph, tenant: &TenantId) -> PreparedNodes {
        let pending = compute_tags(graph);
        let mut prepared = PreparedNodes {
            id_map: IdMap::with_slots(graph.len()),
            ..Default::default()
        };

        for (slot, node) in graph.slots() {
            if FILTERED_NODES.contains(&node.kind) {
                prepared.filtered += 1;
                continue;
            }

            let id = prepared.id_map.assign(slot);
            let name = display_name(graph, node);

            let mut properties = node.properties.clone();
            properties.insert("id".to_string(), id.to_string().into());
            properties.insert("name".to_string(), name.clone().into());
            properties.insert("fullName".to_string(), name.clone().into());
            properties.insert("localName".to_string(), name.into());
            properties.insert("projectId".to_string(), tenant.as_str().into());

            let mut labels: Vec<String> = node.labels().iter().map(|l| l.to_string()).collect();
            if let Some(tag) = pending[slot.0] {
                labels.push(tag.label().to_string());
                prepared.tags.push((slot, tag));
            }

            prepared.rows.push(NodeRow { labels, properties });
        }
        prepared
    }

    /// Persist every non-filtered node of `graph` and return their identities.
    pub async fn persist_nodes(
        &self,
        graph: &ProgramGraph,
        tenant: &TenantId,
    ) -> Result<IdMap, PersistError> {
        let prepared = self.prepare_nodes(graph, tenant);
        self.write_nodes(&prepared.rows, tenant).await?;
        Ok(prepared.id_map)
    }

    /// Persist relationship records, dropping filtered types. Returns how
    /// many records were written.
    pub async fn persist_edges(
        &self,
        records: &[RelationshipRecord],
        tenant: &TenantId,
    ) -> Result<usize, PersistError> {
        let kept: Vec<RelationshipRecord> = records
            .iter()
            .filter(|r| !FILTERED_EDGES.contains(&r.rel_type.as_str()))
            .cloned()
            .collect();

        self.store
            .ensure_id_index()
            .await
            .map_err(PersistError::Index)?;

        for (chunk, batch) in kept.chunks(self.edge_chunk_size).enumerate() {
            let start = Instant::now();
            self.store
                .create_relationships(tenant, batch)
                .await
                .map_err(|source| {
                    tracing::error!(tenant = %tenant, chunk, error = %source, "Relationship chunk failed");
                    PersistError::EdgeChunk {
                        chunk,
                        committed: chunk,
                        source,
                    }
                })?;
            tracing::debug!(
                tenant = %tenant,
                chunk,
                size = batch.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Persisted relationship chunk"
            );
        }
        Ok(kept.len())
    }

    /// Persist nodes, collect their relationships, and persist those.
    pub async fn persist_graph(
        &self,
        graph: &ProgramGraph,
        tenant: &TenantId,
    ) -> Result<PassSummary, PersistError> {
        let start = Instant::now();
        let prepared = self.prepare_nodes(graph, tenant);
        tracing::info!(
            tenant = %tenant,
            nodes = prepared.rows.len(),
            filtered = prepared.filtered,
            tagged = prepared.tags.len(),
            "Persisting nodes"
        );
        self.write_nodes(&prepared.rows, tenant).await?;

        let collected = relations::collect_relationships(graph, &prepared.id_map);
        tracing::info!(
            tenant = %tenant,
            relationships = collected.records.len(),
            "Persisting relationships"
        );
        let edges_persisted = self.persist_edges(&collected.records, tenant).await?;

        tracing::info!(
            tenant = %tenant,
            nodes = prepared.rows.len(),
            edges = edges_persisted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Persisted program graph"
        );

        Ok(PassSummary {
            nodes_persisted: prepared.rows.len(),
            nodes_filtered: prepared.filtered,
            edges_persisted,
            edges_dropped: collected.unresolved
                + collected.filtered
                + (collected.records.len() - edges_persisted),
            tags: prepared.tags,
            id_map: prepared.id_map,
        })
    }

    /// Write prepared rows chunk by chunk.
    pub async fn write_nodes(&self, rows: &[NodeRow], tenant: &TenantId) -> Result<(), PersistError> {
        for (chunk, batch) in rows.chunks(self.node_chunk_size).enumerate() {
            let start = Instant::now();
            self.store.create_nodes(batch).await.map_err(|source| {
                tracing::error!(tenant = %tenant, chunk, error = %source, "Node chunk failed");
                PersistError::NodeChunk {
                    chunk,
                    committed: chunk,
                    source,
                }
            })?;
            tracing::debug!(
                tenant = %tenant,
                chunk,
                size = batch.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Persisted node chunk"
            );
        }
        Ok(())
    }
}

/// Demangled name stored for `node`.
///
/// Scopes carry no name of their own and take the one of the node they scope.
fn display_name(graph: &ProgramGraph, node: &ProgramNode) -> String {
    if node.kind.is_scope() && node.name().is_none() {
        let scoped = node
            .targets("AST_NODE")
            .first()
            .and_then(|slot| graph.node(*slot))
            .and_then(ProgramNode::local_name);
        if let Some(name) = scoped {
            return demangle(name);
        }
    }
    demangle(node.name().unwrap_or_default())
}

/// Find the tag of every node up front, so a tag is applied no matter
/// whether the tagged node comes before or after its function.
///
/// A node keeps the first tag it is given.
fn compute_tags(graph: &ProgramGraph) -> Vec<Option<Tag>> {
    let mut tags: Vec<Option<Tag>> = vec![None; graph.len()];

    for (slot, node) in graph.slots() {
        if !node.kind.is_function_like() {
            continue;
        }
        let name = demangle(node.name().unwrap_or_default());

        if name.ends_with(MAIN_SUFFIX) {
            tags[slot.0].get_or_insert(Tag::MainFunctionDeclaration);
        }

        if UNTRACKED_FUNCTION_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            continue;
        }

        for block in graph.blocks_of(slot) {
            for variable in tracked_in_block(graph, block) {
                tags[variable.0].get_or_insert(Tag::TrackedVariable);
            }
        }
    }
    tags
}

/// Variable declarations in `block` named by a debug-declare call in the same block.
///
/// Only nodes whose nearest enclosing block is `block` take part, so a call
/// never matches a declaration of a sibling or nested block.
fn tracked_in_block(graph: &ProgramGraph, block: NodeSlot) -> Vec<NodeSlot> {
    let members = graph.block_members(block);
    let mut tracked = Vec::new();

    for slot in &members {
        let Some(call) = graph.node(*slot) else {
            continue;
        };
        if call.kind != NodeKind::CallExpression || call.name() != Some(DBG_DECLARE) {
            continue;
        }

        // First argument text looks like `metadata ptr %x`.
        let Some(register) = call
            .targets("ARGUMENTS")
            .first()
            .and_then(|arg| graph.node(*arg))
            .and_then(ProgramNode::code)
            .and_then(|code| code.rsplit('%').next())
        else {
            continue;
        };

        let declaration = members.iter().copied().find(|candidate| {
            graph.node(*candidate).is_some_and(|n| {
                n.kind == NodeKind::VariableDeclaration && n.local_name() == Some(register)
            })
        });
        if let Some(declaration) = declaration {
            tracked.push(declaration);
        }
    }
    tracked
}
