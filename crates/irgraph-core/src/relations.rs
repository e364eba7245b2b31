//! Linearization of program-graph relationships into store records.

use std::collections::BTreeMap;

use crate::program::{ProgramGraph, RelationshipValue};
use crate::types::{IdMap, NodeSlot, RelationshipRecord};

/// Relationship types never written to the store.
pub const FILTERED_EDGES: &[&str] = &["LANGUAGE"];

/// Outcome of relationship collection.
#[derive(Debug, Clone, Default)]
pub struct CollectedRelationships {
    pub records: Vec<RelationshipRecord>,
    /// Edges dropped because an endpoint has no persisted identity.
    pub unresolved: usize,
    /// Edges dropped because their type is filtered.
    pub filtered: usize,
}

/// Walk every node's declared relationships and emit one record per edge.
///
/// Only relationships declared in the node kind's schema are visited, in
/// schema order. Records whose endpoints are missing from `id_map` are
/// skipped, so every returned record references persisted identities only.
pub fn collect_relationships(graph: &ProgramGraph, id_map: &IdMap) -> CollectedRelationships {
    let mut out = CollectedRelationships::default();

    for (slot, node) in graph.slots() {
        for spec in node.kind.schema() {
            let Some(value) = node.relationships.get(spec.name) else {
                continue;
            };
            if FILTERED_EDGES.contains(&spec.name) {
                out.filtered += value.targets().len();
                continue;
            }

            match value {
                RelationshipValue::Edges(edges) => {
                    for edge in edges {
                        push_record(&mut out, id_map, slot, edge.target, spec.name, &edge.properties);
                    }
                }
                RelationshipValue::Nodes(targets) => {
                    for target in targets {
                        push_record(&mut out, id_map, slot, *target, spec.name, &BTreeMap::new());
                    }
                }
                RelationshipValue::Single(target) => {
                    push_record(&mut out, id_map, slot, *target, spec.name, &BTreeMap::new());
                }
            }
        }
    }

    if out.unresolved > 0 {
        tracing::debug!(
            unresolved = out.unresolved,
            "Skipped relationships with unpersisted endpoints"
        );
    }
    out
}

fn push_record(
    out: &mut CollectedRelationships,
    id_map: &IdMap,
    start: NodeSlot,
    end: NodeSlot,
    rel_type: &str,
    properties: &BTreeMap<String, serde_json::Value>,
) {
    match (id_map.get(start), id_map.get(end)) {
        (Some(start_id), Some(end_id)) => out.records.push(RelationshipRecord {
            start_id,
            end_id,
            rel_type: rel_type.to_string(),
            properties: properties.clone(),
        }),
        _ => out.unresolved += 1,
    }
}
