//! Conversion from Bolt wire values to the engine-neutral [`RawValue`] model.

use std::collections::BTreeMap;

use neo4rs::{BoltList, BoltMap, BoltNode, BoltPath, BoltRelation, BoltType, BoltUnboundedRelation};

use crate::client::GraphError;
use crate::project::{RawNode, RawPath, RawRelationship, RawValue};

/// Convert every column of a result row, ordered by column name.
///
/// A row does not expose its column order, so columns are sorted to keep
/// the projection deterministic.
pub fn row_values(row: &neo4rs::Row) -> Result<Vec<RawValue>, GraphError> {
    let columns: BTreeMap<String, BoltType> = row
        .to_strict()
        .map_err(|e| GraphError::Conversion(format!("row: {e}")))?;
    columns.values().map(to_raw).collect()
}

pub fn to_raw(value: &BoltType) -> Result<RawValue, GraphError> {
    Ok(match value {
        BoltType::Node(node) => RawValue::Node(node_to_raw(node)?),
        BoltType::Relation(rel) => RawValue::Relationship(relation_to_raw(rel)?),
        BoltType::Path(path) => RawValue::Path(path_to_raw(path)?),
        BoltType::List(list) => RawValue::List(
            list.value
                .iter()
                .map(to_raw)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        BoltType::Null(_) => RawValue::Null,
        other => RawValue::Scalar(bolt_to_string(other)),
    })
}

/// Plain text rendering of a scalar (or nested) Bolt value.
pub fn bolt_to_string(value: &BoltType) -> String {
    match value {
        BoltType::String(s) => s.value.clone(),
        BoltType::Integer(i) => i.value.to_string(),
        BoltType::Float(f) => f.value.to_string(),
        BoltType::Boolean(b) => b.value.to_string(),
        BoltType::Null(_) => String::new(),
        BoltType::List(list) => {
            let items: Vec<String> = list.value.iter().map(bolt_to_string).collect();
            format!("[{}]", items.join(", "))
        }
        BoltType::Map(map) => {
            let sorted: BTreeMap<&str, String> = map
                .value
                .iter()
                .map(|(k, v)| (k.value.as_str(), bolt_to_string(v)))
                .collect();
            let items: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            format!("{{{}}}", items.join(", "))
        }
        other => format!("{other:?}"),
    }
}

fn properties(map: &BoltMap) -> Result<BTreeMap<String, RawValue>, GraphError> {
    map.value
        .iter()
        .map(|(k, v)| Ok((k.value.clone(), to_raw(v)?)))
        .collect()
}

fn labels(list: &BoltList) -> Vec<String> {
    list.value
        .iter()
        .filter_map(|l| match l {
            BoltType::String(s) => Some(s.value.clone()),
            _ => None,
        })
        .collect()
}

fn node_to_raw(node: &BoltNode) -> Result<RawNode, GraphError> {
    Ok(RawNode {
        id: node.id.value,
        labels: labels(&node.labels),
        properties: properties(&node.properties)?,
    })
}

fn relation_to_raw(rel: &BoltRelation) -> Result<RawRelationship, GraphError> {
    Ok(RawRelationship {
        id: rel.id.value,
        start: rel.start_node_id.value,
        end: rel.end_node_id.value,
        rel_type: rel.typ.value.clone(),
        properties: properties(&rel.properties)?,
    })
}

/// Rebuild a path's relationships with their endpoints.
///
/// `indices` alternates a 1-based signed relationship index and a node
/// index. A negative relationship index means the hop traverses the
/// relationship against its direction.
fn path_to_raw(path: &BoltPath) -> Result<RawPath, GraphError> {
    let nodes = path
        .nodes
        .value
        .iter()
        .map(|n| match n {
            BoltType::Node(node) => node_to_raw(node),
            other => Err(GraphError::Conversion(format!("path node: {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rels: Vec<&BoltUnboundedRelation> = path
        .rels
        .value
        .iter()
        .map(|r| match r {
            BoltType::UnboundedRelation(rel) => Ok(rel),
            other => Err(GraphError::Conversion(format!("path relationship: {other:?}"))),
        })
        .collect::<Result<_, _>>()?;

    let indices: Vec<i64> = path
        .indices
        .value
        .iter()
        .map(|i| match i {
            BoltType::Integer(i) => Ok(i.value),
            other => Err(GraphError::Conversion(format!("path index: {other:?}"))),
        })
        .collect::<Result<_, _>>()?;

    let Some(first) = nodes.first() else {
        return Ok(RawPath::default());
    };

    let mut relationships = Vec::with_capacity(indices.len() / 2);
    let mut previous = first.id;
    for hop in indices.chunks_exact(2) {
        let (rel_index, node_index) = (hop[0], hop[1]);
        let rel = (rel_index.unsigned_abs() as usize)
            .checked_sub(1)
            .and_then(|i| rels.get(i))
            .ok_or_else(|| GraphError::Conversion(format!("path rel index {rel_index}")))?;
        let next = usize::try_from(node_index)
            .ok()
            .and_then(|i| nodes.get(i))
            .ok_or_else(|| GraphError::Conversion(format!("path node index {node_index}")))?;

        let (start, end) = if rel_index > 0 {
            (previous, next.id)
        } else {
            (next.id, previous)
        };
        relationships.push(RawRelationship {
            id: rel.id.value,
            start,
            end,
            rel_type: rel.typ.value.clone(),
            properties: properties(&rel.properties)?,
        });
        previous = next.id;
    }

    Ok(RawPath {
        nodes,
        relationships,
    })
}
