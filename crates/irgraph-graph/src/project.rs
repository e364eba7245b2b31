//! Projection of arbitrary query results into a flat node/edge model.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use irgraph_core::program::NODE_LABEL;

// ── Raw result values ─────────────────────────────────────────────

/// A value from a result row, independent of the driver's wire types.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Node(RawNode),
    Relationship(RawRelationship),
    Path(RawPath),
    List(Vec<RawValue>),
    Scalar(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    /// Store-assigned row identity.
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, RawValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRelationship {
    pub id: i64,
    pub start: i64,
    pub end: i64,
    pub rel_type: String,
    pub properties: BTreeMap<String, RawValue>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPath {
    pub nodes: Vec<RawNode>,
    pub relationships: Vec<RawRelationship>,
}

impl RawValue {
    /// Flat string rendering used for property titles.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::Null => String::new(),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_display_string).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Node(n) => format!("node({})", n.id),
            Self::Relationship(r) => format!("relationship({})", r.id),
            Self::Path(p) => format!("path({} nodes)", p.nodes.len()),
        }
    }
}

// ── Projected model ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericNode {
    pub id: String,
    pub label: String,
    pub labels: Vec<String>,
    pub title: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenericEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: String,
    pub title: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphData {
    pub nodes: Vec<GenericNode>,
    pub edges: Vec<GenericEdge>,
}

// ── Projector ─────────────────────────────────────────────────────

/// Accumulates nodes and edges, keeping each store identity at most once.
#[derive(Debug, Default)]
pub struct ResultProjector {
    data: GraphData,
    seen_nodes: HashSet<i64>,
    seen_edges: HashSet<i64>,
}

impl ResultProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visit one value, descending into paths and lists. Scalars are ignored.
    pub fn visit(&mut self, value: &RawValue) {
        match value {
            RawValue::Node(node) => self.add_node(node),
            RawValue::Relationship(rel) => self.add_edge(rel),
            RawValue::Path(path) => {
                for node in &path.nodes {
                    self.add_node(node);
                }
                for rel in &path.relationships {
                    self.add_edge(rel);
                }
            }
            RawValue::List(items) => {
                for item in items {
                    self.visit(item);
                }
            }
            RawValue::Scalar(_) | RawValue::Null => {}
        }
    }

    pub fn finish(self) -> GraphData {
        self.data
    }

    fn add_node(&mut self, node: &RawNode) {
        if !self.seen_nodes.insert(node.id) {
            return;
        }
        self.data.nodes.push(GenericNode {
            id: node.id.to_string(),
            label: primary_label(&node.labels),
            labels: node.labels.clone(),
            title: titles(&node.properties),
        });
    }

    fn add_edge(&mut self, rel: &RawRelationship) {
        if !self.seen_edges.insert(rel.id) {
            return;
        }
        self.data.edges.push(GenericEdge {
            id: rel.id.to_string(),
            from: rel.start.to_string(),
            to: rel.end.to_string(),
            label: rel.rel_type.clone(),
            title: titles(&rel.properties),
        });
    }
}

/// Flatten every value of every row into a deduplicated [`GraphData`].
pub fn project(rows: &[Vec<RawValue>]) -> GraphData {
    let mut projector = ResultProjector::new();
    for value in rows.iter().flatten() {
        projector.visit(value);
    }
    projector.finish()
}

/// Most specific label: the first one that is not the generic supertype.
fn primary_label(labels: &[String]) -> String {
    labels
        .iter()
        .find(|l| l.as_str() != NODE_LABEL)
        .or_else(|| labels.first())
        .cloned()
        .unwrap_or_else(|| NODE_LABEL.to_string())
}

fn titles(properties: &BTreeMap<String, RawValue>) -> BTreeMap<String, String> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), v.to_display_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, labels: &[&str], name: &str) -> RawNode {
        RawNode {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: BTreeMap::from([("name".to_string(), RawValue::Scalar(name.to_string()))]),
        }
    }

    fn rel(id: i64, start: i64, end: i64) -> RawRelationship {
        RawRelationship {
            id,
            start,
            end,
            rel_type: "EOG".to_string(),
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn overlapping_paths_yield_each_node_once() {
        let shared = node(2, &["Node", "Block"], "shared");
        let first = RawPath {
            nodes: vec![node(1, &["FunctionDeclaration", "Node"], "f"), shared.clone()],
            relationships: vec![rel(10, 1, 2)],
        };
        let second = RawPath {
            nodes: vec![shared, node(3, &["Literal", "Node"], "lit")],
            relationships: vec![rel(11, 2, 3)],
        };

        let data = project(&[vec![RawValue::Path(first)], vec![RawValue::Path(second)]]);

        let ids: Vec<&str> = data.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(data.nodes.iter().filter(|n| n.id == "2").count(), 1);
        assert_eq!(data.edges.len(), 2);
    }

    #[test]
    fn duplicate_relationships_are_dropped() {
        let data = project(&[
            vec![RawValue::Relationship(rel(5, 1, 2))],
            vec![RawValue::List(vec![RawValue::Relationship(rel(5, 1, 2))])],
        ]);
        assert_eq!(data.edges.len(), 1);
        assert_eq!(data.edges[0].from, "1");
        assert_eq!(data.edges[0].to, "2");
        assert_eq!(data.edges[0].label, "EOG");
    }

    #[test]
    fn primary_label_skips_generic_supertype() {
        let data = project(&[vec![
            RawValue::Node(node(1, &["Node", "VariableDeclaration"], "x")),
            RawValue::Node(node(2, &["Node"], "y")),
            RawValue::Node(node(3, &[], "z")),
        ]]);
        let labels: Vec<&str> = data.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["VariableDeclaration", "Node", "Node"]);
    }

    #[test]
    fn nested_lists_are_flattened_and_scalars_ignored() {
        let data = project(&[vec![
            RawValue::Scalar("42".to_string()),
            RawValue::List(vec![
                RawValue::List(vec![RawValue::Node(node(7, &["Literal"], "seven"))]),
                RawValue::Null,
            ]),
        ]]);
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].title.get("name").map(String::as_str), Some("seven"));
    }

    #[test]
    fn properties_are_coerced_to_strings() {
        let mut n = node(1, &["Literal"], "lit");
        n.properties.insert(
            "values".to_string(),
            RawValue::List(vec![
                RawValue::Scalar("1".to_string()),
                RawValue::Scalar("2".to_string()),
            ]),
        );
        n.properties.insert("missing".to_string(), RawValue::Null);

        let data = project(&[vec![RawValue::Node(n)]]);
        let title = &data.nodes[0].title;
        assert_eq!(title["values"], "[1, 2]");
        assert_eq!(title["missing"], "");
    }

    #[test]
    fn serializes_wire_shape() {
        let data = project(&[vec![RawValue::Relationship(rel(9, 1, 2))]]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["edges"][0]["from"], "1");
        assert_eq!(json["edges"][0]["to"], "2");
        assert_eq!(json["nodes"], serde_json::json!([]));
    }
}
