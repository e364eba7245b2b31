//! In-memory program graph handed over by the analysis frontend.
//!
//! Nodes live in a flat arena and reference each other by [`NodeSlot`].
//! Every [`NodeKind`] declares the relationships it may carry through a
//! static schema, so outbound edges are enumerated without inspecting the
//! node at runtime.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IrGraphError, Result};
use crate::types::NodeSlot;

// ── Relationship schema ───────────────────────────────────────────

/// How many targets a relationship holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one target node.
    Single,
    /// A list of target nodes without edge properties.
    Nodes,
    /// A list of typed edges, each with its own properties.
    Edges,
}

/// One outbound relationship a node kind may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipSpec {
    pub name: &'static str,
    pub arity: Arity,
    /// Whether the relationship is syntactic containment (parent to child).
    pub ast: bool,
}

impl RelationshipSpec {
    const fn single(name: &'static str) -> Self {
        Self { name, arity: Arity::Single, ast: false }
    }

    const fn nodes(name: &'static str) -> Self {
        Self { name, arity: Arity::Nodes, ast: false }
    }

    const fn edges(name: &'static str) -> Self {
        Self { name, arity: Arity::Edges, ast: false }
    }

    const fn ast(self) -> Self {
        Self { ast: true, ..self }
    }
}

const LANGUAGE: RelationshipSpec = RelationshipSpec::single("LANGUAGE");
const SCOPE: RelationshipSpec = RelationshipSpec::single("SCOPE");
const TYPE: RelationshipSpec = RelationshipSpec::single("TYPE");
const EOG: RelationshipSpec = RelationshipSpec::edges("EOG");
const DFG: RelationshipSpec = RelationshipSpec::edges("DFG");

const TRANSLATION_UNIT: &[RelationshipSpec] =
    &[RelationshipSpec::edges("DECLARATIONS").ast(), LANGUAGE];
const FUNCTION: &[RelationshipSpec] = &[
    RelationshipSpec::edges("PARAMETERS").ast(),
    RelationshipSpec::single("BODY").ast(),
    RelationshipSpec::nodes("RETURN_TYPES"),
    SCOPE,
    LANGUAGE,
    EOG,
];
const VARIABLE: &[RelationshipSpec] = &[
    RelationshipSpec::single("INITIALIZER").ast(),
    TYPE,
    SCOPE,
    LANGUAGE,
    EOG,
    DFG,
];
const PARAMETER: &[RelationshipSpec] = &[TYPE, SCOPE, LANGUAGE, DFG];
const BLOCK: &[RelationshipSpec] = &[
    RelationshipSpec::edges("STATEMENTS").ast(),
    SCOPE,
    LANGUAGE,
    EOG,
];
const DECLARATION_STATEMENT: &[RelationshipSpec] = &[
    RelationshipSpec::edges("DECLARATIONS").ast(),
    LANGUAGE,
    EOG,
];
const RETURN_STATEMENT: &[RelationshipSpec] = &[
    RelationshipSpec::edges("RETURN_VALUES").ast(),
    LANGUAGE,
    EOG,
];
const CALL: &[RelationshipSpec] = &[
    RelationshipSpec::single("CALLEE").ast(),
    RelationshipSpec::edges("ARGUMENTS").ast(),
    RelationshipSpec::nodes("INVOKES"),
    TYPE,
    LANGUAGE,
    EOG,
    DFG,
];
const REFERENCE: &[RelationshipSpec] = &[
    RelationshipSpec::single("REFERS_TO"),
    TYPE,
    LANGUAGE,
    EOG,
    DFG,
];
const LITERAL: &[RelationshipSpec] = &[TYPE, LANGUAGE, EOG, DFG];
const BINARY: &[RelationshipSpec] = &[
    RelationshipSpec::single("LHS").ast(),
    RelationshipSpec::single("RHS").ast(),
    TYPE,
    LANGUAGE,
    EOG,
    DFG,
];
const UNARY: &[RelationshipSpec] = &[
    RelationshipSpec::single("INPUT").ast(),
    TYPE,
    LANGUAGE,
    EOG,
    DFG,
];
const ASSIGN: &[RelationshipSpec] = &[
    RelationshipSpec::edges("LHS").ast(),
    RelationshipSpec::edges("RHS").ast(),
    LANGUAGE,
    EOG,
    DFG,
];
const SCOPE_NODE: &[RelationshipSpec] = &[
    RelationshipSpec::single("AST_NODE"),
    RelationshipSpec::single("PARENT"),
];
const OBJECT_TYPE: &[RelationshipSpec] = &[RelationshipSpec::nodes("SUPER_TYPES"), LANGUAGE];
const POINTER_TYPE: &[RelationshipSpec] = &[RelationshipSpec::single("ELEMENT_TYPE"), LANGUAGE];
const NONE: &[RelationshipSpec] = &[];

// ── Node kinds ────────────────────────────────────────────────────

/// The closed set of program-graph node variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    TranslationUnitDeclaration,
    FunctionDeclaration,
    MethodDeclaration,
    VariableDeclaration,
    ParameterDeclaration,
    Block,
    DeclarationStatement,
    ReturnStatement,
    CallExpression,
    Reference,
    Literal,
    BinaryOperator,
    UnaryOperator,
    AssignExpression,
    FunctionScope,
    BlockScope,
    ObjectType,
    PointerType,
    UnknownType,
    Language,
}

impl NodeKind {
    /// Relationships this kind may carry, in enumeration order.
    pub fn schema(&self) -> &'static [RelationshipSpec] {
        match self {
            Self::TranslationUnitDeclaration => TRANSLATION_UNIT,
            Self::FunctionDeclaration | Self::MethodDeclaration => FUNCTION,
            Self::VariableDeclaration => VARIABLE,
            Self::ParameterDeclaration => PARAMETER,
            Self::Block => BLOCK,
            Self::DeclarationStatement => DECLARATION_STATEMENT,
            Self::ReturnStatement => RETURN_STATEMENT,
            Self::CallExpression => CALL,
            Self::Reference => REFERENCE,
            Self::Literal => LITERAL,
            Self::BinaryOperator => BINARY,
            Self::UnaryOperator => UNARY,
            Self::AssignExpression => ASSIGN,
            Self::FunctionScope | Self::BlockScope => SCOPE_NODE,
            Self::ObjectType => OBJECT_TYPE,
            Self::PointerType => POINTER_TYPE,
            Self::UnknownType | Self::Language => NONE,
        }
    }

    /// Type labels, most specific first. Always ends with [`NODE_LABEL`].
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Self::TranslationUnitDeclaration => {
                &["TranslationUnitDeclaration", "Declaration", "AstNode", "Node"]
            }
            Self::FunctionDeclaration => &[
                "FunctionDeclaration",
                "ValueDeclaration",
                "Declaration",
                "AstNode",
                "Node",
            ],
            Self::MethodDeclaration => &[
                "MethodDeclaration",
                "FunctionDeclaration",
                "ValueDeclaration",
                "Declaration",
                "AstNode",
                "Node",
            ],
            Self::VariableDeclaration => &[
                "VariableDeclaration",
                "ValueDeclaration",
                "Declaration",
                "AstNode",
                "Node",
            ],
            Self::ParameterDeclaration => &[
                "ParameterDeclaration",
                "ValueDeclaration",
                "Declaration",
                "AstNode",
                "Node",
            ],
            Self::Block => &["Block", "Expression", "Statement", "AstNode", "Node"],
            Self::DeclarationStatement => &["DeclarationStatement", "Statement", "AstNode", "Node"],
            Self::ReturnStatement => &["ReturnStatement", "Statement", "AstNode", "Node"],
            Self::CallExpression => &["CallExpression", "Expression", "Statement", "AstNode", "Node"],
            Self::Reference => &["Reference", "Expression", "Statement", "AstNode", "Node"],
            Self::Literal => &["Literal", "Expression", "Statement", "AstNode", "Node"],
            Self::BinaryOperator => &["BinaryOperator", "Expression", "Statement", "AstNode", "Node"],
            Self::UnaryOperator => &["UnaryOperator", "Expression", "Statement", "AstNode", "Node"],
            Self::AssignExpression => {
                &["AssignExpression", "Expression", "Statement", "AstNode", "Node"]
            }
            Self::FunctionScope => &["FunctionScope", "Scope", "Node"],
            Self::BlockScope => &["BlockScope", "Scope", "Node"],
            Self::ObjectType => &["ObjectType", "Type", "Node"],
            Self::PointerType => &["PointerType", "Type", "Node"],
            Self::UnknownType => &["UnknownType", "Type", "Node"],
            Self::Language => &["Language", "Node"],
        }
    }

    pub fn primary_label(&self) -> &'static str {
        self.labels()[0]
    }

    pub fn is_function_like(&self) -> bool {
        matches!(self, Self::FunctionDeclaration | Self::MethodDeclaration)
    }

    pub fn is_scope(&self) -> bool {
        matches!(self, Self::FunctionScope | Self::BlockScope)
    }

    pub fn spec(&self, relationship: &str) -> Option<&'static RelationshipSpec> {
        self.schema().iter().find(|s| s.name == relationship)
    }
}

/// Generic supertype label carried by every persisted node.
pub const NODE_LABEL: &str = "Node";

// ── Nodes and edges ───────────────────────────────────────────────

/// A typed edge stored in an [`Arity::Edges`] relationship. The owning node is the start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramEdge {
    pub target: NodeSlot,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Targets of one relationship, shaped by its [`Arity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipValue {
    Single(NodeSlot),
    Nodes(Vec<NodeSlot>),
    Edges(Vec<ProgramEdge>),
}

impl RelationshipValue {
    pub fn arity(&self) -> Arity {
        match self {
            Self::Single(_) => Arity::Single,
            Self::Nodes(_) => Arity::Nodes,
            Self::Edges(_) => Arity::Edges,
        }
    }

    /// Target slots in declaration order.
    pub fn targets(&self) -> Vec<NodeSlot> {
        match self {
            Self::Single(slot) => vec![*slot],
            Self::Nodes(slots) => slots.clone(),
            Self::Edges(edges) => edges.iter().map(|e| e.target).collect(),
        }
    }
}

/// An entity of the program graph.
///
/// `id` comes from the analysis frontend and is not unique across the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramNode {
    pub id: i64,
    pub kind: NodeKind,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipValue>,
}

impl ProgramNode {
    pub fn new(id: i64, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            properties: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_relationship(mut self, name: &str, value: RelationshipValue) -> Self {
        self.relationships.insert(name.to_string(), value);
        self
    }

    pub fn labels(&self) -> &'static [&'static str] {
        self.kind.labels()
    }

    fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.str_property("name").filter(|n| !n.is_empty())
    }

    /// Last path component of the name; falls back to `name`.
    pub fn local_name(&self) -> Option<&str> {
        self.str_property("localName")
            .filter(|n| !n.is_empty())
            .or_else(|| self.name())
    }

    /// Source text of the node as emitted by the frontend.
    pub fn code(&self) -> Option<&str> {
        self.str_property("code")
    }

    /// Targets of `relationship` if the node holds it.
    pub fn targets(&self, relationship: &str) -> Vec<NodeSlot> {
        self.relationships
            .get(relationship)
            .map(RelationshipValue::targets)
            .unwrap_or_default()
    }
}

// ── Graph ─────────────────────────────────────────────────────────

/// Arena of program nodes. A node's slot is its position in `nodes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgramGraph {
    pub nodes: Vec<ProgramNode>,
}

impl ProgramGraph {
    pub fn new(nodes: Vec<ProgramNode>) -> Self {
        Self { nodes }
    }

    /// Load a graph exported by the analysis frontend and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let graph: Self = serde_json::from_str(&raw)?;
        graph.validate()?;
        tracing::debug!(path = %path.display(), nodes = graph.len(), "Loaded program graph");
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, slot: NodeSlot) -> Option<&ProgramNode> {
        self.nodes.get(slot.0)
    }

    pub fn slots(&self) -> impl Iterator<Item = (NodeSlot, &ProgramNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeSlot(i), n))
    }

    /// Check that every relationship is declared by the node's kind with the
    /// declared arity, and that every target slot exists.
    pub fn validate(&self) -> Result<()> {
        for (slot, node) in self.slots() {
            for (name, value) in &node.relationships {
                match node.kind.spec(name) {
                    Some(spec) if spec.arity == value.arity() => {}
                    _ => {
                        return Err(IrGraphError::UnknownRelationship {
                            kind: node.kind.primary_label().to_string(),
                            relationship: name.clone(),
                        })
                    }
                }
                if let Some(target) = value.targets().into_iter().find(|t| t.0 >= self.len()) {
                    return Err(IrGraphError::DanglingSlot {
                        slot: slot.0,
                        relationship: name.clone(),
                        target: target.0,
                    });
                }
            }
        }
        Ok(())
    }

    /// Direct syntactic children of `slot`, in schema order.
    pub fn ast_children(&self, slot: NodeSlot) -> Vec<NodeSlot> {
        let Some(node) = self.node(slot) else {
            return Vec::new();
        };
        node.kind
            .schema()
            .iter()
            .filter(|spec| spec.ast)
            .flat_map(|spec| node.targets(spec.name))
            .collect()
    }

    /// All syntactic descendants of `slot` in pre-order, excluding `slot` itself.
    pub fn ast_descendants(&self, slot: NodeSlot) -> Vec<NodeSlot> {
        let mut seen = HashSet::from([slot]);
        let mut out = Vec::new();
        let mut stack: Vec<NodeSlot> = self.ast_children(slot).into_iter().rev().collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.ast_children(next).into_iter().rev());
        }
        out
    }

    /// Syntactic descendants of `block` whose nearest enclosing block is
    /// `block`, in pre-order. Nested blocks are listed but not entered.
    pub fn block_members(&self, block: NodeSlot) -> Vec<NodeSlot> {
        let mut seen = HashSet::from([block]);
        let mut out = Vec::new();
        let mut stack: Vec<NodeSlot> = self.ast_children(block).into_iter().rev().collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            if !matches!(self.node(next).map(|n| n.kind), Some(NodeKind::Block)) {
                stack.extend(self.ast_children(next).into_iter().rev());
            }
        }
        out
    }

    /// Blocks nested anywhere inside a function body.
    pub fn blocks_of(&self, function: NodeSlot) -> Vec<NodeSlot> {
        self.ast_descendants(function)
            .into_iter()
            .filter(|s| matches!(self.node(*s).map(|n| n.kind), Some(NodeKind::Block)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(targets: &[usize]) -> RelationshipValue {
        RelationshipValue::Edges(
            targets
                .iter()
                .map(|t| ProgramEdge {
                    target: NodeSlot(*t),
                    properties: BTreeMap::new(),
                })
                .collect(),
        )
    }

    #[test]
    fn every_kind_ends_with_node_label() {
        for kind in [
            NodeKind::FunctionDeclaration,
            NodeKind::Block,
            NodeKind::FunctionScope,
            NodeKind::UnknownType,
            NodeKind::Language,
        ] {
            assert_eq!(kind.labels().last(), Some(&NODE_LABEL));
        }
    }

    #[test]
    fn deserializes_frontend_json() {
        let json = r#"{
            "nodes": [
                {"id": 1, "kind": "FunctionDeclaration",
                 "properties": {"name": "_ZN4main4mainE"},
                 "relationships": {"BODY": {"single": 1}}},
                {"id": 1, "kind": "Block",
                 "relationships": {"STATEMENTS": {"edges": [{"target": 0, "properties": {"index": 0}}]}}}
            ]
        }"#;
        let graph: ProgramGraph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.nodes[0].name(), Some("_ZN4main4mainE"));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn validate_rejects_dangling_slot() {
        let graph = ProgramGraph::new(vec![ProgramNode::new(0, NodeKind::Block)
            .with_relationship("STATEMENTS", edges(&[7]))]);
        assert!(matches!(
            graph.validate(),
            Err(IrGraphError::DanglingSlot { target: 7, .. })
        ));
    }

    #[test]
    fn validate_rejects_undeclared_relationship() {
        let graph = ProgramGraph::new(vec![
            ProgramNode::new(0, NodeKind::Literal)
                .with_relationship("BODY", RelationshipValue::Single(NodeSlot(0))),
        ]);
        assert!(matches!(
            graph.validate(),
            Err(IrGraphError::UnknownRelationship { .. })
        ));
    }

    #[test]
    fn validate_rejects_arity_mismatch() {
        let graph = ProgramGraph::new(vec![
            ProgramNode::new(0, NodeKind::Block),
            ProgramNode::new(1, NodeKind::Block)
                .with_relationship("STATEMENTS", RelationshipValue::Single(NodeSlot(0))),
        ]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn blocks_found_through_nested_ast() {
        // fn -> body block -> stmt block
        let graph = ProgramGraph::new(vec![
            ProgramNode::new(0, NodeKind::FunctionDeclaration)
                .with_relationship("BODY", RelationshipValue::Single(NodeSlot(1))),
            ProgramNode::new(1, NodeKind::Block).with_relationship("STATEMENTS", edges(&[2, 3])),
            ProgramNode::new(2, NodeKind::Block),
            ProgramNode::new(3, NodeKind::Literal),
        ]);
        assert_eq!(graph.blocks_of(NodeSlot(0)), vec![NodeSlot(1), NodeSlot(2)]);
        assert_eq!(
            graph.ast_descendants(NodeSlot(1)),
            vec![NodeSlot(2), NodeSlot(3)]
        );
    }

    #[test]
    fn block_members_stop_at_nested_blocks() {
        // body block -> [inner block -> [literal], literal]
        let graph = ProgramGraph::new(vec![
            ProgramNode::new(0, NodeKind::Block).with_relationship("STATEMENTS", edges(&[1, 3])),
            ProgramNode::new(1, NodeKind::Block).with_relationship("STATEMENTS", edges(&[2])),
            ProgramNode::new(2, NodeKind::Literal),
            ProgramNode::new(3, NodeKind::Literal),
        ]);
        assert_eq!(graph.block_members(NodeSlot(0)), vec![NodeSlot(1), NodeSlot(3)]);
        assert_eq!(graph.block_members(NodeSlot(1)), vec![NodeSlot(2)]);
    }

    #[test]
    fn ast_walk_terminates_on_cycles() {
        let graph = ProgramGraph::new(vec![
            ProgramNode::new(0, NodeKind::Block).with_relationship("STATEMENTS", edges(&[1])),
            ProgramNode::new(1, NodeKind::Block).with_relationship("STATEMENTS", edges(&[0])),
        ]);
        assert_eq!(graph.ast_descendants(NodeSlot(0)), vec![NodeSlot(1)]);
    }

    #[test]
    fn non_ast_relationships_are_not_walked() {
        let graph = ProgramGraph::new(vec![
            ProgramNode::new(0, NodeKind::Reference)
                .with_relationship("REFERS_TO", RelationshipValue::Single(NodeSlot(1))),
            ProgramNode::new(1, NodeKind::VariableDeclaration),
        ]);
        assert!(graph.ast_children(NodeSlot(0)).is_empty());
    }

    #[test]
    fn local_name_falls_back_to_name() {
        let node = ProgramNode::new(0, NodeKind::VariableDeclaration).with_property("name", "x");
        assert_eq!(node.local_name(), Some("x"));
        let node = node.with_property("localName", "y");
        assert_eq!(node.local_name(), Some("y"));
    }
}
