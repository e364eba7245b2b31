//! Tenant-isolated execution of caller-supplied read queries.
//!
//! A query goes through three steps before it reaches the store:
//! 1. Validation: a textual deny-list rejects write and admin keywords.
//! 2. Isolation: every `MATCH` pattern variable and every `WHERE` clause is
//!    constrained to the caller's `projectId`, line by line.
//! 3. Capping: the result is limited to the configured row cap.
//!
//! This is a text transform, not a parser. Several clauses on one line or
//! nested sub-queries are not rewritten individually.

use std::sync::LazyLock;

use regex::Regex;

use irgraph_core::config::QuerySettings;
use irgraph_core::TenantId;

use crate::client::GraphError;
use crate::project::{self, GraphData, RawValue};
use crate::store::GraphStore;

/// Errors surfaced to query callers.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Query execution failed: {0}")]
    Execution(String),
}

impl From<GraphError> for QueryError {
    fn from(e: GraphError) -> Self {
        Self::Execution(e.to_string())
    }
}

static FORBIDDEN: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)\b(?:create|merge|delete|set|drop|remove)\b").expect("static regex"),
        Regex::new(r"(?is)\bcall\b.*\bdbms\b").expect("static regex"),
        Regex::new(r"(?i)\bapoc\.(?:refactor|periodic|trigger|schema|atomic|lock|cypher\.do)")
            .expect("static regex"),
    ]
});

static MATCH_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:OPTIONAL\s+)?MATCH\b").expect("static regex"));

static MATCH_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:OPTIONAL\s+)?MATCH\b[^(]*\(\s*([A-Za-z_]\w*)").expect("static regex")
});

static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\s*WHERE)\b\s*(.*)$").expect("static regex"));

/// A line opening a new clause; anything else after `WHERE` continues its predicate.
static CLAUSE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:OPTIONAL\s+MATCH|MATCH|WHERE|WITH|RETURN|UNWIND|CALL|ORDER\s+BY|SKIP|LIMIT|UNION)\b",
    )
    .expect("static regex")
});

static WHERE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*WHERE\s+(?:NOT\s+)?(?:\w+\s*\()?\s*\(?\s*([A-Za-z_]\w*)\s*[.):]")
        .expect("static regex")
});

static TRAILING_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)\s*$").expect("static regex"));

/// Reject queries containing write or administration keywords anywhere.
pub fn validate(query: &str) -> Result<(), QueryError> {
    match FORBIDDEN.iter().find_map(|re| re.find(query)) {
        Some(m) => Err(QueryError::AccessDenied(format!(
            "forbidden token `{}`",
            m.as_str().split_whitespace().next().unwrap_or_default()
        ))),
        None => Ok(()),
    }
}

fn tenant_filter(variable: &str) -> String {
    format!("{variable}.projectId IS NOT NULL AND {variable}.projectId = $projectId")
}

/// Rewrite `query` so every matched pattern is scoped to `$projectId`, then
/// cap the result at `result_limit` rows.
///
/// A `MATCH` line whose next non-blank line is not a `WHERE` gets a new
/// filter line. A `WHERE` predicate, including its continuation lines up to
/// the next clause, is parenthesized and gets an `AND`-ed filter on the
/// variable it references, or on the variable of the `MATCH` it follows. A
/// clause whose variable cannot be determined is rejected.
pub fn rewrite(query: &str, result_limit: usize) -> Result<String, QueryError> {
    let query = query.trim_end().trim_end_matches(';').trim_end();
    let lines: Vec<&str> = query.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() * 2 + 1);
    let mut pending: Option<String> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if MATCH_CLAUSE.is_match(line) {
            out.push(line.to_string());
            let variable = MATCH_VARIABLE
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    QueryError::AccessDenied(format!(
                        "cannot scope pattern without a variable: `{}`",
                        line.trim()
                    ))
                })?;

            let next_is_where = lines[i..]
                .iter()
                .find(|l| !l.trim().is_empty())
                .is_some_and(|l| WHERE_CLAUSE.is_match(l));

            if next_is_where {
                pending = Some(variable);
            } else {
                out.push(format!("WHERE {}", tenant_filter(&variable)));
                pending = None;
            }
        } else if let Some(caps) = WHERE_CLAUSE.captures(line) {
            let keyword = caps.get(1).map_or("WHERE", |m| m.as_str());
            let mut predicate = caps.get(2).map_or("", |m| m.as_str()).to_string();
            while i < lines.len() && !CLAUSE_START.is_match(lines[i]) {
                predicate.push('\n');
                predicate.push_str(lines[i]);
                i += 1;
            }
            let predicate = predicate.trim();
            if predicate.is_empty() {
                return Err(QueryError::AccessDenied("empty filter clause".to_string()));
            }

            let variable = WHERE_VARIABLE
                .captures(&format!("WHERE {predicate}"))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .or_else(|| pending.take())
                .ok_or_else(|| {
                    QueryError::AccessDenied(format!(
                        "cannot scope filter clause: `{}`",
                        line.trim()
                    ))
                })?;
            out.push(format!("{keyword} ({predicate})"));
            out.push(format!("AND {}", tenant_filter(&variable)));
            pending = None;
        } else {
            out.push(line.to_string());
        }
    }

    let mut rewritten = out.join("\n");
    match TRAILING_LIMIT
        .captures(&rewritten)
        .and_then(|c| Some((c.get(0)?.start(), c.get(1)?.as_str().parse::<usize>().ok())))
    {
        Some((start, requested)) => {
            let limit = requested.map_or(result_limit, |n| n.min(result_limit));
            rewritten.truncate(start);
            rewritten.push_str(&format!("LIMIT {limit}"));
        }
        None => rewritten.push_str(&format!("\nLIMIT {result_limit}")),
    }
    Ok(rewritten)
}

/// Validates, rewrites, and runs read queries for one store.
pub struct QueryGateway<S> {
    store: S,
    result_limit: usize,
}

impl<S: GraphStore> QueryGateway<S> {
    pub fn new(store: S, settings: &QuerySettings) -> Self {
        Self {
            store,
            result_limit: settings.result_limit.max(1),
        }
    }

    /// Run `query` for `tenant` and return the raw rows.
    pub async fn execute(
        &self,
        tenant: &TenantId,
        query: &str,
    ) -> Result<Vec<Vec<RawValue>>, QueryError> {
        validate(query)?;
        let rewritten = rewrite(query, self.result_limit)?;
        tracing::debug!(tenant = %tenant, query = %rewritten, "Executing query");

        let rows = self
            .store
            .read(tenant, &rewritten, self.result_limit)
            .await
            .map_err(|e| {
                tracing::warn!(tenant = %tenant, error = %e, "Query failed");
                QueryError::from(e)
            })?;
        Ok(rows)
    }

    /// Run `query` for `tenant` and project the result into nodes and edges.
    pub async fn query_graph(&self, tenant: &TenantId, query: &str) -> Result<GraphData, QueryError> {
        let rows = self.execute(tenant, query).await?;
        let data = project::project(&rows);
        tracing::info!(
            tenant = %tenant,
            rows = rows.len(),
            nodes = data.nodes.len(),
            edges = data.edges.len(),
            "Query projected"
        );
        Ok(data)
    }

    /// Names of the variables tagged `TrackedVariable` for `tenant`, in
    /// first-seen order without duplicates.
    pub async fn tracked_variables(&self, tenant: &TenantId) -> Result<Vec<String>, QueryError> {
        let data = self
            .query_graph(tenant, "MATCH (n:TrackedVariable)\nRETURN n")
            .await?;

        let mut names: Vec<String> = Vec::new();
        for node in data.nodes {
            if let Some(name) = node.title.get("name") {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::mock::MockGraphStore;
    use crate::project::RawNode;

    #[test]
    fn write_keywords_are_denied_in_any_case() {
        for query in [
            "MATCH (n) DELETE n",
            "match (n) detach delete n",
            "CREATE (n:Foo)",
            "MATCH (n) MERGE (m:Foo)",
            "MATCH (n) Set n.x = 1",
            "DROP INDEX foo",
            "MATCH (n) REMOVE n.name",
            "MATCH (n) WHERE n.name = 'a' OR exists { MATCH (m) } RETURN n CREATE (x)",
        ] {
            assert!(
                matches!(validate(query), Err(QueryError::AccessDenied(_))),
                "not denied: {query}"
            );
        }
    }

    #[test]
    fn admin_procedures_are_denied() {
        assert!(validate("CALL dbms.security.listUsers()").is_err());
        assert!(validate("call\n  DBMS.components()").is_err());
    }

    #[test]
    fn write_procedures_are_denied() {
        for query in [
            "CALL apoc.refactor.rename.label('VariableDeclaration', 'Gone')",
            "MATCH (a:Node), (b:Node)\nCALL apoc.refactor.mergeNodes([a, b]) YIELD node\nRETURN node",
            "CALL apoc.periodic.iterate('MATCH (n) RETURN n', 'DETACH DELETE n', {})",
            "CALL apoc.cypher.doIt('MATCH (n) RETURN n', {})",
        ] {
            assert!(
                matches!(validate(query), Err(QueryError::AccessDenied(_))),
                "not denied: {query}"
            );
        }
    }

    #[test]
    fn keywords_inside_identifiers_are_allowed() {
        assert!(validate("MATCH (n:Dataset)\nWHERE n.offset > 1\nRETURN n").is_ok());
        assert!(validate("MATCH (n:Node)\nRETURN n.createdAt").is_ok());
    }

    #[test]
    fn match_without_where_gets_filter_line() {
        let rewritten = rewrite("MATCH (n:FunctionDeclaration)\nRETURN n", 150).unwrap();
        assert_eq!(
            rewritten,
            "MATCH (n:FunctionDeclaration)\n\
             WHERE n.projectId IS NOT NULL AND n.projectId = $projectId\n\
             RETURN n\n\
             LIMIT 150"
        );
    }

    #[test]
    fn user_where_gets_and_clause() {
        let rewritten =
            rewrite("MATCH (f:FunctionDeclaration)\nWHERE f.name ENDS WITH '::main'\nRETURN f", 150)
                .unwrap();
        let lines: Vec<&str> = rewritten.lines().collect();
        assert_eq!(lines[1], "WHERE (f.name ENDS WITH '::main')");
        assert_eq!(
            lines[2],
            "AND f.projectId IS NOT NULL AND f.projectId = $projectId"
        );
        assert!(!rewritten.contains("WHERE f.projectId"));
    }

    #[test]
    fn or_predicate_cannot_escape_tenant_filter() {
        let rewritten = rewrite(
            "MATCH (n:VariableDeclaration)\nWHERE n.name = 'secret' OR n.name = 'x'\nRETURN n",
            150,
        )
        .unwrap();
        let lines: Vec<&str> = rewritten.lines().collect();
        assert_eq!(lines[1], "WHERE (n.name = 'secret' OR n.name = 'x')");
        assert_eq!(
            lines[2],
            "AND n.projectId IS NOT NULL AND n.projectId = $projectId"
        );
        assert_eq!(lines[3], "RETURN n");
    }

    #[test]
    fn multi_line_predicate_is_parenthesized_whole() {
        let rewritten = rewrite(
            "MATCH (n:VariableDeclaration)\nWHERE n.name = 'a'\n  OR n.name = 'b'\nRETURN n",
            150,
        )
        .unwrap();
        assert_eq!(
            rewritten,
            "MATCH (n:VariableDeclaration)\n\
             WHERE (n.name = 'a'\n  OR n.name = 'b')\n\
             AND n.projectId IS NOT NULL AND n.projectId = $projectId\n\
             RETURN n\n\
             LIMIT 150"
        );
    }

    #[test]
    fn predicate_on_following_line_uses_its_variable() {
        let rewritten =
            rewrite("MATCH (a)\nWHERE\n  b.name = 'x'\nRETURN a", 150).unwrap();
        assert!(rewritten.contains("WHERE (b.name = 'x')\nAND b.projectId IS NOT NULL"));
    }

    #[test]
    fn empty_where_is_denied() {
        assert!(matches!(
            rewrite("MATCH (n)\nWHERE\nRETURN n", 150),
            Err(QueryError::AccessDenied(_))
        ));
    }

    #[test]
    fn every_match_is_scoped() {
        let rewritten = rewrite(
            "MATCH (a:FunctionDeclaration)\nMATCH p=(b:Block)-[:EOG*]->(c)\nRETURN a, p",
            150,
        )
        .unwrap();
        assert!(rewritten.contains("WHERE a.projectId IS NOT NULL"));
        assert!(rewritten.contains("WHERE b.projectId IS NOT NULL"));
    }

    #[test]
    fn pattern_with_space_before_label() {
        let rewritten = rewrite("MATCH (n: TrackedVariable)\nRETURN n", 150).unwrap();
        assert!(rewritten.contains("\nWHERE n.projectId IS NOT NULL AND n.projectId = $projectId\n"));
    }

    #[test]
    fn where_in_function_call_form() {
        let rewritten =
            rewrite("MATCH (v:VariableDeclaration)\nWHERE toLower(v.name) = 'x'\nRETURN v", 150)
                .unwrap();
        assert!(rewritten.contains("AND v.projectId IS NOT NULL"));
    }

    #[test]
    fn where_without_variable_falls_back_to_match() {
        let rewritten = rewrite("MATCH (v)\nWHERE 1 = 1\nRETURN v", 150).unwrap();
        assert!(rewritten.contains("AND v.projectId IS NOT NULL"));
    }

    #[test]
    fn anonymous_pattern_is_denied() {
        assert!(matches!(
            rewrite("MATCH (:FunctionDeclaration)\nRETURN 1", 150),
            Err(QueryError::AccessDenied(_))
        ));
    }

    #[test]
    fn explicit_large_limit_is_capped() {
        let rewritten = rewrite("MATCH (n)\nRETURN n\nLIMIT 1000", 150).unwrap();
        assert!(rewritten.ends_with("LIMIT 150"));
        assert!(!rewritten.contains("1000"));
        assert_eq!(rewritten.matches("LIMIT").count(), 1);
    }

    #[test]
    fn smaller_limit_is_kept() {
        let rewritten = rewrite("MATCH (n)\nRETURN n LIMIT 5;", 150).unwrap();
        assert!(rewritten.ends_with("RETURN n LIMIT 5"));
    }

    fn tracked(id: i64, name: &str) -> RawValue {
        RawValue::Node(RawNode {
            id,
            labels: vec!["VariableDeclaration".to_string(), "TrackedVariable".to_string()],
            properties: BTreeMap::from([("name".to_string(), RawValue::Scalar(name.to_string()))]),
        })
    }

    #[tokio::test]
    async fn execute_sends_rewritten_query_with_cap() {
        let store = MockGraphStore::new();
        let gateway = QueryGateway::new(store.clone(), &QuerySettings::default());
        let tenant = TenantId::from("t1");

        gateway
            .execute(&tenant, "MATCH (n)\nRETURN n\nLIMIT 1000")
            .await
            .unwrap();

        let reads = store.reads().await;
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].0, tenant);
        assert!(reads[0].1.contains("n.projectId = $projectId"));
        assert!(reads[0].1.ends_with("LIMIT 150"));
        assert_eq!(reads[0].2, 150);
    }

    #[tokio::test]
    async fn denied_query_never_reaches_store() {
        let store = MockGraphStore::new();
        let gateway = QueryGateway::new(store.clone(), &QuerySettings::default());

        let err = gateway
            .execute(&TenantId::from("t1"), "MATCH (n) DETACH DELETE n")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::AccessDenied(_)));
        assert!(store.reads().await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_execution_error() {
        let store = MockGraphStore::new();
        store.fail_reads("syntax error near RETURN").await;
        let gateway = QueryGateway::new(store, &QuerySettings::default());

        let err = gateway
            .execute(&TenantId::from("t1"), "MATCH (n)\nRETURN n")
            .await
            .unwrap_err();
        match err {
            QueryError::Execution(msg) => assert!(msg.contains("syntax error")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tracked_variables_are_distinct_names() {
        let store = MockGraphStore::new();
        store
            .push_read_result(vec![
                vec![tracked(1, "counter")],
                vec![tracked(2, "total")],
                vec![tracked(3, "counter")],
            ])
            .await;
        let gateway = QueryGateway::new(store.clone(), &QuerySettings::default());

        let names = gateway.tracked_variables(&TenantId::from("t1")).await.unwrap();
        assert_eq!(names, vec!["counter".to_string(), "total".to_string()]);

        let reads = store.reads().await;
        assert!(reads[0].1.starts_with("MATCH (n:TrackedVariable)\nWHERE n.projectId"));
    }
}
