use std::collections::BTreeMap;

use async_trait::async_trait;
use neo4rs::{query, BoltMap, BoltNull, BoltString, BoltType, Query, Row};
use tracing::debug;

use citegraph_common::{NodeLabel, PaperState, RelType};

use crate::error::GraphError;
use crate::plan::{AttrValue, Attributes, MergePlan, NodeWrite};
use crate::store::GraphStore;
use crate::GraphClient;

/// Write-side wrapper for the graph. Every call is its own short transaction.
pub struct GraphWriter {
    client: GraphClient,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Run a `... RETURN count(x) AS deleted` statement and read the count back.
    async fn run_delete(&self, q: Query) -> Result<u64, GraphError> {
        let mut stream = self.client.graph.execute(q).await?;
        let mut deleted = 0;
        if let Some(row) = stream.next().await? {
            deleted = deleted_count(&row)?;
        }
        // drain so the auto-commit transaction completes before we return
        while stream.next().await?.is_some() {}
        Ok(deleted)
    }
}

fn deleted_count(row: &Row) -> Result<u64, GraphError> {
    let n = row
        .get::<i64>("deleted")
        .map_err(|e| GraphError::Rejected(format!("unreadable delete count: {e}")))?;
    Ok(n.max(0) as u64)
}

#[async_trait]
impl GraphStore for GraphWriter {
    async fn apply(&self, plan: &MergePlan) -> Result<(), GraphError> {
        if plan.is_empty() {
            return Ok(());
        }
        let queries = plan_queries(plan);
        debug!(
            nodes = plan.nodes.len(),
            edges = plan.edges.len(),
            statements = queries.len(),
            "Applying merge plan"
        );

        let mut txn = self.client.graph.start_txn().await?;
        if let Err(e) = txn.run_queries(queries).await {
            // best effort: the server discards the transaction either way
            let _ = txn.rollback().await;
            return Err(e.into());
        }
        txn.commit().await?;
        Ok(())
    }

    async fn stub_paper_ids(&self, limit: usize) -> Result<Vec<String>, GraphError> {
        let q = query(
            "MATCH (p:paper)
             WHERE p.state = $stub
             RETURN p.id AS id
             LIMIT $limit",
        )
        .param("stub", PaperState::Stub.as_str())
        .param("limit", limit as i64);

        let mut ids = Vec::new();
        let mut stream = self.client.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            let id: String = row.get("id").unwrap_or_default();
            if !id.is_empty() {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn delete_stub_papers(&self, ids: &[String]) -> Result<u64, GraphError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let q = query(
            "MATCH (p:paper)
             WHERE p.id IN $ids AND p.state = $stub
             DETACH DELETE p
             RETURN count(p) AS deleted",
        )
        .param("ids", ids.to_vec())
        .param("stub", PaperState::Stub.as_str());
        self.run_delete(q).await
    }

    async fn delete_papers_cited_below(&self, min_count: u64, limit: usize) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (p:paper)
             WHERE p.cited_by_count < $min_count
             WITH p
             LIMIT $limit
             DETACH DELETE p
             RETURN count(p) AS deleted",
        )
        .param("min_count", i64::try_from(min_count).unwrap_or(i64::MAX))
        .param("limit", limit as i64);
        self.run_delete(q).await
    }

    async fn delete_orphan_authors(&self, limit: usize) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (a:author)
             WHERE NOT (a)<-[:has_author]-(:paper)
             WITH a
             LIMIT $limit
             DETACH DELETE a
             RETURN count(a) AS deleted",
        )
        .param("limit", limit as i64);
        self.run_delete(q).await
    }
}

// --- Plan → Cypher ---

/// Group the plan into UNWIND statements: one per (label, write shape) for
/// nodes and one per (type, endpoint labels, attribute names) for edges.
/// Nodes are written before edges.
pub(crate) fn plan_queries(plan: &MergePlan) -> Vec<Query> {
    let mut node_groups: BTreeMap<(NodeLabel, Option<Vec<String>>), Vec<BoltType>> = BTreeMap::new();
    for (node, write) in &plan.nodes {
        let (shape, mut row) = match write {
            NodeWrite::Ensure => (None, BoltMap::new()),
            NodeWrite::Set(attrs) => (Some(attrs.keys().cloned().collect()), attrs_to_map(attrs)),
        };
        row.put(BoltString::from("key"), BoltType::from(node.key.as_str()));
        node_groups
            .entry((node.label, shape))
            .or_default()
            .push(BoltType::Map(row));
    }

    type EdgeShape = (RelType, NodeLabel, NodeLabel, Vec<String>);
    let mut edge_groups: BTreeMap<EdgeShape, Vec<BoltType>> = BTreeMap::new();
    for (edge, attrs) in &plan.edges {
        let mut row = attrs_to_map(attrs);
        row.put(BoltString::from("from"), BoltType::from(edge.from.key.as_str()));
        row.put(BoltString::from("to"), BoltType::from(edge.to.key.as_str()));
        let shape = (
            edge.rel,
            edge.from.label,
            edge.to.label,
            attrs.keys().cloned().collect(),
        );
        edge_groups.entry(shape).or_default().push(BoltType::Map(row));
    }

    let mut queries = Vec::with_capacity(node_groups.len() + edge_groups.len());
    for ((label, shape), rows) in node_groups {
        let cypher = node_cypher(label, shape.as_deref());
        queries.push(query(&cypher).param("rows", rows));
    }
    for ((rel, from, to, attr_names), rows) in edge_groups {
        let cypher = edge_cypher(rel, from, to, &attr_names);
        queries.push(query(&cypher).param("rows", rows));
    }
    queries
}

fn merge_clause(var: &str, label: NodeLabel, key_expr: &str) -> String {
    let mut clause = format!(
        "MERGE ({var}:{label} {{{key}: {key_expr}}})",
        label = label.as_str(),
        key = label.key_property(),
    );
    if label == NodeLabel::Paper {
        clause.push_str(&format!(" ON CREATE SET {var}.state = '{}'", PaperState::Stub.as_str()));
    }
    clause
}

fn set_clause(var: &str, attr_names: &[String]) -> String {
    if attr_names.is_empty() {
        return String::new();
    }
    let assignments: Vec<String> = attr_names
        .iter()
        .map(|name| format!("{var}.{name} = row.{name}"))
        .collect();
    format!(" SET {}", assignments.join(", "))
}

pub(crate) fn node_cypher(label: NodeLabel, set_attrs: Option<&[String]>) -> String {
    let mut cypher = format!("UNWIND $rows AS row {}", merge_clause("n", label, "row.key"));
    if let Some(names) = set_attrs {
        cypher.push_str(&set_clause("n", names));
    }
    cypher
}

pub(crate) fn edge_cypher(rel: RelType, from: NodeLabel, to: NodeLabel, attr_names: &[String]) -> String {
    format!(
        "UNWIND $rows AS row {} {} MERGE (a)-[r:{rel}]->(b){}",
        merge_clause("a", from, "row.from"),
        merge_clause("b", to, "row.to"),
        set_clause("r", attr_names),
        rel = rel.as_str(),
    )
}

fn attrs_to_map(attrs: &Attributes) -> BoltMap {
    let mut map = BoltMap::new();
    for (name, value) in attrs {
        map.put(BoltString::from(name.as_str()), to_bolt(value));
    }
    map
}

fn to_bolt(value: &AttrValue) -> BoltType {
    match value {
        AttrValue::Null => BoltType::Null(BoltNull),
        AttrValue::Bool(b) => BoltType::from(*b),
        AttrValue::Int(n) => BoltType::from(*n),
        AttrValue::Str(s) => BoltType::from(s.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use neo4rs::{BoltInteger, BoltList};

    use super::*;

    fn row(key: &str, value: BoltType) -> Row {
        Row::new(
            BoltList::from(vec![BoltType::String(BoltString::new(key))]),
            BoltList::from(vec![value]),
        )
    }

    #[test]
    fn delete_count_is_read_from_the_row() {
        let n = deleted_count(&row("deleted", BoltType::Integer(BoltInteger::new(3)))).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn undecodable_delete_count_is_an_error() {
        let err = deleted_count(&row("deleted", BoltType::String(BoltString::new("three")))).unwrap_err();
        assert!(matches!(err, GraphError::Rejected(_)));

        let err = deleted_count(&row("removed", BoltType::Integer(BoltInteger::new(3)))).unwrap_err();
        assert!(matches!(err, GraphError::Rejected(_)));
    }

    #[test]
    fn paper_ensure_marks_new_nodes_as_stubs() {
        let cypher = node_cypher(NodeLabel::Paper, None);
        assert_eq!(
            cypher,
            "UNWIND $rows AS row MERGE (n:paper {id: row.key}) ON CREATE SET n.state = 'stub'"
        );
    }

    #[test]
    fn named_nodes_merge_on_name() {
        let cypher = node_cypher(NodeLabel::Venue, Some(&[]));
        assert_eq!(cypher, "UNWIND $rows AS row MERGE (n:venue {name: row.key})");
    }

    #[test]
    fn set_writes_every_listed_attribute() {
        let names = vec!["state".to_string(), "title".to_string()];
        let cypher = node_cypher(NodeLabel::Paper, Some(&names));
        assert!(cypher.ends_with(" SET n.state = row.state, n.title = row.title"));
    }

    #[test]
    fn published_in_edge_overwrites_its_attributes() {
        let names = vec!["date".to_string(), "issue".to_string()];
        let cypher = edge_cypher(RelType::PublishedIn, NodeLabel::Paper, NodeLabel::Venue, &names);
        assert!(cypher.contains("MERGE (a:paper {id: row.from}) ON CREATE SET a.state = 'stub'"));
        assert!(cypher.contains("MERGE (b:venue {name: row.to})"));
        assert!(cypher.ends_with("MERGE (a)-[r:published_in]->(b) SET r.date = row.date, r.issue = row.issue"));
    }

    #[test]
    fn cites_edge_stubs_both_ends_on_create() {
        let cypher = edge_cypher(RelType::Cites, NodeLabel::Paper, NodeLabel::Paper, &[]);
        assert!(cypher.contains("ON CREATE SET b.state = 'stub'"));
        assert!(cypher.ends_with("MERGE (a)-[r:cites]->(b)"));
    }
}
