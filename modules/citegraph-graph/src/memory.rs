//! In-memory [`GraphStore`] with the same upsert and delete semantics as the
//! Neo4j writer. Used to exercise the pipeline without a database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use citegraph_common::{NodeLabel, RelType};

use crate::error::GraphError;
use crate::plan::{AttrValue, Attributes, EdgeKey, MergePlan, NodeKey, NodeWrite};
use crate::store::GraphStore;

/// A `paper` node is either a placeholder or fully described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperNode {
    Stub,
    Full(Attributes),
}

impl PaperNode {
    pub fn is_stub(&self) -> bool {
        matches!(self, PaperNode::Stub)
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        match self {
            PaperNode::Stub => None,
            PaperNode::Full(attrs) => attrs.get(name),
        }
    }

    pub fn str_attr(&self, name: &str) -> Option<&str> {
        match self.attr(name) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn cited_by_count(&self) -> Option<i64> {
        match self.attr("cited_by_count") {
            Some(AttrValue::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Whole-graph value, comparable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub papers: BTreeMap<String, PaperNode>,
    pub nodes: BTreeMap<NodeKey, Attributes>,
    pub edges: BTreeMap<EdgeKey, Attributes>,
}

impl GraphSnapshot {
    fn contains(&self, node: &NodeKey) -> bool {
        match node.label {
            NodeLabel::Paper => self.papers.contains_key(&node.key),
            _ => self.nodes.contains_key(node),
        }
    }

    fn ensure(&mut self, node: &NodeKey) {
        match node.label {
            NodeLabel::Paper => {
                self.papers.entry(node.key.clone()).or_insert(PaperNode::Stub);
            }
            _ => {
                self.nodes.entry(node.clone()).or_default();
            }
        }
    }

    fn set(&mut self, node: &NodeKey, attrs: &Attributes) {
        let mut kept = without_nulls(attrs);
        match node.label {
            NodeLabel::Paper => {
                kept.remove("state");
                self.papers.insert(node.key.clone(), PaperNode::Full(kept));
            }
            _ => {
                self.nodes.entry(node.clone()).or_default().extend(kept);
            }
        }
    }

    fn detach_delete(&mut self, node: &NodeKey) {
        match node.label {
            NodeLabel::Paper => {
                self.papers.remove(&node.key);
            }
            _ => {
                self.nodes.remove(node);
            }
        }
        self.edges.retain(|e, _| &e.from != node && &e.to != node);
    }
}

fn without_nulls(attrs: &Attributes) -> Attributes {
    attrs
        .iter()
        .filter(|(_, v)| **v != AttrValue::Null)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Default)]
pub struct MemoryGraph {
    state: Mutex<GraphSnapshot>,
    rejected_papers: Mutex<BTreeSet<String>>,
    delete_budget: Mutex<Option<usize>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any plan touching this paper id is rejected as a whole.
    pub fn reject_plans_touching(&self, paper_id: &str) {
        self.lock_rejected().insert(paper_id.to_string());
    }

    /// Allow only `n` more delete calls to succeed; later ones fail.
    pub fn fail_deletes_after(&self, n: usize) {
        *self.delete_budget.lock().unwrap_or_else(|e| e.into_inner()) = Some(n);
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.lock_state().clone()
    }

    pub fn paper(&self, id: &str) -> Option<PaperNode> {
        self.lock_state().papers.get(id).cloned()
    }

    pub fn contains(&self, node: &NodeKey) -> bool {
        self.lock_state().contains(node)
    }

    pub fn count(&self, label: NodeLabel) -> usize {
        let state = self.lock_state();
        match label {
            NodeLabel::Paper => state.papers.len(),
            _ => state.nodes.keys().filter(|k| k.label == label).count(),
        }
    }

    pub fn edge_count(&self, rel: RelType) -> usize {
        self.lock_state().edges.keys().filter(|e| e.rel == rel).count()
    }

    pub fn edge(&self, from: &NodeKey, rel: RelType, to: &NodeKey) -> Option<Attributes> {
        let key = EdgeKey {
            from: from.clone(),
            rel,
            to: to.clone(),
        };
        self.lock_state().edges.get(&key).cloned()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GraphSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_rejected(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.rejected_papers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spend_delete(&self) -> Result<(), GraphError> {
        let mut budget = self.delete_budget.lock().unwrap_or_else(|e| e.into_inner());
        match budget.as_mut() {
            Some(0) => Err(GraphError::Rejected("delete budget exhausted".into())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn apply(&self, plan: &MergePlan) -> Result<(), GraphError> {
        {
            let rejected = self.lock_rejected();
            if let Some(id) = plan.paper_ids().find(|id| rejected.contains(*id)) {
                return Err(GraphError::Rejected(format!("plan touches rejected paper {id}")));
            }
        }

        let mut state = self.lock_state();
        for (node, write) in &plan.nodes {
            match write {
                NodeWrite::Ensure => state.ensure(node),
                NodeWrite::Set(attrs) => state.set(node, attrs),
            }
        }
        for (edge, attrs) in &plan.edges {
            state.ensure(&edge.from);
            state.ensure(&edge.to);
            state
                .edges
                .entry(edge.clone())
                .or_default()
                .extend(without_nulls(attrs));
            // SET r.x = null removes the property
            if let Some(existing) = state.edges.get_mut(edge) {
                existing.retain(|k, _| attrs.get(k) != Some(&AttrValue::Null));
            }
        }
        Ok(())
    }

    async fn stub_paper_ids(&self, limit: usize) -> Result<Vec<String>, GraphError> {
        Ok(self
            .lock_state()
            .papers
            .iter()
            .filter(|(_, p)| p.is_stub())
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn delete_stub_papers(&self, ids: &[String]) -> Result<u64, GraphError> {
        self.spend_delete()?;
        let mut state = self.lock_state();
        let mut deleted = 0;
        for id in ids {
            if state.papers.get(id).is_some_and(PaperNode::is_stub) {
                state.detach_delete(&NodeKey::paper(id));
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_papers_cited_below(&self, min_count: u64, limit: usize) -> Result<u64, GraphError> {
        self.spend_delete()?;
        let min = i64::try_from(min_count).unwrap_or(i64::MAX);
        let mut state = self.lock_state();
        let doomed: Vec<String> = state
            .papers
            .iter()
            .filter(|(_, p)| p.cited_by_count().is_some_and(|n| n < min))
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            state.detach_delete(&NodeKey::paper(id));
        }
        Ok(doomed.len() as u64)
    }

    async fn delete_orphan_authors(&self, limit: usize) -> Result<u64, GraphError> {
        self.spend_delete()?;
        let mut state = self.lock_state();
        let authored: BTreeSet<NodeKey> = state
            .edges
            .keys()
            .filter(|e| e.rel == RelType::HasAuthor && e.from.label == NodeLabel::Paper)
            .map(|e| e.to.clone())
            .collect();
        let doomed: Vec<NodeKey> = state
            .nodes
            .keys()
            .filter(|k| k.label == NodeLabel::Author && !authored.contains(*k))
            .take(limit)
            .cloned()
            .collect();
        for node in &doomed {
            state.detach_delete(node);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(title: &str, cited_by: i64) -> NodeWrite {
        let mut attrs = Attributes::new();
        attrs.insert("state".into(), AttrValue::Str("full".into()));
        attrs.insert("title".into(), AttrValue::Str(title.into()));
        attrs.insert("cited_by_count".into(), AttrValue::Int(cited_by));
        attrs.insert("doi".into(), AttrValue::Null);
        NodeWrite::Set(attrs)
    }

    #[tokio::test]
    async fn ensure_creates_stub_and_set_fills_it() {
        let graph = MemoryGraph::new();
        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W2"), NodeWrite::Ensure);
        graph.apply(&plan).await.unwrap();
        assert!(graph.paper("W2").unwrap().is_stub());

        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W2"), full("Filled", 3));
        graph.apply(&plan).await.unwrap();

        let paper = graph.paper("W2").unwrap();
        assert_eq!(paper.str_attr("title"), Some("Filled"));
        assert!(paper.attr("doi").is_none());
        assert!(paper.attr("state").is_none());
    }

    #[tokio::test]
    async fn ensure_never_downgrades_a_full_paper() {
        let graph = MemoryGraph::new();
        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W1"), full("Kept", 1));
        graph.apply(&plan).await.unwrap();

        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W1"), NodeWrite::Ensure);
        graph.apply(&plan).await.unwrap();

        assert_eq!(graph.paper("W1").unwrap().str_attr("title"), Some("Kept"));
    }

    #[tokio::test]
    async fn rejected_plan_leaves_graph_untouched() {
        let graph = MemoryGraph::new();
        graph.reject_plans_touching("W9");

        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W1"), full("A", 1));
        plan.upsert_edge(
            NodeKey::paper("W1"),
            RelType::Cites,
            NodeKey::paper("W9"),
            Attributes::new(),
        );

        assert!(graph.apply(&plan).await.is_err());
        assert_eq!(graph.snapshot(), GraphSnapshot::default());
    }

    #[tokio::test]
    async fn delete_stub_papers_skips_full_papers() {
        let graph = MemoryGraph::new();
        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W1"), full("A", 1));
        plan.upsert_edge(
            NodeKey::paper("W1"),
            RelType::Cites,
            NodeKey::paper("W2"),
            Attributes::new(),
        );
        graph.apply(&plan).await.unwrap();

        let deleted = graph
            .delete_stub_papers(&["W1".to_string(), "W2".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(graph.paper("W1").is_some());
        assert_eq!(graph.edge_count(RelType::Cites), 0);
    }

    #[tokio::test]
    async fn orphan_authors_are_only_those_without_papers() {
        let graph = MemoryGraph::new();
        let mut plan = MergePlan::default();
        plan.upsert_node(NodeKey::paper("W1"), full("A", 1));
        plan.upsert_edge(
            NodeKey::paper("W1"),
            RelType::HasAuthor,
            NodeKey::new(NodeLabel::Author, "Kept Author"),
            Attributes::new(),
        );
        plan.upsert_node(NodeKey::new(NodeLabel::Author, "Lonely Author"), NodeWrite::Ensure);
        graph.apply(&plan).await.unwrap();

        assert_eq!(graph.delete_orphan_authors(10).await.unwrap(), 1);
        assert!(graph.contains(&NodeKey::new(NodeLabel::Author, "Kept Author")));
    }

    #[tokio::test]
    async fn delete_budget_fails_later_calls() {
        let graph = MemoryGraph::new();
        graph.fail_deletes_after(1);
        assert!(graph.delete_orphan_authors(10).await.is_ok());
        assert!(graph.delete_orphan_authors(10).await.is_err());
    }
}
