use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use citegraph_common::{CiteGraphError, NodeLabel};
use citegraph_graph::{GraphError, GraphStore};

use crate::outcome::RunStatus;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneStats {
    pub papers_deleted: u64,
    pub authors_deleted: u64,
    pub batches: usize,
    /// Entity types whose loop was cut short by an error.
    pub aborted: Vec<NodeLabel>,
}

impl PruneStats {
    pub fn status(&self) -> RunStatus {
        if !self.aborted.is_empty() {
            RunStatus::PartialFailure
        } else if self.papers_deleted == 0 && self.authors_deleted == 0 {
            RunStatus::NoWork
        } else {
            RunStatus::Completed
        }
    }
}

impl std::fmt::Display for PruneStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Prune Complete ===")?;
        writeln!(f, "Papers deleted:  {}", self.papers_deleted)?;
        writeln!(f, "Authors deleted: {}", self.authors_deleted)?;
        write!(f, "Batches:         {}", self.batches)
    }
}

/// Deletes low-cited papers, then the authors they leave behind.
///
/// Each batch is its own store call. A loop ends when a batch deletes fewer
/// than `batch_size` nodes. An error stops only the entity type it hit.
pub struct Pruner {
    store: Arc<dyn GraphStore>,
}

impl Pruner {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn prune(&self, min_citation_count: u64, batch_size: usize) -> Result<PruneStats> {
        if batch_size == 0 {
            return Err(CiteGraphError::Validation("prune batch size must be at least 1".into()).into());
        }
        let mut stats = PruneStats::default();
        info!(min_citation_count, batch_size, "Pruning low-cited papers");

        let (papers, batches, ok) = delete_in_batches(NodeLabel::Paper, batch_size, move || {
            self.store.delete_papers_cited_below(min_citation_count, batch_size)
        })
        .await;
        stats.papers_deleted = papers;
        stats.batches += batches;
        if !ok {
            stats.aborted.push(NodeLabel::Paper);
        }

        let (authors, batches, ok) =
            delete_in_batches(NodeLabel::Author, batch_size, move || self.store.delete_orphan_authors(batch_size)).await;
        stats.authors_deleted = authors;
        stats.batches += batches;
        if !ok {
            stats.aborted.push(NodeLabel::Author);
        }

        info!(papers = stats.papers_deleted, authors = stats.authors_deleted, "Prune finished");
        Ok(stats)
    }
}

/// Returns (deleted, batches run, finished without error).
async fn delete_in_batches<F, Fut>(label: NodeLabel, batch_size: usize, mut delete: F) -> (u64, usize, bool)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64, GraphError>>,
{
    let mut total = 0;
    let mut batches = 0;
    loop {
        match delete().await {
            Ok(n) => {
                batches += 1;
                total += n;
                info!(%label, batch = batches, deleted = n, total, "Deleted batch");
                if n < batch_size as u64 {
                    return (total, batches, true);
                }
            }
            Err(e) => {
                warn!(%label, batch = batches + 1, error = %e, total, "Delete batch failed, stopping for this label");
                return (total, batches, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use citegraph_graph::{MemoryGraph, MergeEngine};

    use super::*;
    use crate::testing::{record_by, record_cited};

    async fn seeded() -> Arc<MemoryGraph> {
        let graph = Arc::new(MemoryGraph::new());
        MergeEngine::new(graph.clone())
            .merge(
                &[
                    record_by("W1", 0, &["Ada"]),
                    record_by("W2", 4, &["Ada", "Bea"]),
                    record_by("W3", 5, &["Bea"]),
                    record_by("W4", 40, &["Cy"]),
                    record_cited("W5", 1),
                ],
                true,
            )
            .await
            .unwrap();
        graph
    }

    #[tokio::test]
    async fn deletes_exactly_the_low_cited_and_their_orphans() {
        let graph = seeded().await;

        let stats = Pruner::new(graph.clone()).prune(5, 2).await.unwrap();

        assert_eq!(stats.papers_deleted, 3);
        assert_eq!(stats.authors_deleted, 1);
        assert_eq!(stats.status(), RunStatus::Completed);
        let papers: Vec<String> = graph.snapshot().papers.keys().cloned().collect();
        assert_eq!(papers, vec!["W3", "W4"]);
        assert_eq!(graph.count(NodeLabel::Author), 2);
    }

    #[tokio::test]
    async fn loops_until_a_partial_batch() {
        let graph = seeded().await;
        let stats = Pruner::new(graph).prune(5, 1).await.unwrap();
        // 3 full paper batches + 1 empty, 1 full author batch + 1 empty
        assert_eq!(stats.batches, 6);
    }

    #[tokio::test]
    async fn error_stops_only_the_current_label() {
        let graph = seeded().await;
        graph.fail_deletes_after(1);

        let stats = Pruner::new(graph.clone()).prune(5, 2).await.unwrap();

        assert_eq!(stats.papers_deleted, 2);
        assert_eq!(stats.aborted, vec![NodeLabel::Paper, NodeLabel::Author]);
        assert_eq!(stats.status(), RunStatus::PartialFailure);
        assert_eq!(graph.count(NodeLabel::Paper), 3);
    }

    #[tokio::test]
    async fn nothing_below_threshold_is_no_work() {
        let graph = seeded().await;
        let stats = Pruner::new(graph).prune(0, 500).await.unwrap();
        assert_eq!(stats.status(), RunStatus::NoWork);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let graph = seeded().await;
        assert!(Pruner::new(graph).prune(5, 0).await.is_err());
    }
}
