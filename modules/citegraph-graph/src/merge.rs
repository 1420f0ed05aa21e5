use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use citegraph_common::CondensedRecord;

use crate::error::GraphError;
use crate::plan::MergePlan;
use crate::store::GraphStore;

/// A batch the store refused. None of its writes were committed; the caller
/// decides where the records go for replay.
#[derive(Debug, Error)]
#[error("merge of {} record(s) failed: {source}", .record_ids.len())]
pub struct BatchFailed {
    pub record_ids: Vec<String>,
    #[source]
    pub source: GraphError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub records: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Idempotent batched upsert of condensed records into the graph.
///
/// Every write is a natural-key upsert, so re-merging a record is harmless and
/// records within a batch can be applied in any order. There is no internal
/// retry: a failed batch is reported and the caller moves on.
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn GraphStore>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub async fn merge(
        &self,
        batch: &[CondensedRecord],
        include_citation_edges: bool,
    ) -> Result<MergeSummary, BatchFailed> {
        let plan = MergePlan::from_batch(batch, include_citation_edges);
        let summary = MergeSummary {
            records: batch.len(),
            nodes: plan.nodes.len(),
            edges: plan.edges.len(),
        };

        match self.store.apply(&plan).await {
            Ok(()) => {
                debug!(records = summary.records, nodes = summary.nodes, edges = summary.edges, "Merged batch");
                Ok(summary)
            }
            Err(source) => {
                warn!(records = batch.len(), error = %source, "Batch merge failed");
                Err(BatchFailed {
                    record_ids: batch.iter().map(|r| r.id.clone()).collect(),
                    source,
                })
            }
        }
    }
}
