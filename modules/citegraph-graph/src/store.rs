use async_trait::async_trait;

use crate::error::GraphError;
use crate::plan::MergePlan;

/// The graph operations the ingestion pipeline depends on.
///
/// Writes go through [`MergePlan`]s, which are natural-key upserts only, so the
/// pipeline never handles store-internal ids. Every method is one short unit of
/// work against the store; implementations must not hold a session open
/// between calls.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply every write in the plan as one atomic unit.
    async fn apply(&self, plan: &MergePlan) -> Result<(), GraphError>;

    /// Up to `limit` ids of `paper` nodes still in the stub state.
    async fn stub_paper_ids(&self, limit: usize) -> Result<Vec<String>, GraphError>;

    /// Delete the given papers (and their edges) if they are still stubs.
    /// Returns how many were deleted.
    async fn delete_stub_papers(&self, ids: &[String]) -> Result<u64, GraphError>;

    /// Delete up to `limit` papers whose `cited_by_count` is below `min_count`.
    async fn delete_papers_cited_below(&self, min_count: u64, limit: usize) -> Result<u64, GraphError>;

    /// Delete up to `limit` authors with no remaining `has_author` edge.
    async fn delete_orphan_authors(&self, limit: usize) -> Result<u64, GraphError>;
}
