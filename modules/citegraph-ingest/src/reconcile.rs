use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use citegraph_common::{CiteGraphError, CondensedRecord};
use citegraph_graph::MergeEngine;
use openalex_client::{bare_id, OpenAlexError, WorksFilter, WorksQuery, MAX_IDS_PER_FILTER};

use crate::normalize::{is_identity_only, normalize};
use crate::outcome::RunStatus;
use crate::traits::WorksSource;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub stubs_found: usize,
    pub filled: usize,
    pub deleted: u64,
    pub lookup_failures: usize,
    pub merge_failures: usize,
    /// A whole lookup batch came back without a single usable record.
    pub stopped_early: bool,
}

impl ReconcileStats {
    pub fn status(&self) -> RunStatus {
        if self.stubs_found == 0 {
            RunStatus::NoWork
        } else if self.lookup_failures > 0 || self.merge_failures > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Completed
        }
    }
}

impl std::fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Reconcile Complete ===")?;
        writeln!(f, "Stubs found:     {}", self.stubs_found)?;
        writeln!(f, "Stubs filled:    {}", self.filled)?;
        writeln!(f, "Stubs deleted:   {}", self.deleted)?;
        writeln!(f, "Lookup failures: {}", self.lookup_failures)?;
        writeln!(f, "Merge failures:  {}", self.merge_failures)?;
        write!(f, "Stopped early:   {}", self.stopped_early)
    }
}

/// What one lookup batch resolved to.
#[derive(Debug, Default)]
struct Resolution {
    usable: Vec<CondensedRecord>,
    dead: Vec<String>,
}

/// Fills stub papers from upstream or deletes the ones upstream cannot
/// describe.
///
/// Reconciled records are merged without citation edges, so filling a stub
/// never creates new ones.
pub struct StubReconciler {
    source: Arc<dyn WorksSource>,
    engine: MergeEngine,
    lookup_batch: usize,
}

impl StubReconciler {
    pub fn new(source: Arc<dyn WorksSource>, engine: MergeEngine, lookup_batch: usize) -> Self {
        Self {
            source,
            engine,
            lookup_batch,
        }
    }

    pub async fn reconcile(&self, max_stubs: usize) -> Result<ReconcileStats> {
        if self.lookup_batch == 0 || self.lookup_batch > MAX_IDS_PER_FILTER {
            return Err(CiteGraphError::Validation(format!(
                "lookup batch must be within 1..={MAX_IDS_PER_FILTER}, got {}",
                self.lookup_batch
            ))
            .into());
        }

        let store = self.engine.store();
        let stubs = store
            .stub_paper_ids(max_stubs)
            .await
            .context("selecting stub papers")?;
        let mut stats = ReconcileStats {
            stubs_found: stubs.len(),
            ..Default::default()
        };
        info!(stubs = stubs.len(), max_stubs, "Reconciling stub papers");

        for (i, batch) in stubs.chunks(self.lookup_batch).enumerate() {
            let found = match self.lookup(batch).await {
                Ok(found) => found,
                Err(e) => {
                    // Incomplete answers can't tell dead ids from live ones; leave the batch alone.
                    warn!(batch = i, ids = batch.len(), error = %e, "Stub lookup failed, skipping batch");
                    stats.lookup_failures += 1;
                    continue;
                }
            };
            let resolution = resolve(batch, &found);
            let stop = resolution.usable.is_empty();

            if !resolution.usable.is_empty() {
                match self.engine.merge(&resolution.usable, false).await {
                    Ok(_) => stats.filled += resolution.usable.len(),
                    Err(e) => {
                        warn!(batch = i, error = %e, "Filling stubs failed");
                        stats.merge_failures += 1;
                    }
                }
            }
            if !resolution.dead.is_empty() {
                let deleted = store
                    .delete_stub_papers(&resolution.dead)
                    .await
                    .context("deleting unresolvable stubs")?;
                info!(batch = i, deleted, "Deleted unresolvable stubs");
                stats.deleted += deleted;
            }

            if stop {
                warn!(batch = i, "No usable metadata in lookup batch, stopping early");
                stats.stopped_early = true;
                break;
            }
        }

        info!(
            filled = stats.filled,
            deleted = stats.deleted,
            stopped_early = stats.stopped_early,
            "Reconcile finished"
        );
        Ok(stats)
    }

    /// Page through an id lookup until every requested id was seen, upstream
    /// runs out of pages, or a page brings no requested id not seen before.
    async fn lookup(&self, ids: &[String]) -> Result<Vec<Value>, OpenAlexError> {
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut query = WorksQuery::new(WorksFilter::Ids(ids.to_vec()), ids.len() as u32);
        let mut found = Vec::new();
        loop {
            let page = self.source.works(&query).await?;
            let before = seen.len();
            for raw in &page.results {
                if let Some(id) = raw.get("id").and_then(Value::as_str).map(bare_id) {
                    if wanted.contains(id) {
                        seen.insert(id.to_string());
                    }
                }
            }
            let progressed = seen.len() > before;
            found.extend(page.results);

            match page.next_cursor {
                Some(cursor) if progressed && seen.len() < wanted.len() => {
                    query = query.with_cursor(Some(cursor));
                }
                Some(_) if !progressed => {
                    debug!(requested = wanted.len(), seen = seen.len(), "Lookup page added no requested ids, stop paging");
                    break;
                }
                _ => break,
            }
        }
        debug!(requested = ids.len(), returned = found.len(), "Stub lookup complete");
        Ok(found)
    }
}

/// Split a lookup answer into records worth merging and stub ids to delete.
/// Requested ids that never came back are dead, as are results carrying only
/// an identity. Results for ids that were not requested are ignored.
fn resolve(requested: &[String], found: &[Value]) -> Resolution {
    let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    let mut resolution = Resolution::default();

    for raw in found {
        let Some(id) = raw.get("id").and_then(Value::as_str).map(bare_id) else {
            continue;
        };
        if !wanted.contains(id) || !seen.insert(id.to_string()) {
            continue;
        }
        if is_identity_only(raw) {
            resolution.dead.push(id.to_string());
            continue;
        }
        match normalize(raw) {
            Ok(record) if record.has_metadata() => resolution.usable.push(record),
            _ => resolution.dead.push(id.to_string()),
        }
    }

    resolution.dead.extend(
        requested
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned(),
    );
    resolution
}
