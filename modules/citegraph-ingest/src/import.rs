use anyhow::{Context, Result};
use tracing::{info, warn};

use citegraph_common::{CiteGraphError, CondensedRecord};
use citegraph_graph::MergeEngine;

use crate::outcome::RunStatus;
use crate::staging::StagingLog;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub lines: usize,
    pub imported: usize,
    pub failed: usize,
    pub unparseable: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

impl ImportStats {
    pub fn status(&self) -> RunStatus {
        if self.lines == 0 {
            RunStatus::NoWork
        } else if self.failed > 0 || self.unparseable > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Completed
        }
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Import Complete ===")?;
        writeln!(f, "Records imported: {}", self.imported)?;
        writeln!(f, "Records failed:   {} ({} batches)", self.failed, self.failed_batches)?;
        write!(f, "Unparseable:      {}", self.unparseable)
    }
}

/// Drains a JSONL log of condensed records into the graph in fixed-size
/// batches. Failed batches go to the failed log and the drain continues; the
/// source log is truncated only once every batch has been attempted.
pub struct Importer {
    engine: MergeEngine,
    staging: StagingLog,
    failed: StagingLog,
    batch_size: usize,
}

impl Importer {
    pub fn new(engine: MergeEngine, staging: StagingLog, failed: StagingLog, batch_size: usize) -> Self {
        Self {
            engine,
            staging,
            failed,
            batch_size,
        }
    }

    pub async fn drain(&self) -> Result<ImportStats> {
        self.drain_log(&self.staging).await
    }

    /// Re-import the failed log. Its contents are moved aside first so this
    /// run's failures land in a fresh failed log.
    pub async fn replay_failed(&self) -> Result<ImportStats> {
        let aside = self.failed.take_aside().context("moving failed log aside")?;
        let stats = self.drain_log(&aside).await?;
        aside.remove()?;
        Ok(stats)
    }

    async fn drain_log(&self, log: &StagingLog) -> Result<ImportStats> {
        if self.batch_size == 0 {
            return Err(CiteGraphError::Validation("import batch size must be at least 1".into()).into());
        }
        let lines = log
            .read_lines()
            .with_context(|| format!("reading {}", log.path().display()))?;
        let mut stats = ImportStats {
            lines: lines.len(),
            ..Default::default()
        };
        if lines.is_empty() {
            info!(path = %log.path().display(), "Nothing to import");
            return Ok(stats);
        }

        let mut records = Vec::with_capacity(lines.len());
        let mut unparseable = Vec::new();
        for line in lines {
            match serde_json::from_str::<CondensedRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(error = %e, "Unparseable staged line, moving to failed log");
                    unparseable.push(line);
                }
            }
        }
        stats.unparseable = unparseable.len();
        self.failed.append_lines(&unparseable)?;

        info!(records = records.len(), batch_size = self.batch_size, "Importing staged records");
        for (i, batch) in records.chunks(self.batch_size).enumerate() {
            stats.batches += 1;
            match self.engine.merge(batch, true).await {
                Ok(_) => stats.imported += batch.len(),
                Err(e) => {
                    warn!(batch = i, records = batch.len(), error = %e, "Batch failed, saved for replay");
                    self.failed
                        .append(batch)
                        .with_context(|| format!("saving failed batch {i}"))?;
                    stats.failed += batch.len();
                    stats.failed_batches += 1;
                }
            }
        }

        log.truncate()?;
        info!(imported = stats.imported, failed = stats.failed, "Import finished");
        Ok(stats)
    }
}
