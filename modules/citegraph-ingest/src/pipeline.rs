use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::crawl_state::Direction;
use crate::crawler::Crawler;
use crate::import::Importer;
use crate::outcome::RunStatus;
use crate::reconcile::StubReconciler;

/// Crawl, import, then reconcile until no stubs remain, the reconciler stops
/// early, or `max_passes` is reached.
pub struct Pipeline {
    pub crawler: Crawler,
    pub importer: Importer,
    pub reconciler: StubReconciler,
    pub max_stubs: usize,
    pub max_passes: usize,
}

impl Pipeline {
    pub async fn run(&self, direction: Direction, today: NaiveDate) -> Result<RunStatus> {
        let crawl = self.crawler.run_as_of(direction, today).await?;
        info!("{crawl}");
        let mut status = crawl.status();

        let import = self.importer.drain().await?;
        info!("{import}");
        status = status.combine(import.status());

        for pass in 1..=self.max_passes {
            let stats = self.reconciler.reconcile(self.max_stubs).await?;
            info!(pass, "{stats}");
            status = status.combine(stats.status());
            if stats.status() == RunStatus::NoWork || stats.stopped_early {
                break;
            }
        }

        info!(%status, "Pipeline finished");
        Ok(status)
    }
}
