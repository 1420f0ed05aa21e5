use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use citegraph_common::{CiteGraphError, CondensedRecord};
use openalex_client::{OpenAlexError, WorksFilter, WorksQuery};

use crate::crawl_state::{ConceptState, CrawlStateStore, Direction, Window};
use crate::normalize::normalize;
use crate::outcome::RunStatus;
use crate::staging::StagingLog;
use crate::traits::WorksSource;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlStats {
    pub records_staged: usize,
    pub records_rejected: usize,
    pub windows_completed: usize,
    pub windows_paused: usize,
    /// Concepts with nothing left to crawl in this direction.
    pub concepts_idle: usize,
    pub concepts_failed: Vec<String>,
}

impl CrawlStats {
    pub fn status(&self) -> RunStatus {
        if !self.concepts_failed.is_empty() {
            RunStatus::PartialFailure
        } else if self.windows_completed == 0 && self.windows_paused == 0 {
            RunStatus::NoWork
        } else {
            RunStatus::Completed
        }
    }
}

impl std::fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Crawl Complete ===")?;
        writeln!(f, "Records staged:    {}", self.records_staged)?;
        writeln!(f, "Records rejected:  {}", self.records_rejected)?;
        writeln!(f, "Windows completed: {}", self.windows_completed)?;
        writeln!(f, "Windows paused:    {}", self.windows_paused)?;
        writeln!(f, "Concepts idle:     {}", self.concepts_idle)?;
        write!(f, "Concepts failed:   {}", self.concepts_failed.len())
    }
}

enum ConceptOutcome {
    Idle,
    Paused { staged: usize, rejected: usize },
    Completed { staged: usize, rejected: usize },
}

enum ConceptError {
    Upstream(OpenAlexError),
    Staging(CiteGraphError),
}

/// Walks each concept's date axis one page per invocation.
///
/// Records are appended to the staging log before the concept's state is
/// touched, and the state document is saved once at the end. A concept whose
/// upstream call fails keeps its previous state; the others still advance.
pub struct Crawler {
    source: Arc<dyn WorksSource>,
    staging: StagingLog,
    state_store: CrawlStateStore,
}

impl Crawler {
    pub fn new(source: Arc<dyn WorksSource>, staging: StagingLog, state_store: CrawlStateStore) -> Self {
        Self {
            source,
            staging,
            state_store,
        }
    }

    pub async fn run(&self, direction: Direction) -> Result<CrawlStats> {
        self.run_as_of(direction, Utc::now().date_naive()).await
    }

    /// Forward windows reaching `today` or later are left alone until they
    /// lie entirely in the past, so the frontier never runs ahead of upstream.
    pub async fn run_as_of(&self, direction: Direction, today: NaiveDate) -> Result<CrawlStats> {
        let mut state = self
            .state_store
            .load()
            .with_context(|| format!("loading crawl state from {}", self.state_store.path().display()))?;
        let (page_size, date_delta) = (state.page_size, state.date_delta);
        let mut stats = CrawlStats::default();

        info!(%direction, concepts = state.concepts.len(), page_size, date_delta, "Starting crawl");

        let names: Vec<String> = state.concepts.keys().cloned().collect();
        for name in names {
            let Some(concept) = state.concepts.get_mut(&name) else {
                continue;
            };
            let outcome = self
                .crawl_concept(&name, concept, direction, page_size, date_delta, today)
                .await;
            match outcome {
                Ok(ConceptOutcome::Idle) => stats.concepts_idle += 1,
                Ok(ConceptOutcome::Paused { staged, rejected }) => {
                    stats.records_staged += staged;
                    stats.records_rejected += rejected;
                    stats.windows_paused += 1;
                }
                Ok(ConceptOutcome::Completed { staged, rejected }) => {
                    stats.records_staged += staged;
                    stats.records_rejected += rejected;
                    stats.windows_completed += 1;
                }
                Err(ConceptError::Upstream(e)) => {
                    warn!(concept = name.as_str(), error = %e, transient = e.is_transient(), "Upstream fetch failed, concept not advanced");
                    stats.concepts_failed.push(name.clone());
                }
                Err(ConceptError::Staging(e)) => {
                    // Keep what the earlier concepts already staged and advanced.
                    self.state_store.save(&state)?;
                    return Err(anyhow::Error::new(e).context(format!("staging records for concept {name}")));
                }
            }
        }

        self.state_store.save(&state)?;
        info!(
            staged = stats.records_staged,
            completed = stats.windows_completed,
            paused = stats.windows_paused,
            failed = stats.concepts_failed.len(),
            "Crawl finished"
        );
        Ok(stats)
    }

    async fn crawl_concept(
        &self,
        name: &str,
        concept: &mut ConceptState,
        direction: Direction,
        page_size: u32,
        date_delta: u32,
        today: NaiveDate,
    ) -> Result<ConceptOutcome, ConceptError> {
        let Some(window) = concept.next_window(direction, date_delta) else {
            info!(concept = name, start_date = %concept.start_date, "Backfill complete");
            return Ok(ConceptOutcome::Idle);
        };
        if direction == Direction::Forward && window.to >= today {
            info!(concept = name, to = %window.to, "Forward window not yet closed, skipping");
            return Ok(ConceptOutcome::Idle);
        }

        let query = window_query(concept, &window, page_size);
        let resumed = query.cursor.is_some();
        let page = self.source.works(&query).await.map_err(ConceptError::Upstream)?;

        let fetched = page.results.len();
        let mut records: Vec<CondensedRecord> = Vec::with_capacity(fetched);
        let mut rejected = 0;
        for raw in &page.results {
            match normalize(raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    rejected += 1;
                    warn!(concept = name, error = %e, "Skipping malformed record");
                }
            }
        }
        self.staging.append(&records).map_err(ConceptError::Staging)?;
        let staged = records.len();

        let full_page = fetched >= page_size as usize;
        match page.next_cursor {
            Some(cursor) if full_page => {
                info!(concept = name, from = %window.from, to = %window.to, staged, resumed, "Window has more pages, cursor saved");
                concept.pause_window(&window, cursor);
                Ok(ConceptOutcome::Paused { staged, rejected })
            }
            _ => {
                concept.complete_window(direction, &window);
                info!(concept = name, from = %window.from, to = %window.to, staged, resumed, "Window complete");
                Ok(ConceptOutcome::Completed { staged, rejected })
            }
        }
    }
}

fn window_query(concept: &ConceptState, window: &Window, page_size: u32) -> WorksQuery {
    let filter = WorksFilter::ConceptWindow {
        concept_id: concept.concept_id.clone(),
        from: window.from,
        to: window.to,
    };
    WorksQuery::new(filter, page_size).with_cursor(concept.cursor_for(window).map(str::to_string))
}
