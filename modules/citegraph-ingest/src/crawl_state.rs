//! Persisted per-concept crawl frontiers and in-flight cursors.
//!
//! The document is the only record of how far each concept has been crawled.
//! It is read once at the start of a crawl and written back atomically at the
//! end, so a crash mid-crawl leaves the previous version intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use citegraph_common::CiteGraphError;
use openalex_client::MAX_PER_PAGE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// Newer than `latest_fetched_date`.
    Forward,
    /// Older than `earliest_fetched_date`, down to `start_date`.
    Backward,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Inclusive publication-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlState {
    pub page_size: u32,
    pub date_delta: u32,
    #[serde(default)]
    pub concepts: BTreeMap<String, ConceptState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptState {
    pub concept_id: String,
    pub start_date: NaiveDate,
    pub earliest_fetched_date: NaiveDate,
    pub latest_fetched_date: NaiveDate,
    /// Window start → cursor for windows that still have pages left.
    #[serde(default)]
    pub cursors: BTreeMap<NaiveDate, String>,
}

impl CrawlState {
    pub fn validate(&self) -> Result<(), CiteGraphError> {
        if self.page_size == 0 || self.page_size > MAX_PER_PAGE {
            return Err(CiteGraphError::Config(format!(
                "page_size must be within 1..={MAX_PER_PAGE}, got {}",
                self.page_size
            )));
        }
        if self.date_delta == 0 {
            return Err(CiteGraphError::Config("date_delta must be at least 1".into()));
        }
        for (name, concept) in &self.concepts {
            if concept.concept_id.trim().is_empty() {
                return Err(CiteGraphError::Config(format!("concept {name} has no concept_id")));
            }
            if !(concept.start_date <= concept.earliest_fetched_date
                && concept.earliest_fetched_date <= concept.latest_fetched_date)
            {
                return Err(CiteGraphError::Config(format!(
                    "concept {name}: expected start_date <= earliest_fetched_date <= latest_fetched_date, got {} / {} / {}",
                    concept.start_date, concept.earliest_fetched_date, concept.latest_fetched_date
                )));
            }
        }
        Ok(())
    }
}

impl ConceptState {
    /// The next window to crawl, or `None` when there is nothing left in that
    /// direction (backfill reached `start_date`).
    pub fn next_window(&self, direction: Direction, date_delta: u32) -> Option<Window> {
        let delta = u64::from(date_delta.max(1));
        match direction {
            Direction::Forward => {
                let from = self.latest_fetched_date.checked_add_days(Days::new(1))?;
                let to = self.latest_fetched_date.checked_add_days(Days::new(delta))?;
                Some(Window { from, to })
            }
            Direction::Backward => {
                if self.earliest_fetched_date <= self.start_date {
                    return None;
                }
                let from = self
                    .earliest_fetched_date
                    .checked_sub_days(Days::new(delta))
                    .map_or(self.start_date, |d| d.max(self.start_date));
                let to = self.earliest_fetched_date.checked_sub_days(Days::new(1))?;
                Some(Window { from, to })
            }
        }
    }

    pub fn cursor_for(&self, window: &Window) -> Option<&str> {
        self.cursors.get(&window.from).map(String::as_str)
    }

    pub fn pause_window(&mut self, window: &Window, cursor: String) {
        self.cursors.insert(window.from, cursor);
    }

    /// Drop the window's cursor and move the frontier to the window's far edge.
    pub fn complete_window(&mut self, direction: Direction, window: &Window) {
        self.cursors.remove(&window.from);
        match direction {
            Direction::Forward => self.latest_fetched_date = window.to,
            Direction::Backward => self.earliest_fetched_date = window.from,
        }
    }
}

/// Loads and atomically saves the crawl-state document.
#[derive(Debug, Clone)]
pub struct CrawlStateStore {
    path: PathBuf,
}

impl CrawlStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CrawlState, CiteGraphError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CiteGraphError::Config(format!(
                    "crawl state not found at {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let state: CrawlState = serde_json::from_str(&content).map_err(|e| {
            CiteGraphError::Config(format!("invalid crawl state {}: {e}", self.path.display()))
        })?;
        state.validate()?;
        Ok(state)
    }

    /// Write to a temp file beside the target, then rename over it.
    pub fn save(&self, state: &CrawlState) -> Result<(), CiteGraphError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), "Crawl state saved");
        Ok(())
    }
}
