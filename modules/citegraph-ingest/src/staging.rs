//! Append-only JSONL logs: the staging log the crawler feeds and the
//! failed-batch log the importer spills into.
//!
//! One condensed record per line. Appends are flushed and synced before
//! returning so the crawler can advance its state afterwards. A log is only
//! ever truncated as a whole, after every batch read from it was attempted.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use citegraph_common::{CiteGraphError, CondensedRecord};

#[derive(Debug, Clone)]
pub struct StagingLog {
    path: PathBuf,
}

impl StagingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[CondensedRecord]) -> Result<(), CiteGraphError> {
        let lines = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.append_lines(&lines)
    }

    /// Append pre-serialized lines, e.g. unparseable input routed aside verbatim.
    pub fn append_lines(&self, lines: &[String]) -> Result<(), CiteGraphError> {
        if lines.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut buf = String::new();
        for line in lines {
            buf.push_str(line.trim_end_matches('\n'));
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Every non-blank line, in append order. A missing file reads as empty.
    pub fn read_lines(&self) -> Result<Vec<String>, CiteGraphError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    pub fn truncate(&self) -> Result<(), CiteGraphError> {
        match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(file) => {
                file.sync_data()?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the log's current contents to `<path>.replay` and return a handle
    /// to that file. New appends then start a fresh log at the original path.
    /// Leftovers from an interrupted replay are merged in first.
    pub fn take_aside(&self) -> Result<StagingLog, CiteGraphError> {
        let mut aside_path = self.path.clone().into_os_string();
        aside_path.push(".replay");
        let aside = StagingLog::new(aside_path);

        let pending = self.read_lines()?;
        aside.append_lines(&pending)?;
        self.truncate()?;
        Ok(aside)
    }

    pub fn remove(&self) -> Result<(), CiteGraphError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[test]
    fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = StagingLog::new(dir.path().join("nested/papers.jsonl"));

        log.append(&[record("W1"), record("W2")]).unwrap();
        log.append(&[record("W3")]).unwrap();

        let ids: Vec<String> = log
            .read_lines()
            .unwrap()
            .iter()
            .map(|l| serde_json::from_str::<CondensedRecord>(l).unwrap().id)
            .collect();
        assert_eq!(ids, vec!["W1", "W2", "W3"]);
    }

    #[test]
    fn missing_log_reads_empty_and_truncates_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let log = StagingLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_lines().unwrap().is_empty());
        log.truncate().unwrap();
        log.remove().unwrap();
    }

    #[test]
    fn truncate_empties_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = StagingLog::new(dir.path().join("papers.jsonl"));
        log.append(&[record("W1")]).unwrap();
        log.truncate().unwrap();
        assert!(log.read_lines().unwrap().is_empty());
    }

    #[test]
    fn take_aside_moves_contents_and_frees_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let log = StagingLog::new(dir.path().join("failed_papers.jsonl"));
        log.append_lines(&["{broken".to_string()]).unwrap();
        log.append(&[record("W1")]).unwrap();

        let aside = log.take_aside().unwrap();

        assert!(log.read_lines().unwrap().is_empty());
        assert_eq!(aside.read_lines().unwrap().len(), 2);
        assert!(aside.path().to_string_lossy().ends_with("failed_papers.jsonl.replay"));
    }
}
