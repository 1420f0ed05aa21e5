// Test doubles and fixtures for the ingest pipeline.
//
// MockWorksSource stands in for upstream behind the WorksSource trait:
// - concept windows answer from pages registered per (concept, window start, cursor);
//   unregistered windows come back empty with no cursor
// - id lookups answer from a map of registered works, paginated by cursor
// - failures can be injected per concept or for all id lookups
// Every query is recorded for assertions.
//
// The graph side uses citegraph_graph::MemoryGraph directly.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use citegraph_common::{AuthorEntry, Citations, CondensedRecord};
use openalex_client::{bare_id, OpenAlexError, WorksFilter, WorksPage, WorksQuery};

use crate::traits::WorksSource;

// ---------------------------------------------------------------------------
// MockWorksSource
// ---------------------------------------------------------------------------

type WindowKey = (String, NaiveDate, Option<String>);

#[derive(Default)]
pub struct MockWorksSource {
    windows: HashMap<WindowKey, WorksPage>,
    failing_concepts: HashSet<String>,
    works: BTreeMap<String, Value>,
    fail_id_lookups: bool,
    lookup_page_size: Option<usize>,
    extra_lookup_results: Vec<Value>,
    endless_lookup_cursor: bool,
    calls: Mutex<Vec<WorksQuery>>,
}

impl MockWorksSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for one page of a concept window. `cursor` is the cursor the
    /// crawler sends (`None` for the first page).
    pub fn on_window(mut self, concept_id: &str, from: NaiveDate, cursor: Option<&str>, page: WorksPage) -> Self {
        self.windows
            .insert((concept_id.to_string(), from, cursor.map(str::to_string)), page);
        self
    }

    pub fn fail_concept(mut self, concept_id: &str) -> Self {
        self.failing_concepts.insert(concept_id.to_string());
        self
    }

    /// Register a raw work for id lookups, keyed by its bare id.
    pub fn with_work(mut self, raw: Value) -> Self {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(|s| bare_id(s).to_string())
            .unwrap_or_default();
        self.works.insert(id, raw);
        self
    }

    pub fn fail_id_lookups(mut self) -> Self {
        self.fail_id_lookups = true;
        self
    }

    /// Cap id-lookup pages below the requested `per-page` to force paging.
    pub fn with_lookup_page_size(mut self, size: usize) -> Self {
        self.lookup_page_size = Some(size.max(1));
        self
    }

    /// Put a result for an id nobody asked for at the head of every id
    /// lookup, the way upstream answers for merged works.
    pub fn with_extra_lookup_result(mut self, raw: Value) -> Self {
        self.extra_lookup_results.push(raw);
        self
    }

    /// Keep handing out a cursor on id lookups even past the last result.
    pub fn with_endless_lookup_cursor(mut self) -> Self {
        self.endless_lookup_cursor = true;
        self
    }

    pub fn calls(&self) -> Vec<WorksQuery> {
        self.calls.lock().unwrap().clone()
    }

    fn window_page(&self, concept_id: &str, from: NaiveDate, cursor: Option<&String>) -> Result<WorksPage, OpenAlexError> {
        if self.failing_concepts.contains(concept_id) {
            return Err(OpenAlexError::Api {
                status: 503,
                message: "Service Unavailable".into(),
            });
        }
        let key = (concept_id.to_string(), from, cursor.cloned());
        Ok(self.windows.get(&key).cloned().unwrap_or_default())
    }

    fn lookup_page(&self, ids: &[String], per_page: usize, cursor: Option<&String>) -> Result<WorksPage, OpenAlexError> {
        if self.fail_id_lookups {
            return Err(OpenAlexError::Api {
                status: 429,
                message: "Too Many Requests".into(),
            });
        }
        let matches: Vec<&Value> = self
            .extra_lookup_results
            .iter()
            .chain(ids.iter().filter_map(|id| self.works.get(id)))
            .collect();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let size = self.lookup_page_size.unwrap_or(per_page).max(1);
        let end = (offset + size).min(matches.len());
        let results = matches
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|v| (*v).clone())
            .collect();
        Ok(WorksPage {
            results,
            next_cursor: (self.endless_lookup_cursor || end < matches.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl WorksSource for MockWorksSource {
    async fn works(&self, query: &WorksQuery) -> Result<WorksPage, OpenAlexError> {
        self.calls.lock().unwrap().push(query.clone());
        match &query.filter {
            WorksFilter::ConceptWindow { concept_id, from, .. } => {
                self.window_page(concept_id, *from, query.cursor.as_ref())
            }
            WorksFilter::Ids(ids) => self.lookup_page(ids, query.per_page as usize, query.cursor.as_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw upstream fixtures
// ---------------------------------------------------------------------------

pub fn page(results: Vec<Value>, next_cursor: Option<&str>) -> WorksPage {
    WorksPage {
        results,
        next_cursor: next_cursor.map(str::to_string),
    }
}

pub fn raw_work(id: &str, title: &str) -> Value {
    raw_work_citing(id, title, &[])
}

pub fn raw_work_citing(id: &str, title: &str, references: &[&str]) -> Value {
    json!({
        "id": format!("https://openalex.org/{id}"),
        "doi": format!("https://doi.org/10.1000/{}", id.to_lowercase()),
        "title": title,
        "type": "article",
        "publication_date": "2024-03-12",
        "cited_by_count": 12,
        "authorships": [
            {"author": {"display_name": "Ada Lovelace"}, "institutions": [{"display_name": "University of London"}]}
        ],
        "primary_location": {"source": {"display_name": "Journal of Testing"}},
        "biblio": {"volume": "3", "issue": "1", "first_page": "10", "last_page": "19"},
        "referenced_works": references
            .iter()
            .map(|r| format!("https://openalex.org/{r}"))
            .collect::<Vec<_>>(),
        "keywords": [{"display_name": "graphs"}],
        "abstract_inverted_index": {"hello": [0]}
    })
}

/// What upstream returns for a work it knows nothing about beyond its id.
pub fn raw_identity_only(id: &str) -> Value {
    json!({ "id": format!("https://openalex.org/{id}") })
}

// ---------------------------------------------------------------------------
// Condensed record fixtures
// ---------------------------------------------------------------------------

pub fn record(id: &str) -> CondensedRecord {
    CondensedRecord {
        id: id.to_string(),
        title: Some(format!("Paper {id}")),
        doi: None,
        work_type: Some("article".into()),
        authors: vec![],
        full_text_url: None,
        publication: None,
        citations: Citations::default(),
        keywords: vec![],
        primary_topic: None,
        abstract_inverted_index: None,
    }
}

pub fn record_citing(id: &str, references: &[&str]) -> CondensedRecord {
    let mut r = record(id);
    r.citations.referenced_works = references.iter().map(|s| s.to_string()).collect();
    r
}

pub fn record_cited(id: &str, cited_by_count: u64) -> CondensedRecord {
    let mut r = record(id);
    r.citations.count = cited_by_count;
    r
}

pub fn record_by(id: &str, cited_by_count: u64, authors: &[&str]) -> CondensedRecord {
    let mut r = record_cited(id, cited_by_count);
    r.authors = authors
        .iter()
        .map(|name| AuthorEntry {
            name: name.to_string(),
            affiliations: Default::default(),
        })
        .collect();
    r
}
