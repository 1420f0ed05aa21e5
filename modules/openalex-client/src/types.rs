use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{OpenAlexError, Result};

/// Upper bound on `per-page` accepted by the works endpoint.
pub const MAX_PER_PAGE: u32 = 200;

/// Upper bound on ids in a single `openalex:` OR filter.
pub const MAX_IDS_PER_FILTER: usize = 100;

/// Cursor value that starts a fresh cursor-paginated listing.
pub const START_CURSOR: &str = "*";

// --- Query types ---

/// What a works listing is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorksFilter {
    /// Works tagged with a concept and published inside an inclusive date range.
    ConceptWindow {
        concept_id: String,
        from: NaiveDate,
        to: NaiveDate,
    },
    /// Works with one of the given bare ids (e.g. `W2741809807`).
    Ids(Vec<String>),
}

impl WorksFilter {
    pub fn to_filter_string(&self) -> String {
        match self {
            WorksFilter::ConceptWindow { concept_id, from, to } => format!(
                "concepts.id:{concept_id},from_publication_date:{from},to_publication_date:{to}"
            ),
            WorksFilter::Ids(ids) => format!("openalex:{}", ids.join("|")),
        }
    }
}

/// One page request against `/works`.
#[derive(Debug, Clone)]
pub struct WorksQuery {
    pub filter: WorksFilter,
    pub per_page: u32,
    /// Cursor from a previous page, or `None` to start at the beginning.
    pub cursor: Option<String>,
}

impl WorksQuery {
    pub fn new(filter: WorksFilter, per_page: u32) -> Self {
        Self {
            filter,
            per_page,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Query-string pairs for this request, validated against the endpoint's limits.
    pub fn params(&self, mailto: &str) -> Result<Vec<(&'static str, String)>> {
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(OpenAlexError::InvalidQuery(format!(
                "per-page must be within 1..={MAX_PER_PAGE}, got {}",
                self.per_page
            )));
        }
        match &self.filter {
            WorksFilter::Ids(ids) if ids.is_empty() => {
                return Err(OpenAlexError::InvalidQuery("empty id filter".into()));
            }
            WorksFilter::Ids(ids) if ids.len() > MAX_IDS_PER_FILTER => {
                return Err(OpenAlexError::InvalidQuery(format!(
                    "at most {MAX_IDS_PER_FILTER} ids per filter, got {}",
                    ids.len()
                )));
            }
            WorksFilter::ConceptWindow { from, to, .. } if from > to => {
                return Err(OpenAlexError::InvalidQuery(format!(
                    "window start {from} is after window end {to}"
                )));
            }
            _ => {}
        }

        let mut params = vec![("filter", self.filter.to_filter_string())];
        if matches!(self.filter, WorksFilter::ConceptWindow { .. }) {
            params.push(("sort", "publication_date:asc".to_string()));
        }
        params.push(("per-page", self.per_page.to_string()));
        params.push(("mailto", mailto.to_string()));
        params.push((
            "cursor",
            self.cursor.clone().unwrap_or_else(|| START_CURSOR.to_string()),
        ));
        Ok(params)
    }
}

// --- Response types ---

/// Raw envelope returned by `/works`. Records are kept as untyped JSON because
/// upstream omits fields freely and the shape varies record to record.
#[derive(Debug, Clone, Deserialize)]
pub struct WorksResponse {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMeta {
    pub count: Option<u64>,
    pub per_page: Option<u32>,
    pub next_cursor: Option<String>,
}

/// A single page of raw works plus the cursor for the next page.
/// `next_cursor == None` means the listing is exhausted.
#[derive(Debug, Clone, Default)]
pub struct WorksPage {
    pub results: Vec<Value>,
    pub next_cursor: Option<String>,
}

impl From<WorksResponse> for WorksPage {
    fn from(resp: WorksResponse) -> Self {
        Self {
            results: resp.results,
            next_cursor: resp
                .meta
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty()),
        }
    }
}

/// Strip the `https://openalex.org/` prefix from an entity URL, leaving the bare token.
pub fn bare_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}
