pub mod error;
pub mod rate;
pub mod types;

pub use error::{OpenAlexError, Result};
pub use rate::RateGate;
pub use types::{
    bare_id, ResponseMeta, WorksFilter, WorksPage, WorksQuery, WorksResponse, MAX_IDS_PER_FILTER,
    MAX_PER_PAGE, START_CURSOR,
};

use std::sync::Arc;
use std::time::Duration;

const BASE_URL: &str = "https://api.openalex.org";

/// Client for the OpenAlex works listing. Every request passes through the
/// injected [`RateGate`] and carries the polite-pool `mailto` contact.
#[derive(Clone)]
pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
    mailto: String,
    gate: Arc<RateGate>,
}

impl OpenAlexClient {
    pub fn new(mailto: impl Into<String>, gate: RateGate) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            mailto: mailto.into(),
            gate: Arc::new(gate),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a single page of works.
    pub async fn works(&self, query: &WorksQuery) -> Result<WorksPage> {
        let params = query.params(&self.mailto)?;
        let url = format!("{}/works", self.base_url);

        self.gate.acquire().await;
        tracing::debug!(filter = %query.filter.to_filter_string(), cursor = ?query.cursor, "Fetching works page");

        let resp = self.client.get(&url).query(&params).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OpenAlexError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let parsed: WorksResponse = serde_json::from_str(&body)?;
        let page = WorksPage::from(parsed);
        tracing::debug!(
            count = page.results.len(),
            has_next = page.next_cursor.is_some(),
            "Fetched works page"
        );
        Ok(page)
    }
}
