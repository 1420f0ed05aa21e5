// Trait seam for the upstream works listing.
//
// The crawler and the stub reconciler only ever need "give me one page of
// works for this query". Production uses OpenAlexClient; tests use
// MockWorksSource from `testing`, so the pipeline runs with no network.

use async_trait::async_trait;

use openalex_client::{OpenAlexClient, OpenAlexError, WorksPage, WorksQuery};

#[async_trait]
pub trait WorksSource: Send + Sync {
    /// Fetch one page of raw works.
    async fn works(&self, query: &WorksQuery) -> Result<WorksPage, OpenAlexError>;
}

#[async_trait]
impl WorksSource for OpenAlexClient {
    async fn works(&self, query: &WorksQuery) -> Result<WorksPage, OpenAlexError> {
        OpenAlexClient::works(self, query).await
    }
}
