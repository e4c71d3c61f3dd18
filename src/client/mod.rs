//! arXiv query API client.
//!
//! Translates validated [`SearchRequest`]s into endpoint URLs, executes
//! them over the retrying transport, and decodes the Atom feed.

mod request;
mod response;

pub use request::{build_query_params, build_search_query, build_url};
pub use response::parse_feed;

use tracing::{debug, instrument};

use crate::error::HarvestError;
use crate::models::{Paper, SearchRequest};
use crate::transport::Transport;

/// Default arXiv query endpoint
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Client for the arXiv search API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    transport: Transport,
    base_url: String,
}

impl ArxivClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            base_url: ARXIV_API_URL.to_string(),
        }
    }

    /// Override the endpoint, mainly for tests against a local server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Execute a search and return the parsed papers.
    #[instrument(skip(self, request), fields(max_results = request.max_results))]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Paper>, HarvestError> {
        request.validate()?;

        let url = build_url(&self.base_url, request);
        debug!(url = %url, "executing search");

        let body = self.transport.get_bytes(&url).await?;
        parse_feed(&body)
    }

    /// Look up papers by their arXiv identifiers.
    pub async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Paper>, HarvestError> {
        let request = SearchRequest::new()
            .ids(ids.to_vec())
            .max_results(ids.len().max(1));
        self.search(&request).await
    }
}
