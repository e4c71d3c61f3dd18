//! High-level facade over search, cache, hooks, and downloads.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{CacheLookup, SearchCache};
use crate::client::ArxivClient;
use crate::config::HarvestConfig;
use crate::download::Downloader;
use crate::error::HarvestError;
use crate::hooks::{Hook, HookBus, HookContext};
use crate::models::{is_valid_arxiv_id, BatchReport, Paper, SearchRequest};
use crate::transport::Transport;
use crate::utils::HttpClient;

/// The acquisition engine.
///
/// One instance owns the HTTP connection pool, the result cache, and the
/// hook bus; it is cheap to share behind an `Arc` and safe to use from
/// many tasks at once.
#[derive(Debug)]
pub struct Engine {
    config: HarvestConfig,
    client: ArxivClient,
    transport: Transport,
    cache: Option<SearchCache>,
    hooks: HookBus,
}

impl Engine {
    /// Build an engine from settings.
    pub fn new(config: HarvestConfig) -> Result<Self, HarvestError> {
        let transport = Transport::new(HttpClient::new(), config.retry_policy());
        let client = ArxivClient::new(transport.clone()).with_base_url(&config.base_url);

        let cache = if config.cache_enabled {
            Some(SearchCache::new(config.cache_dir(), config.cache_ttl())?)
        } else {
            None
        };

        Ok(Self {
            config,
            client,
            transport,
            cache,
            hooks: HookBus::new(),
        })
    }

    /// Engine with default settings
    pub fn with_defaults() -> Result<Self, HarvestError> {
        Self::new(HarvestConfig::default())
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Attach a hook; higher priority runs first.
    pub fn register_hook(&mut self, hook: Arc<dyn Hook>, priority: i32) {
        self.hooks.register(hook, priority);
    }

    /// An empty request carrying this engine's configured defaults
    pub fn new_request(&self) -> SearchRequest {
        SearchRequest::new().max_results(self.config.default_max_results)
    }

    /// Run a search, consulting the cache first.
    ///
    /// A pre-search hook veto resolves to an empty result before any
    /// network or cache access; a veto is policy, not a failure. Cache
    /// hits skip the hooks' post-search pass; a cache write failure is
    /// logged and never fails the search.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Paper>, HarvestError> {
        request.validate()?;

        let mut ctx = HookContext::new();
        self.hooks.dispatch_pre_search(request, &mut ctx).await;
        if let Some(reason) = ctx.abort_reason() {
            info!(reason, "search vetoed by hook");
            return Ok(Vec::new());
        }

        if let Some(cache) = &self.cache {
            if let CacheLookup::Hit(papers) = cache.get(request) {
                info!(papers = papers.len(), "search served from cache");
                return Ok(papers);
            }
        }

        let papers = self.client.search(request).await?;

        let mut ctx = HookContext::new();
        self.hooks
            .dispatch_post_search(request, &papers, &mut ctx)
            .await;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(request, &papers) {
                warn!(error = %e, "failed to cache search results");
            }
        }

        Ok(papers)
    }

    /// Look up one paper by its arXiv identifier.
    pub async fn get_paper_by_id(&self, id: &str) -> Result<Option<Paper>, HarvestError> {
        if !is_valid_arxiv_id(id) {
            return Err(HarvestError::Validation(format!(
                "Invalid arXiv ID format: {}",
                id
            )));
        }
        let papers = self.client.fetch_by_ids(&[id.to_string()]).await?;
        Ok(papers.into_iter().next())
    }

    /// A downloader wired with this engine's transport and hooks. Grab
    /// its cancellation token before calling `run` to stop it later.
    pub fn downloader(&self) -> Downloader {
        Downloader::new(
            Arc::new(self.transport.clone()),
            self.config.max_concurrent_downloads,
        )
        .with_hooks(Arc::new(self.hooks.clone()))
    }

    /// Download papers into `target_dir`, or the configured directory
    /// when `None`.
    pub async fn download(
        &self,
        papers: Vec<Paper>,
        target_dir: Option<&Path>,
    ) -> Result<BatchReport, HarvestError> {
        let dir = target_dir.unwrap_or(&self.config.download_dir);
        self.downloader().run(papers, dir).await
    }

    /// Search, then download everything the search returned.
    pub async fn harvest(
        &self,
        request: &SearchRequest,
        target_dir: Option<&Path>,
    ) -> Result<(Vec<Paper>, BatchReport), HarvestError> {
        let papers = self.search(request).await?;
        let report = self.download(papers.clone(), target_dir).await?;
        Ok((papers, report))
    }

    /// Drop every cached search result.
    pub fn clear_cache(&self) -> Result<usize, HarvestError> {
        match &self.cache {
            Some(cache) => cache.clear(),
            None => Ok(0),
        }
    }
}
