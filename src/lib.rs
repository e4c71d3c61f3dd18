//! # arxiv-harvest
//!
//! Concurrent acquisition engine for arXiv: structured search queries,
//! a retrying HTTP transport, a file-backed result cache, and a
//! bounded-concurrency PDF downloader with an extension hook bus.
//!
//! ## Quick start
//!
//! ```no_run
//! use arxiv_harvest::{Engine, HarvestConfig, Query, SearchField, SearchRequest};
//!
//! # async fn run() -> Result<(), arxiv_harvest::HarvestError> {
//! let engine = Engine::new(HarvestConfig::default())?;
//!
//! let request = SearchRequest::new()
//!     .query(Query::term("attention mechanisms", SearchField::Title))
//!     .category("cs.LG")
//!     .max_results(20);
//!
//! let papers = engine.search(&request).await?;
//! let report = engine.download(papers, None).await?;
//! println!("downloaded {} papers", report.successful);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod models;
pub mod transport;
pub mod utils;

pub use cache::{CacheLookup, CacheStats, SearchCache, DEFAULT_CACHE_TTL};
pub use client::{ArxivClient, ARXIV_API_URL};
pub use config::HarvestConfig;
pub use download::{ArtifactFetcher, Downloader, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use engine::Engine;
pub use error::{ErrorKind, HarvestError};
pub use hooks::{
    CategoryFilterHook, DuplicateCheckHook, Hook, HookBus, HookContext, HookEvent, MetadataHook,
};
pub use models::{
    is_valid_arxiv_id, BatchReport, BoolOp, DateRange, DownloadOutcome, DownloadResult,
    DownloadTask, Paper, PaperBuilder, Query, SearchField, SearchRequest, SortBy, SortOrder,
    MAX_RESULTS_LIMIT,
};
pub use transport::{with_retry, RetryPolicy, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
