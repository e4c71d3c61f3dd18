//! Extension hooks around search and download operations.
//!
//! Hooks observe the pipeline and may veto a download through the shared
//! [`HookContext`]; they can never replace the paper being processed. Hook
//! failures are contained: a hook that returns an error is logged and
//! skipped, and the operation proceeds.

mod builtin;

pub use builtin::{CategoryFilterHook, DuplicateCheckHook, MetadataHook};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::HarvestError;
use crate::models::{DownloadResult, Paper, SearchRequest};

/// Pipeline points a hook can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreSearch,
    PostSearch,
    PreDownload,
    PostDownload,
}

/// Mutable state shared by the hooks of one dispatch.
///
/// The abort flag is one-way: once set it cannot be cleared by a later
/// hook, so a veto always sticks.
#[derive(Debug, Default)]
pub struct HookContext {
    metadata: HashMap<String, serde_json::Value>,
    abort_reason: Option<String>,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Veto the current operation
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.abort_reason.is_none() {
            self.abort_reason = Some(reason.into());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    /// Attach a value for later hooks or the caller
    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// A pipeline extension.
///
/// Every method has a no-op default, so implementors only override the
/// events they care about.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn pre_search(
        &self,
        _request: &SearchRequest,
        _ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn post_search(
        &self,
        _request: &SearchRequest,
        _papers: &[Paper],
        _ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn pre_download(
        &self,
        _paper: &Paper,
        _target_dir: &Path,
        _ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn post_download(
        &self,
        _paper: &Paper,
        _result: &DownloadResult,
        _ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        Ok(())
    }
}

/// Ordered collection of hooks.
///
/// Higher priority runs first; hooks with equal priority run in
/// registration order. Dispatch stops early once a hook aborts.
#[derive(Clone, Default)]
pub struct HookBus {
    hooks: Vec<(i32, Arc<dyn Hook>)>,
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|(_, h)| h.name()).collect();
        f.debug_struct("HookBus").field("hooks", &names).finish()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Register a hook at the given priority.
    pub fn register(&mut self, hook: Arc<dyn Hook>, priority: i32) {
        debug!(hook = hook.name(), priority, "registering hook");
        self.hooks.push((priority, hook));
        // Stable sort keeps registration order within a priority
        self.hooks.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));
    }

    pub async fn dispatch_pre_search(&self, request: &SearchRequest, ctx: &mut HookContext) {
        for (_, hook) in &self.hooks {
            if ctx.is_aborted() {
                break;
            }
            if let Err(e) = hook.pre_search(request, ctx).await {
                warn!(hook = hook.name(), error = %e, "pre-search hook failed");
            }
        }
    }

    pub async fn dispatch_post_search(
        &self,
        request: &SearchRequest,
        papers: &[Paper],
        ctx: &mut HookContext,
    ) {
        for (_, hook) in &self.hooks {
            if let Err(e) = hook.post_search(request, papers, ctx).await {
                warn!(hook = hook.name(), error = %e, "post-search hook failed");
            }
        }
    }

    pub async fn dispatch_pre_download(
        &self,
        paper: &Paper,
        target_dir: &Path,
        ctx: &mut HookContext,
    ) {
        for (_, hook) in &self.hooks {
            if ctx.is_aborted() {
                break;
            }
            if let Err(e) = hook.pre_download(paper, target_dir, ctx).await {
                warn!(hook = hook.name(), error = %e, "pre-download hook failed");
            }
        }
    }

    pub async fn dispatch_post_download(
        &self,
        paper: &Paper,
        result: &DownloadResult,
        ctx: &mut HookContext,
    ) {
        for (_, hook) in &self.hooks {
            if let Err(e) = hook.post_download(paper, result, ctx).await {
                warn!(hook = hook.name(), error = %e, "post-download hook failed");
            }
        }
    }
}
