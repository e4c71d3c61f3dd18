//! Ready-made hooks covering the common download policies.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::{Hook, HookContext};
use crate::error::HarvestError;
use crate::models::{DownloadResult, Paper};
use crate::utils::{destination_candidates, sanitize_filename};

/// Vetoes a download when a PDF for the same paper already exists in the
/// target directory: either of its candidate destination names, or any
/// PDF whose stem carries the paper's id. Matching uses the
/// version-stripped id, so `v1` on disk blocks `v2`.
#[derive(Debug, Default)]
pub struct DuplicateCheckHook;

#[async_trait]
impl Hook for DuplicateCheckHook {
    fn name(&self) -> &str {
        "duplicate_check"
    }

    async fn pre_download(
        &self,
        paper: &Paper,
        target_dir: &Path,
        ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        let (primary, fallback) = destination_candidates(target_dir, &paper.title, &paper.id);
        for candidate in [primary, fallback] {
            if candidate.exists() {
                debug!(id = %paper.id, existing = %candidate.display(), "duplicate found");
                ctx.abort(format!("already downloaded: {}", candidate.display()));
                return Ok(());
            }
        }

        let needle = sanitize_filename(paper.base_id());

        let entries = match std::fs::read_dir(target_dir) {
            Ok(entries) => entries,
            // Missing directory means nothing downloaded yet
            Err(_) => return Ok(()),
        };

        for dirent in entries.flatten() {
            let path = dirent.path();
            if path.extension().map(|e| e == "pdf").unwrap_or(false) {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                if stem.contains(&needle) {
                    debug!(id = %paper.id, existing = %path.display(), "duplicate found");
                    ctx.abort(format!("already downloaded: {}", path.display()));
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// Filters downloads by subject category.
///
/// A paper passes when it has at least one allowed category (or the allow
/// list is empty) and no blocked category.
#[derive(Debug, Default)]
pub struct CategoryFilterHook {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl CategoryFilterHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, category: impl Into<String>) -> Self {
        self.allowed.push(category.into());
        self
    }

    pub fn block(mut self, category: impl Into<String>) -> Self {
        self.blocked.push(category.into());
        self
    }
}

#[async_trait]
impl Hook for CategoryFilterHook {
    fn name(&self) -> &str {
        "category_filter"
    }

    async fn pre_download(
        &self,
        paper: &Paper,
        _target_dir: &Path,
        ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        if paper.categories.iter().any(|c| self.blocked.contains(c)) {
            ctx.abort(format!("blocked category on {}", paper.id));
            return Ok(());
        }

        if !self.allowed.is_empty()
            && !paper.categories.iter().any(|c| self.allowed.contains(c))
        {
            ctx.abort(format!("no allowed category on {}", paper.id));
        }

        Ok(())
    }
}

/// Writes the paper's bibliographic record next to its PDF after a
/// successful download, under `<target_dir>/.metadata/<id>.json`.
#[derive(Debug, Default)]
pub struct MetadataHook;

#[async_trait]
impl Hook for MetadataHook {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn post_download(
        &self,
        paper: &Paper,
        result: &DownloadResult,
        _ctx: &mut HookContext,
    ) -> Result<(), HarvestError> {
        if !result.outcome.is_success() {
            return Ok(());
        }

        let dir = result.task.target_dir.join(".metadata");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", sanitize_filename(&paper.id)));
        let json = serde_json::to_vec_pretty(paper)
            .map_err(|e| HarvestError::Filesystem(format!("metadata serialization failed: {}", e)))?;
        std::fs::write(&path, json)?;

        debug!(id = %paper.id, path = %path.display(), "metadata written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadTask, PaperBuilder};
    use std::time::Duration;
    use tempfile::TempDir;

    fn paper(id: &str, categories: &[&str]) -> Paper {
        PaperBuilder::new(id, "Built In", format!("https://arxiv.org/pdf/{}", id))
            .categories(categories.iter().map(|c| c.to_string()).collect())
            .build()
    }

    #[tokio::test]
    async fn test_duplicate_check_vetoes_existing_paper() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Built_In_2301.00001v1.pdf"), b"pdf").unwrap();

        let hook = DuplicateCheckHook;
        let mut ctx = HookContext::new();
        // v2 of the same paper is still a duplicate
        hook.pre_download(&paper("2301.00001v2", &[]), dir.path(), &mut ctx)
            .await
            .unwrap();
        assert!(ctx.is_aborted());
    }

    #[tokio::test]
    async fn test_duplicate_check_passes_new_paper() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Other_2301.00009v1.pdf"), b"pdf").unwrap();

        let hook = DuplicateCheckHook;
        let mut ctx = HookContext::new();
        hook.pre_download(&paper("2301.00001v1", &[]), dir.path(), &mut ctx)
            .await
            .unwrap();
        assert!(!ctx.is_aborted());
    }

    #[tokio::test]
    async fn test_duplicate_check_missing_dir_is_not_an_error() {
        let hook = DuplicateCheckHook;
        let mut ctx = HookContext::new();
        hook.pre_download(
            &paper("2301.00001v1", &[]),
            Path::new("/nonexistent/nowhere"),
            &mut ctx,
        )
        .await
        .unwrap();
        assert!(!ctx.is_aborted());
    }

    #[tokio::test]
    async fn test_category_filter_blocklist() {
        let hook = CategoryFilterHook::new().block("cs.CR");
        let mut ctx = HookContext::new();
        hook.pre_download(&paper("2301.00001v1", &["cs.LG", "cs.CR"]), Path::new("/tmp"), &mut ctx)
            .await
            .unwrap();
        assert!(ctx.is_aborted());
    }

    #[tokio::test]
    async fn test_category_filter_allowlist() {
        let hook = CategoryFilterHook::new().allow("cs.LG");
        let mut ctx = HookContext::new();
        hook.pre_download(&paper("2301.00001v1", &["math.CO"]), Path::new("/tmp"), &mut ctx)
            .await
            .unwrap();
        assert!(ctx.is_aborted());

        let mut ctx = HookContext::new();
        hook.pre_download(&paper("2301.00002v1", &["cs.LG"]), Path::new("/tmp"), &mut ctx)
            .await
            .unwrap();
        assert!(!ctx.is_aborted());
    }

    #[tokio::test]
    async fn test_metadata_hook_writes_record_on_success() {
        let dir = TempDir::new().unwrap();
        let p = paper("2301.00001v1", &["cs.LG"]);
        let task = DownloadTask {
            paper: p.clone(),
            target_dir: dir.path().to_path_buf(),
            desired_filename: "Built_In.pdf".to_string(),
            index: 0,
        };
        let result = DownloadResult::success(
            task,
            dir.path().join("Built_In.pdf"),
            1024,
            Duration::from_millis(10),
        );

        let hook = MetadataHook;
        let mut ctx = HookContext::new();
        hook.post_download(&p, &result, &mut ctx).await.unwrap();

        let written = dir.path().join(".metadata/2301.00001v1.json");
        let data = std::fs::read_to_string(written).unwrap();
        let restored: Paper = serde_json::from_str(&data).unwrap();
        assert_eq!(restored, p);
    }

    #[tokio::test]
    async fn test_metadata_hook_skips_failures() {
        let dir = TempDir::new().unwrap();
        let p = paper("2301.00001v1", &[]);
        let task = DownloadTask {
            paper: p.clone(),
            target_dir: dir.path().to_path_buf(),
            desired_filename: "Built_In.pdf".to_string(),
            index: 0,
        };
        let result = DownloadResult::failed(
            task,
            crate::error::ErrorKind::Network,
            Duration::from_millis(10),
        );

        let hook = MetadataHook;
        let mut ctx = HookContext::new();
        hook.post_download(&p, &result, &mut ctx).await.unwrap();

        assert!(!dir.path().join(".metadata").exists());
    }
}
