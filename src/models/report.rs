//! Download tasks, per-task results, and the aggregated batch report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::models::Paper;

/// One unit of download work, created per paper by the orchestrator and
/// consumed by exactly one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub paper: Paper,

    /// Directory the artifact will be written into
    pub target_dir: PathBuf,

    /// First-choice filename derived from the title; the worker falls
    /// back to an id-suffixed variant when this name is taken
    pub desired_filename: String,

    /// Position of the paper in the original input list
    pub index: usize,
}

/// Outcome of a single download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    Success,
    /// The resolved destination already exists, or a pre-download hook
    /// vetoed the task. No network call was made.
    SkippedExists,
    Failed,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success)
    }
}

/// Immutable record of one finished download task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResult {
    pub task: DownloadTask,

    pub outcome: DownloadOutcome,

    /// Final path of the artifact, when one was written or already present
    pub path: Option<PathBuf>,

    pub bytes_written: u64,

    pub error: Option<ErrorKind>,

    /// Wall-clock time spent on this task
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl DownloadResult {
    pub fn success(task: DownloadTask, path: PathBuf, bytes: u64, elapsed: Duration) -> Self {
        Self {
            task,
            outcome: DownloadOutcome::Success,
            path: Some(path),
            bytes_written: bytes,
            error: None,
            elapsed,
        }
    }

    pub fn skipped(task: DownloadTask, path: Option<PathBuf>, elapsed: Duration) -> Self {
        Self {
            task,
            outcome: DownloadOutcome::SkippedExists,
            path,
            bytes_written: 0,
            error: None,
            elapsed,
        }
    }

    pub fn failed(task: DownloadTask, error: ErrorKind, elapsed: Duration) -> Self {
        Self {
            task,
            outcome: DownloadOutcome::Failed,
            path: None,
            bytes_written: 0,
            error: Some(error),
            elapsed,
        }
    }
}

/// Aggregated result of one batch-download invocation.
///
/// Results arrive in completion order; callers needing input order can
/// sort by `task.index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,

    /// End-to-end wall clock for the whole batch, not summed per task
    #[serde(with = "duration_secs")]
    pub total_time: Duration,

    pub results: Vec<DownloadResult>,
}

impl BatchReport {
    /// Derive counters from individual results
    pub fn new(results: Vec<DownloadResult>, total_time: Duration) -> Self {
        let successful = results
            .iter()
            .filter(|r| r.outcome == DownloadOutcome::Success)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.outcome == DownloadOutcome::Failed)
            .count();
        let skipped = results.len() - successful - failed;

        Self {
            successful,
            failed,
            skipped,
            total_time,
            results,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_written).sum()
    }

    /// Results reordered by original input index
    pub fn results_in_input_order(&self) -> Vec<&DownloadResult> {
        let mut sorted: Vec<&DownloadResult> = self.results.iter().collect();
        sorted.sort_by_key(|r| r.task.index);
        sorted
    }

    pub fn is_all_success(&self) -> bool {
        !self.results.is_empty() && self.failed == 0 && self.skipped == 0
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperBuilder;

    fn task(index: usize) -> DownloadTask {
        DownloadTask {
            paper: PaperBuilder::new(
                format!("2301.0000{}", index),
                format!("Paper {}", index),
                "https://arxiv.org/pdf/x",
            )
            .build(),
            target_dir: PathBuf::from("/tmp"),
            desired_filename: format!("Paper_{}.pdf", index),
            index,
        }
    }

    #[test]
    fn test_report_counters() {
        let results = vec![
            DownloadResult::success(task(0), PathBuf::from("/tmp/a.pdf"), 100, Duration::ZERO),
            DownloadResult::failed(task(1), ErrorKind::Network, Duration::ZERO),
            DownloadResult::skipped(task(2), None, Duration::ZERO),
            DownloadResult::success(task(3), PathBuf::from("/tmp/b.pdf"), 50, Duration::ZERO),
        ];

        let report = BatchReport::new(results, Duration::from_secs(2));
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total_bytes(), 150);
        assert!(!report.is_all_success());
    }

    #[test]
    fn test_results_in_input_order() {
        let results = vec![
            DownloadResult::skipped(task(2), None, Duration::ZERO),
            DownloadResult::skipped(task(0), None, Duration::ZERO),
            DownloadResult::skipped(task(1), None, Duration::ZERO),
        ];
        let report = BatchReport::new(results, Duration::ZERO);
        let ordered: Vec<usize> = report
            .results_in_input_order()
            .iter()
            .map(|r| r.task.index)
            .collect();
        assert_eq!(ordered, vec![0, 1, 2]);
    }

    #[test]
    fn test_report_serializes_seconds() {
        let report = BatchReport::new(vec![], Duration::from_millis(1500));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_time"].as_f64().unwrap(), 1.5);
    }
}
