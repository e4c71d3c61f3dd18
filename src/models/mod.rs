//! Core data structures: papers, queries, and download reports.

mod paper;
mod query;
mod report;

pub use paper::{Paper, PaperBuilder};
pub use query::{
    is_valid_arxiv_id, BoolOp, DateRange, Query, SearchField, SearchRequest, SortBy, SortOrder,
    MAX_RESULTS_LIMIT,
};
pub use report::{BatchReport, DownloadOutcome, DownloadResult, DownloadTask};
