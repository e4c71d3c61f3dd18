//! Structured query model for the arXiv search API.
//!
//! Queries are immutable value objects; [`SearchRequest`] aggregates them
//! with filters, pagination, and sort options and validates everything
//! before any network call is made.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::HarvestError;

/// Upper bound the arXiv API accepts for a single page of results
pub const MAX_RESULTS_LIMIT: usize = 2000;

/// Search fields supported by the arXiv API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    All,
    Title,
    Author,
    Abstract,
    Category,
    Comment,
    JournalRef,
    ReportNum,
    Id,
    SubmittedDate,
    LastUpdatedDate,
}

impl SearchField {
    /// The field prefix used in `search_query` expressions
    pub fn prefix(&self) -> &'static str {
        match self {
            SearchField::All => "all",
            SearchField::Title => "ti",
            SearchField::Author => "au",
            SearchField::Abstract => "abs",
            SearchField::Category => "cat",
            SearchField::Comment => "co",
            SearchField::JournalRef => "jr",
            SearchField::ReportNum => "rn",
            SearchField::Id => "id",
            SearchField::SubmittedDate => "submittedDate",
            SearchField::LastUpdatedDate => "lastUpdatedDate",
        }
    }
}

/// Boolean operator joining terms within one query group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BoolOp {
    And,
    Or,
    AndNot,
}

impl BoolOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
            BoolOp::AndNot => "ANDNOT",
        }
    }
}

/// One field-scoped group of search terms.
///
/// Multiple queries on a [`SearchRequest`] are ANDed together; the terms
/// inside a single query are joined by its own operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub terms: Vec<String>,
    pub field: SearchField,
    pub operator: BoolOp,
}

impl Query {
    /// Create a query over all fields with the AND operator
    pub fn new(terms: Vec<String>) -> Self {
        Self {
            terms,
            field: SearchField::All,
            operator: BoolOp::And,
        }
    }

    /// Single-term convenience constructor
    pub fn term(term: impl Into<String>, field: SearchField) -> Self {
        Self {
            terms: vec![term.into()],
            field,
            operator: BoolOp::And,
        }
    }

    pub fn field(mut self, field: SearchField) -> Self {
        self.field = field;
        self
    }

    pub fn operator(mut self, operator: BoolOp) -> Self {
        self.operator = operator;
        self
    }

    /// Render this group as an arXiv `search_query` fragment.
    ///
    /// Terms containing whitespace are quoted; multi-term groups are
    /// parenthesised so the outer AND-join cannot change their meaning.
    pub fn to_fragment(&self) -> String {
        if self.terms.is_empty() {
            return String::new();
        }

        let prefix = match self.field {
            SearchField::All => String::new(),
            field => format!("{}:", field.prefix()),
        };

        if self.terms.len() == 1 {
            return format!("{}{}", prefix, quote_term(&self.terms[0]));
        }

        let joined = self
            .terms
            .iter()
            .map(|t| quote_term(t))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", self.operator.as_str()));
        format!("{}({})", prefix, joined)
    }
}

fn quote_term(term: &str) -> String {
    if term.contains(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term.to_string()
    }
}

/// Inclusive date range filter on a submission or update date field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub field: SearchField,
}

impl DateRange {
    pub fn submitted(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start,
            end,
            field: SearchField::SubmittedDate,
        }
    }

    pub fn last_updated(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start,
            end,
            field: SearchField::LastUpdatedDate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Render as `field:[YYYYMMDDHHMM TO YYYYMMDDHHMM]` with `*` for an
    /// open bound. Start expands to midnight, end to 23:59, so the range
    /// is inclusive on both dates.
    pub fn to_fragment(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let start = self
            .start
            .map(|d| format!("{}0000", d.format("%Y%m%d")))
            .unwrap_or_else(|| "*".to_string());
        let end = self
            .end
            .map(|d| format!("{}2359", d.format("%Y%m%d")))
            .unwrap_or_else(|| "*".to_string());

        format!("{}:[{} TO {}]", self.field.prefix(), start, end)
    }

    fn validate(&self) -> Result<(), HarvestError> {
        if !matches!(
            self.field,
            SearchField::SubmittedDate | SearchField::LastUpdatedDate
        ) {
            return Err(HarvestError::Validation(format!(
                "Date range field must be a date field, got {:?}",
                self.field
            )));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(HarvestError::Validation(format!(
                    "Date range start {} is after end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Sort criteria for arXiv API results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Relevance,
    SubmittedDate,
    LastUpdatedDate,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::SubmittedDate => "submittedDate",
            SortBy::LastUpdatedDate => "lastUpdatedDate",
        }
    }
}

/// Sort order for arXiv API results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

/// One search call against the arXiv API.
///
/// Built once by the caller and never mutated afterwards; validation runs
/// before any I/O and fails fast with [`HarvestError::Validation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Field-scoped query groups, ANDed together
    pub queries: Vec<Query>,

    /// Batch-by-identifier lookup; may be combined with queries
    pub id_list: Vec<String>,

    /// Optional date range filter
    pub date_range: Option<DateRange>,

    /// Subject categories, ORed together and ANDed with the rest
    pub categories: Vec<String>,

    /// Maximum number of results to return (1..=2000)
    pub max_results: usize,

    /// Starting index for pagination
    pub start: usize,

    pub sort_by: SortBy,

    pub sort_order: SortOrder,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            id_list: Vec::new(),
            date_range: None,
            categories: Vec::new(),
            max_results: 10,
            start: 0,
            sort_by: SortBy::Relevance,
            sort_order: SortOrder::Descending,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.id_list = ids;
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn sort_by(mut self, sort: SortBy) -> Self {
        self.sort_by = sort;
        self
    }

    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    /// Validate the request before any network call.
    ///
    /// Checks: at least one of queries/id_list/categories is present,
    /// `max_results` is within bounds, every arXiv id is well-formed,
    /// and the date range is not inverted.
    pub fn validate(&self) -> Result<(), HarvestError> {
        let has_terms = self.queries.iter().any(|q| !q.terms.is_empty());
        if !has_terms && self.id_list.is_empty() && self.categories.is_empty() {
            return Err(HarvestError::Validation(
                "Either queries, id_list, or categories must be provided".to_string(),
            ));
        }

        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(HarvestError::Validation(format!(
                "max_results must be in 1..={}, got {}",
                MAX_RESULTS_LIMIT, self.max_results
            )));
        }

        for id in &self.id_list {
            if !is_valid_arxiv_id(id) {
                return Err(HarvestError::Validation(format!(
                    "Invalid arXiv ID format: {}",
                    id
                )));
            }
        }

        if let Some(range) = &self.date_range {
            range.validate()?;
        }

        Ok(())
    }
}

/// Validate an arXiv identifier in old (`math.GT/0104020v1`) or
/// new (`2301.00001v2`) format. Version suffixes are allowed.
pub fn is_valid_arxiv_id(id: &str) -> bool {
    static OLD_FORMAT: OnceLock<Regex> = OnceLock::new();
    static NEW_FORMAT: OnceLock<Regex> = OnceLock::new();

    let old = OLD_FORMAT.get_or_init(|| {
        Regex::new(r"^[a-z-]+(\.[A-Z]{2})?/\d{7}(v\d+)?$").expect("old id regex")
    });
    let new =
        NEW_FORMAT.get_or_init(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("new id regex"));

    old.is_match(id) || new.is_match(id)
}
