//! Paper model produced by the response parser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bibliographic record from the arXiv search feed.
///
/// Read-only after parsing; cloned freely across concurrent download tasks
/// and into/out of the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Versioned arXiv identifier (e.g. `2301.00001v2`)
    pub id: String,

    /// Paper title with collapsed whitespace
    pub title: String,

    /// Author names in feed order
    pub authors: Vec<String>,

    /// Abstract text with collapsed whitespace
    pub summary: String,

    /// Subject categories in feed order
    pub categories: Vec<String>,

    /// Primary subject category
    pub primary_category: Option<String>,

    /// Submission timestamp
    pub published: Option<DateTime<Utc>>,

    /// Last update timestamp
    pub updated: Option<DateTime<Utc>>,

    /// Direct PDF URL
    pub pdf_url: String,

    /// Author comment (pages, figures, etc.)
    pub comment: Option<String>,

    /// Journal reference
    pub journal_ref: Option<String>,

    /// Digital Object Identifier
    pub doi: Option<String>,
}

impl Paper {
    /// The identifier without its version suffix
    pub fn base_id(&self) -> &str {
        match self.id.rfind('v') {
            Some(pos)
                if pos + 1 < self.id.len()
                    && self.id[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                &self.id[..pos]
            }
            _ => &self.id,
        }
    }

    /// Authors joined for display
    pub fn authors_str(&self) -> String {
        self.authors.join(", ")
    }
}

/// Builder for constructing Paper objects
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    /// Create a new builder with required fields
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        pdf_url: impl Into<String>,
    ) -> Self {
        Self {
            paper: Paper {
                id: id.into(),
                title: title.into(),
                authors: Vec::new(),
                summary: String::new(),
                categories: Vec::new(),
                primary_category: None,
                published: None,
                updated: None,
                pdf_url: pdf_url.into(),
                comment: None,
                journal_ref: None,
                doi: None,
            },
        }
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.paper.authors = authors;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.paper.summary = summary.into();
        self
    }

    pub fn categories(mut self, categories: Vec<String>) -> Self {
        if self.paper.primary_category.is_none() {
            self.paper.primary_category = categories.first().cloned();
        }
        self.paper.categories = categories;
        self
    }

    pub fn primary_category(mut self, category: impl Into<String>) -> Self {
        self.paper.primary_category = Some(category.into());
        self
    }

    pub fn published(mut self, date: DateTime<Utc>) -> Self {
        self.paper.published = Some(date);
        self
    }

    pub fn updated(mut self, date: DateTime<Utc>) -> Self {
        self.paper.updated = Some(date);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.paper.comment = Some(comment.into());
        self
    }

    pub fn journal_ref(mut self, journal_ref: impl Into<String>) -> Self {
        self.paper.journal_ref = Some(journal_ref.into());
        self
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.paper.doi = Some(doi.into());
        self
    }

    pub fn build(self) -> Paper {
        self.paper
    }
}
