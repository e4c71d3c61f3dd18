//! Decoding of the arXiv Atom feed into [`Paper`] records.
//!
//! Feed-format quirks stay in this module. Records missing only optional
//! fields (comment, journal reference, DOI) still parse; a record missing
//! its identifier or title is dropped and counted. The whole response only
//! fails when the payload is structurally invalid or when entries were
//! present but none survived.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::HarvestError;
use crate::models::{Paper, PaperBuilder};

/// Base URL for arXiv PDFs, used when an entry carries no pdf link
const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    // quick-xml's serde deserializer matches on local names with the
    // namespace prefix stripped, so `arxiv:comment` arrives as `comment`.
    primary_category: Option<AtomCategory>,
    comment: Option<String>,
    journal_ref: Option<String>,
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@type")]
    media_type: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

/// Parse a search feed payload into papers.
pub fn parse_feed(body: &[u8]) -> Result<Vec<Paper>, HarvestError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| HarvestError::Parse(format!("response is not valid UTF-8: {}", e)))?;

    let feed: AtomFeed =
        from_str(text).map_err(|e| HarvestError::Parse(format!("invalid Atom feed: {}", e)))?;

    let entry_count = feed.entries.len();
    let mut papers = Vec::with_capacity(entry_count);
    let mut dropped = 0usize;

    for entry in &feed.entries {
        match parse_entry(entry) {
            Some(paper) => papers.push(paper),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(dropped, kept = papers.len(), "dropped malformed feed entries");
    }

    if papers.is_empty() && entry_count > 0 {
        return Err(HarvestError::Parse(format!(
            "no parseable entries in feed ({} present)",
            entry_count
        )));
    }

    debug!(papers = papers.len(), "parsed search feed");
    Ok(papers)
}

/// Parse one feed entry; `None` drops the record.
fn parse_entry(entry: &AtomEntry) -> Option<Paper> {
    let id = entry
        .id
        .as_deref()
        .map(extract_id)
        .filter(|id| !id.is_empty())?;

    let title = entry
        .title
        .as_deref()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())?;

    let published = match parse_date(entry.published.as_deref()) {
        Ok(date) => date,
        Err(()) => {
            warn!(id = %id, "dropping entry with unparsable published date");
            return None;
        }
    };
    let updated = match parse_date(entry.updated.as_deref()) {
        Ok(date) => date,
        Err(()) => {
            warn!(id = %id, "dropping entry with unparsable updated date");
            return None;
        }
    };

    let authors: Vec<String> = entry
        .authors
        .iter()
        .filter_map(|a| a.name.as_deref())
        .map(collapse_whitespace)
        .filter(|n| !n.is_empty())
        .collect();

    let categories: Vec<String> = entry
        .categories
        .iter()
        .filter_map(|c| c.term.clone())
        .collect();

    let pdf_url = entry
        .links
        .iter()
        .find(|l| {
            l.media_type.as_deref() == Some("application/pdf")
                || l.title.as_deref() == Some("pdf")
        })
        .and_then(|l| l.href.clone())
        .unwrap_or_else(|| format!("{}/{}", ARXIV_PDF_URL, id));

    let mut builder = PaperBuilder::new(id, title, pdf_url)
        .authors(authors)
        .categories(categories);

    if let Some(primary) = entry.primary_category.as_ref().and_then(|c| c.term.clone()) {
        builder = builder.primary_category(primary);
    }
    if let Some(date) = published {
        builder = builder.published(date);
    }
    if let Some(date) = updated {
        builder = builder.updated(date);
    }
    if let Some(summary) = entry.summary.as_deref() {
        builder = builder.summary(collapse_whitespace(summary));
    }
    if let Some(comment) = entry.comment.as_deref() {
        builder = builder.comment(collapse_whitespace(comment));
    }
    if let Some(journal_ref) = entry.journal_ref.as_deref() {
        builder = builder.journal_ref(collapse_whitespace(journal_ref));
    }
    if let Some(doi) = entry.doi.as_deref() {
        builder = builder.doi(doi.trim().to_string());
    }

    Some(builder.build())
}

/// Extract the versioned arXiv id from the entry id URL
fn extract_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.find("/abs/") {
        Some(pos) => trimmed[pos + 5..].to_string(),
        None => trimmed
            .rsplit('/')
            .next()
            .unwrap_or(trimmed)
            .to_string(),
    }
}

fn parse_date(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ()> {
    match raw {
        None => Ok(None),
        Some(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            DateTime::parse_from_rfc3339(trimmed)
                .map(|d| Some(d.with_timezone(&Utc)))
                .map_err(|_| ())
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
