//! Translation of a [`SearchRequest`] into the arXiv query endpoint URL.
//!
//! Pure functions: the same request always yields the same URL, so the
//! translation is testable without any network.

use crate::models::SearchRequest;

/// Build the `search_query` expression for a request.
///
/// Query groups, the date range, and the category filter are ANDed
/// together; categories are ORed inside their own parentheses.
pub fn build_search_query(request: &SearchRequest) -> String {
    let mut parts: Vec<String> = request
        .queries
        .iter()
        .map(|q| q.to_fragment())
        .filter(|f| !f.is_empty())
        .collect();

    if let Some(range) = &request.date_range {
        let fragment = range.to_fragment();
        if !fragment.is_empty() {
            parts.push(fragment);
        }
    }

    if !request.categories.is_empty() {
        let cats: Vec<String> = request
            .categories
            .iter()
            .map(|c| format!("cat:{}", c))
            .collect();
        if cats.len() == 1 {
            parts.push(cats.into_iter().next().unwrap_or_default());
        } else {
            parts.push(format!("({})", cats.join(" OR ")));
        }
    }

    parts.join(" AND ")
}

/// Build the ordered key/value parameters for the query endpoint
pub fn build_query_params(request: &SearchRequest) -> Vec<(String, String)> {
    let mut params = Vec::new();

    let search_query = build_search_query(request);
    if !search_query.is_empty() {
        params.push(("search_query".to_string(), search_query));
    }

    if !request.id_list.is_empty() {
        params.push(("id_list".to_string(), request.id_list.join(",")));
    }

    params.push(("start".to_string(), request.start.to_string()));
    params.push(("max_results".to_string(), request.max_results.to_string()));
    params.push(("sortBy".to_string(), request.sort_by.as_str().to_string()));
    params.push((
        "sortOrder".to_string(),
        request.sort_order.as_str().to_string(),
    ));

    params
}

/// Assemble the full endpoint URL with percent-encoded values
pub fn build_url(base_url: &str, request: &SearchRequest) -> String {
    let query_string = build_query_params(request)
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", base_url, query_string)
}
