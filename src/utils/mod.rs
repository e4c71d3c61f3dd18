//! Shared utilities: HTTP client construction and filename handling.

mod filename;
mod http;

pub use filename::{
    destination_candidates, resolve_destination, sanitize_filename, MAX_FILENAME_LENGTH,
};
pub use http::HttpClient;
