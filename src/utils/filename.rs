//! Filesystem-safe filename derivation for downloaded papers.

use std::path::{Path, PathBuf};

/// Longest allowed stem before any id suffix is appended
pub const MAX_FILENAME_LENGTH: usize = 100;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn clean_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let mut stem = cleaned.split_whitespace().collect::<Vec<_>>().join("_");

    if stem.len() > MAX_FILENAME_LENGTH {
        let mut cut = MAX_FILENAME_LENGTH;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
        // Avoid a dangling separator after the cut
        while stem.ends_with('_') {
            stem.pop();
        }
    }

    stem
}

/// Sanitize a string for use as a filename stem.
///
/// Strips characters that are invalid on common filesystems, collapses
/// whitespace to single underscores, and caps the length. Returns
/// `untitled` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> String {
    let stem = clean_stem(name);
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}

/// The two destination candidates for a paper, in resolution order.
///
/// First choice is the sanitized title alone; when that name is taken
/// the id-suffixed form disambiguates. An empty title goes straight to
/// `untitled_<id>`.
pub fn destination_candidates(
    target_dir: &Path,
    title: &str,
    paper_id: &str,
) -> (PathBuf, PathBuf) {
    let id_part = sanitize_filename(paper_id);
    let stem = match clean_stem(title) {
        stem if stem.is_empty() => format!("untitled_{}", id_part),
        stem => stem,
    };

    let primary = target_dir.join(format!("{}.pdf", stem));
    let fallback = target_dir.join(format!("{}_{}.pdf", stem, id_part));
    (primary, fallback)
}

/// Resolve the destination against the current directory state.
///
/// Deterministic for a given state: the primary name if free, otherwise
/// the id-suffixed name if free, otherwise `None` (both taken, the paper
/// is to be skipped). The orchestrator performs the same walk with
/// atomic creates; this form exists for dry runs and policy hooks.
pub fn resolve_destination(target_dir: &Path, title: &str, paper_id: &str) -> Option<PathBuf> {
    let (primary, fallback) = destination_candidates(target_dir, title, paper_id);
    if !primary.exists() {
        return Some(primary);
    }
    if !fallback.exists() {
        return Some(fallback);
    }
    None
}
