//! Section building: split an ordered list of page texts into breadcrumb
//! sections using a line-level heading heuristic.
//!
//! The heuristic works on plain text only (no font sizes, no positions), so
//! it is best-effort by construction:
//!
//! - only the **first** heading-like line of a page is considered; further
//!   headings on the same page are folded into the section it opens;
//! - heading level is a coarse function of line length, not of typography.
//!
//! ## Breadcrumb stack
//!
//! A heading of level `L` pops the stack until its depth is below `L`, then
//! pushes itself. The page range accumulated so far is emitted under the old
//! breadcrumb, and a new section opens on the heading's page. Pages without a
//! heading extend the open section.
//!
//! Output always partitions `0..N` into contiguous, ordered, non-empty
//! ranges. Pages before the first heading, or a document with no heading at
//! all, are labeled [`FALLBACK_TITLE`].

use crate::model::Section;
use tracing::{debug, info};

/// Breadcrumb used when no heading covers a page range.
pub const FALLBACK_TITLE: &str = "Document";

const MAX_HEADING_CHARS: usize = 100;
const MAX_NUMERIC_WORDS: usize = 3;
const MAX_TITLE_CASE_WORDS: usize = 5;
const TITLE_CASE_RATIO: f64 = 0.6;
const MAX_ARABIC_MARKER_CHARS: usize = 60;

const ROMAN_MARKERS: [&str; 10] = [
    "I.", "II.", "III.", "IV.", "V.", "VI.", "VII.", "VIII.", "IX.", "X.",
];
const ARABIC_MARKERS: [&str; 9] = ["1.", "2.", "3.", "4.", "5.", "6.", "7.", "8.", "9."];

/// Classify a line; returns its level (1–3) when it looks like a heading.
pub fn heading_level(line: &str) -> Option<u8> {
    let line = line.trim();
    let len = line.chars().count();

    if len == 0 || len > MAX_HEADING_CHARS {
        return None;
    }

    let words: Vec<&str> = line.split_whitespace().collect();

    // Table rows carry many numbers.
    let numeric_words = words
        .iter()
        .filter(|w| w.chars().any(char::is_numeric))
        .count();
    if numeric_words > MAX_NUMERIC_WORDS {
        return None;
    }

    if looks_like_heading(line, len, &words) {
        Some(level_for_length(len))
    } else {
        None
    }
}

/// Convenience wrapper around [`heading_level`].
pub fn is_heading(line: &str) -> bool {
    heading_level(line).is_some()
}

fn looks_like_heading(line: &str, len: usize, words: &[&str]) -> bool {
    let capitalised = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .count();
    if words.len() <= MAX_TITLE_CASE_WORDS
        && capitalised as f64 >= words.len() as f64 * TITLE_CASE_RATIO
    {
        return true;
    }

    if is_all_uppercase(line) && (6..80).contains(&len) {
        return true;
    }

    if ROMAN_MARKERS.iter().any(|m| line.starts_with(m)) {
        return true;
    }

    ARABIC_MARKERS.iter().any(|m| line.starts_with(m)) && len < MAX_ARABIC_MARKER_CHARS
}

/// At least one cased character, and no lowercase ones.
fn is_all_uppercase(s: &str) -> bool {
    s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
}

fn level_for_length(len: usize) -> u8 {
    if len < 30 {
        1
    } else if len < 50 {
        2
    } else {
        3
    }
}

/// The first heading-like line of a page, trimmed, with its level.
pub fn first_heading(page: &str) -> Option<(String, u8)> {
    page.lines()
        .find_map(|line| heading_level(line).map(|level| (line.trim().to_string(), level)))
}

/// Segment `pages` into breadcrumb sections.
///
/// Returns an empty list for an empty document.
pub fn build_sections<S: AsRef<str>>(pages: &[S]) -> Vec<Section> {
    info!("Building sections from {} pages", pages.len());

    if pages.is_empty() {
        return Vec::new();
    }

    let mut sections = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut start = 0;

    for (idx, page) in pages.iter().enumerate() {
        let Some((label, level)) = first_heading(page.as_ref()) else {
            continue;
        };

        if idx > start {
            sections.push(Section::new(breadcrumb(&stack), start, idx - 1));
        }

        while stack.len() >= level as usize {
            stack.pop();
        }
        debug!("Page {}: level-{} heading {:?}", idx + 1, level, label);
        stack.push(label);
        start = idx;
    }

    sections.push(Section::new(breadcrumb(&stack), start, pages.len() - 1));

    info!("Created {} sections", sections.len());
    sections
}

fn breadcrumb(stack: &[String]) -> Vec<String> {
    if stack.is_empty() {
        vec![FALLBACK_TITLE.to_string()]
    } else {
        stack.to_vec()
    }
}
