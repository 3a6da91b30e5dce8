//! Caption validation
//!
//! PDF-native captions are often bare labels ("Figure 3", "Table IV.") that
//! say nothing about the image. Those are replaced by generated captions.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Captions containing this word must be at least `LABEL_MIN_CHARS` long
const LABEL_WORD: &str = "Figure";
const LABEL_MIN_CHARS: usize = 15;

fn bare_label() -> &'static Regex {
    static BARE_LABEL: OnceLock<Regex> = OnceLock::new();
    BARE_LABEL.get_or_init(|| {
        Regex::new(r"(?i)^(figure|fig\.?|table|tab\.?|image|img\.?|chart|diagram|plate)\s*[\w.\-]*\s*[:.]?$")
            .expect("label pattern is valid")
    })
}

/// Whether a caption describes its image well enough to be embedded as-is
pub fn is_valid_caption(caption: Option<&str>, min_words: usize) -> bool {
    let Some(caption) = caption.map(str::trim) else {
        return false;
    };
    if caption.is_empty() {
        return false;
    }
    if caption.split_whitespace().count() < min_words {
        return false;
    }
    if bare_label().is_match(caption) {
        return false;
    }
    if caption.contains(LABEL_WORD) && caption.chars().count() < LABEL_MIN_CHARS {
        return false;
    }
    true
}
