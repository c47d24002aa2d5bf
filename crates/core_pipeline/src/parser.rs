//! Shopping-list text parser
//!
//! Turns raw recognized text into short item names. Rule based and tuned for
//! photographed lists: numbering, bullets and quantity annotations are
//! removed, anything shorter than two characters is dropped.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Items shorter than this (in characters) are discarded
pub const MIN_ITEM_CHARS: usize = 2;

static BULLETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[·•\-–—*]+").unwrap());
static TABS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\t+").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n|[,;]+").unwrap());
// Digits and word boundaries below are ASCII-only
static NUMBERING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[0-9]{1,3}[.)]\s*").unwrap());
static MULTIPLIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(x\s*[0-9]+|[0-9]+\s*x)\s*").unwrap());
static LEADING_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[0-9]+([.,][0-9]+)?\s*(kg|g|gr|l|ml|uds?|unidades)(?-u:\b)\.?").unwrap()
});
static ANY_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)[0-9]+([.,][0-9]+)?\s*(kg|g|gr|l|ml|uds?|unidades)(?-u:\b)\.?").unwrap()
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static LEADING_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-–—]\s*").unwrap());

/// Split recognized text into deduplicated item names
///
/// Order of first appearance is kept, as is the casing of the first
/// occurrence. Duplicates are detected case-insensitively.
pub fn parse_list(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    let text = input.replace("\r\n", "\n").replace('\r', "\n");
    let text = BULLETS.replace_all(&text, "\n");
    let text = TABS.replace_all(&text, " ");
    let text = SPACES.replace_all(&text, " ");

    let mut seen = HashSet::new();
    SEPARATORS
        .split(&text)
        .filter_map(clean_fragment)
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

/// Strip numbering and quantities from one fragment
///
/// Returns `None` if too little is left to be an item.
fn clean_fragment(fragment: &str) -> Option<String> {
    let s = NUMBERING.replace(fragment, "");
    let s = MULTIPLIER.replace(&s, "");
    let s = LEADING_UNIT.replace(&s, "");
    let s = ANY_UNIT.replace_all(&s, "");
    let s = WHITESPACE.replace_all(&s, " ");
    let s = LEADING_DASH.replace(s.trim(), "");
    let item = s.trim();

    (item.chars().count() >= MIN_ITEM_CHARS).then(|| item.to_string())
}
