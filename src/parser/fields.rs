use crate::constants::{DISASTER_TYPE_KEYWORDS, STATE_NAMES};
use crate::types::{DisasterType, StateCode};
use once_cell::sync::Lazy;
use regex::Regex;

static AGRN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bAGRN[\s\-:#]*(\d+)\b").expect("AGRN pattern"));
static BARE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)\s*$").expect("digits pattern"));

/// Canonical `AGRN-<digits>` reference from a cell or link text.
/// A cell holding only digits is read as the AGRN number.
pub fn normalize_reference_id(text: &str) -> Option<String> {
    AGRN_PATTERN
        .captures(text)
        .or_else(|| BARE_DIGITS.captures(text))
        .map(|caps| format!("AGRN-{}", &caps[1]))
}

/// Maps a free-text disaster type label onto the canonical enum
pub fn map_disaster_type(label: &str) -> DisasterType {
    let lower = label.to_lowercase();
    DISASTER_TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .and_then(|(code, _)| DisasterType::from_code(code))
        .unwrap_or(DisasterType::Other)
}

/// Maps a jurisdiction cell ("QLD", "Queensland", "New South Wales") to a state code
pub fn map_state_code(label: &str) -> Option<StateCode> {
    let lower = label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if lower.is_empty() {
        return None;
    }
    STATE_NAMES
        .iter()
        .find(|(name, _)| lower == *name)
        .and_then(|(_, code)| StateCode::from_code(code))
        .or_else(|| find_state_in_text(label))
}

/// Scans running text for a jurisdiction. Full names match case-insensitively;
/// abbreviations only in upper case so "act" in prose is not read as the ACT.
pub fn find_state_in_text(text: &str) -> Option<StateCode> {
    let lower = text.to_lowercase();
    for (name, code) in STATE_NAMES.iter().filter(|(name, _)| name.contains(' ') || name.len() > 3) {
        if contains_word(&lower, name) {
            return StateCode::from_code(code);
        }
    }
    for (name, code) in STATE_NAMES.iter().filter(|(name, _)| !name.contains(' ') && name.len() <= 3) {
        if contains_word(text, &name.to_uppercase()) {
            return StateCode::from_code(code);
        }
    }
    None
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.map(|c| c.is_alphanumeric()).unwrap_or(false)
            && !after.map(|c| c.is_alphanumeric()).unwrap_or(false)
    })
}
