use crate::constants::{
    AREA_DENIED_KEYWORDS, AREA_EXCLUDED_PHRASES, AREA_MAX_LEN, AREA_MIN_LEN, AREA_URL_MARKERS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Filter tables for area-name candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRules {
    pub excluded_phrases: Vec<String>,
    pub denied_keywords: Vec<String>,
    pub url_markers: Vec<String>,
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for AreaRules {
    fn default() -> Self {
        Self {
            excluded_phrases: to_lower(AREA_EXCLUDED_PHRASES),
            denied_keywords: to_lower(AREA_DENIED_KEYWORDS),
            url_markers: to_lower(AREA_URL_MARKERS),
            min_len: AREA_MIN_LEN,
            max_len: AREA_MAX_LEN,
        }
    }
}

fn to_lower(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// Which filter rejected a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Length,
    Shape,
    UrlLike,
    DeniedKeyword,
    ExcludedPhrase,
}

/// Heuristic isolation of area names from page boilerplate
#[derive(Debug, Clone, Default)]
pub struct LocationExtractor {
    rules: AreaRules,
}

impl LocationExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: AreaRules) -> Self {
        Self { rules }
    }

    /// Returns the first rule the candidate fails, if any
    pub fn check(&self, candidate: &str) -> Result<(), Rejection> {
        let len = candidate.chars().count();
        if len < self.rules.min_len || len > self.rules.max_len {
            return Err(Rejection::Length);
        }

        let mut chars = candidate.chars();
        let shape_ok = matches!(
            (chars.next(), chars.next()),
            (Some(first), Some(second)) if first.is_uppercase() && second.is_lowercase()
        );
        if !shape_ok {
            return Err(Rejection::Shape);
        }

        let lower = candidate.to_lowercase();
        if self.rules.url_markers.iter().any(|m| lower.contains(m.as_str())) {
            return Err(Rejection::UrlLike);
        }
        if self.rules.denied_keywords.iter().any(|k| lower.contains(k.as_str())) {
            return Err(Rejection::DeniedKeyword);
        }
        if self
            .rules
            .excluded_phrases
            .iter()
            .any(|p| contains_phrase(&lower, p))
        {
            return Err(Rejection::ExcludedPhrase);
        }
        Ok(())
    }

    pub fn is_area_name(&self, candidate: &str) -> bool {
        self.check(candidate).is_ok()
    }

    /// Filters raw list-item texts down to a deduplicated, first-seen-ordered
    /// set of area names.
    pub fn extract<I, S>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut areas = Vec::new();
        for raw in candidates {
            let candidate = raw.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
            if !self.is_area_name(&candidate) {
                continue;
            }
            if seen.insert(candidate.to_lowercase()) {
                areas.push(candidate);
            }
        }
        areas
    }
}

/// Case-folded containment on word boundaries, so "home" excludes
/// "Home page" but not "Homebush".
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_boilerplate_and_urls() {
        let extractor = LocationExtractor::new();
        let areas = extractor.extract([
            "Brisbane",
            "Logan",
            "Queensland Reconstruction Authority",
            "http://example.com",
        ]);
        assert_eq!(areas, vec!["Brisbane".to_string(), "Logan".to_string()]);
    }

    #[test]
    fn test_denied_keywords() {
        let extractor = LocationExtractor::new();
        assert_eq!(extractor.check("Disaster Recovery Allowance"), Err(Rejection::DeniedKeyword));
        assert_eq!(extractor.check("Emergency grants"), Err(Rejection::DeniedKeyword));
        assert_eq!(extractor.check("Counter disaster operations"), Err(Rejection::DeniedKeyword));
    }

    #[test]
    fn test_excluded_phrases_respect_word_boundaries() {
        let extractor = LocationExtractor::new();
        assert_eq!(extractor.check("Home"), Err(Rejection::ExcludedPhrase));
        assert_eq!(extractor.check("Skip to content"), Err(Rejection::ExcludedPhrase));
        assert!(extractor.is_area_name("Homebush"));
        assert!(extractor.is_area_name("Stormlea"));
    }

    #[test]
    fn test_shape_and_length() {
        let extractor = LocationExtractor::new();
        assert_eq!(extractor.check("Ab"), Err(Rejection::Length));
        assert_eq!(extractor.check(&"Long".repeat(20)), Err(Rejection::Length));
        assert_eq!(extractor.check("brisbane"), Err(Rejection::Shape));
        assert_eq!(extractor.check("NSW"), Err(Rejection::Shape));
        assert_eq!(extractor.check("Call 180 22 66 or email info@example.org"), Err(Rejection::UrlLike));
    }

    #[test]
    fn test_dedupes_in_first_seen_order() {
        let extractor = LocationExtractor::new();
        let areas = extractor.extract(["Logan", "Brisbane", "Logan", "  Gold   Coast ", "Gold Coast"]);
        assert_eq!(areas, vec!["Logan", "Brisbane", "Gold Coast"]);
    }

    #[test]
    fn test_custom_rules_are_data() {
        let mut rules = AreaRules::default();
        rules.excluded_phrases.push("logan".to_string());
        let extractor = LocationExtractor::with_rules(rules);
        assert_eq!(extractor.extract(["Brisbane", "Logan"]), vec!["Brisbane"]);
    }
}
