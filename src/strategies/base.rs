use crate::app::ports::Document;
use crate::types::CrawlCandidate;
use reqwest::Url;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

/// One parsed listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub candidates: Vec<CrawlCandidate>,
    /// Absent when the page has no usable "next" control
    pub next_url: Option<String>,
}

/// Structured content lifted from a detail page, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailPage {
    pub title: Option<String>,
    /// Key-value "quick facts" in document order
    pub quick_facts: Vec<(String, String)>,
    /// Raw list-item texts that might be area names
    pub area_candidates: Vec<String>,
}

impl DetailPage {
    /// First fact whose key contains one of `labels`, tried in label order
    pub fn fact(&self, labels: &[&str]) -> Option<&str> {
        labels.iter().find_map(|label| {
            self.quick_facts
                .iter()
                .find(|(key, _)| key.to_lowercase().contains(label))
                .map(|(_, value)| value.as_str())
        })
    }
}

/// Trait for source-specific document parsing logic. Two implementations
/// traverse the same markup differently so their results can be compared.
pub trait ExtractionStrategy: Send + Sync {
    /// Stable name, recorded on every record as part of the extractor version
    fn name(&self) -> &'static str;

    /// Parse a listing page. `page_number` is 1-based.
    fn parse_listing(&self, document: &Document, page_number: u32) -> ListingPage;

    /// Parse a detail page
    fn parse_detail(&self, document: &Document) -> DetailPage;
}

/// Element text with whitespace collapsed
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Resolves `href` against the document URL, dropping fragments
pub(crate) fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let base = Url::parse(base).ok()?;
    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_href() {
        let base = "https://registry.test/find-a-disaster/australian-disasters";
        assert_eq!(
            resolve_href(base, "/disasters/agrn-1100#top").as_deref(),
            Some("https://registry.test/disasters/agrn-1100")
        );
        assert_eq!(
            resolve_href(base, "?page=1").as_deref(),
            Some("https://registry.test/find-a-disaster/australian-disasters?page=1")
        );
        assert_eq!(resolve_href(base, "#"), None);
        assert_eq!(resolve_href(base, "javascript:void(0)"), None);
    }

    #[test]
    fn test_fact_lookup_follows_label_priority() {
        let page = DetailPage {
            title: None,
            quick_facts: vec![
                ("Start date".to_string(), "1 March 2025".to_string()),
                ("End date".to_string(), "-".to_string()),
            ],
            area_candidates: vec![],
        };
        assert_eq!(page.fact(&["end date", "end"]), Some("-"));
        assert_eq!(page.fact(&["start date"]), Some("1 March 2025"));
        assert_eq!(page.fact(&["agrn"]), None);
    }
}
