use super::base::{element_text, non_empty, resolve_href, DetailPage, ExtractionStrategy, ListingPage};
use crate::app::ports::Document;
use crate::constants::{ANCHOR_SCAN_STRATEGY, AREA_HEADING_MARKERS};
use crate::parser::fields::normalize_reference_id;
use crate::types::{CrawlCandidate, SummaryFields};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;

static DETAIL_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="/disasters/"]"#).expect("detail link selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("cell selector"));
static PAGER: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"nav[aria-label*="agination"], .pagination, .pager"#).expect("pager selector")
});
static PAGER_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("link selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));
static DEFINITION_LIST: Lazy<Selector> = Lazy::new(|| Selector::parse("dl").expect("dl selector"));
static HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4, h5").expect("heading selector"));
static LIST: Lazy<Selector> = Lazy::new(|| Selector::parse("ul, ol").expect("list selector"));
static LIST_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("li selector"));

static PROPER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][a-z]+(\s+[A-Z][a-z]+)*$").expect("proper name pattern"));

/// Minimum list size for the fallback area scan
const FALLBACK_MIN_ITEMS: usize = 3;

/// Walks detail anchors rather than rows, lifting summary cells from the
/// enclosing row when there is one. Pages by the `page` query parameter
/// while a pagination control advertises a later page. Area names come
/// from lists under an affected-area heading.
pub struct AnchorScanStrategy;

impl AnchorScanStrategy {
    pub fn new() -> Self {
        Self
    }

    fn candidate_for(&self, anchor: ElementRef<'_>, href: String) -> CrawlCandidate {
        let link_text = element_text(anchor);
        let row = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "tr");
        let cells: Vec<String> = row
            .map(|r| r.select(&CELL).map(element_text).collect())
            .unwrap_or_default();

        let reference_id = normalize_reference_id(&link_text)
            .or_else(|| cells.iter().rev().find_map(|c| normalize_reference_id(c)));

        let summary = if cells.len() >= 5 {
            SummaryFields {
                start_date_text: Some(cells[0].clone()),
                end_date_text: Some(cells[1].clone()),
                jurisdiction_text: Some(cells[2].clone()),
                type_text: Some(cells[3].clone()),
                event_name: non_empty(cells[4].clone()).or_else(|| non_empty(link_text.clone())),
            }
        } else {
            SummaryFields {
                event_name: non_empty(link_text),
                ..SummaryFields::default()
            }
        };

        CrawlCandidate {
            reference_id,
            detail_url: href,
            summary,
        }
    }

    fn next_page_url(&self, html: &Html, document_url: &str) -> Option<String> {
        let current = Url::parse(document_url).ok()?;
        let current_index = page_index(&current).unwrap_or(0);

        let advertises_later_page = html.select(&PAGER).any(|pager| {
            pager
                .select(&PAGER_LINK)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| current.join(href).ok())
                .filter_map(|url| page_index(&url))
                .any(|index| index > current_index)
        });
        if !advertises_later_page {
            return None;
        }

        let mut next = current.clone();
        let pairs: Vec<(String, String)> = current
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut query = next.query_pairs_mut();
            query.clear();
            for (k, v) in &pairs {
                query.append_pair(k, v);
            }
            query.append_pair("page", &(current_index + 1).to_string());
        }
        Some(next.to_string())
    }

    fn areas_under_headings(&self, html: &Html) -> Vec<String> {
        let mut items = Vec::new();
        for heading in html.select(&HEADING) {
            let text = element_text(heading).to_lowercase();
            if !AREA_HEADING_MARKERS.iter().any(|m| text.contains(m)) {
                continue;
            }
            let level = heading.value().name();
            for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
                let name = sibling.value().name();
                if is_heading(name) && name <= level {
                    break;
                }
                if name == "ul" || name == "ol" {
                    items.extend(sibling.select(&LIST_ITEM).map(element_text));
                } else {
                    for list in sibling.select(&LIST) {
                        items.extend(list.select(&LIST_ITEM).map(element_text));
                    }
                }
            }
        }
        items
    }

    fn areas_from_name_lists(&self, html: &Html) -> Vec<String> {
        let mut items = Vec::new();
        for list in html.select(&LIST) {
            let texts: Vec<String> = list.select(&LIST_ITEM).map(element_text).collect();
            if texts.len() >= FALLBACK_MIN_ITEMS && texts.iter().any(|t| PROPER_NAME.is_match(t)) {
                items.extend(texts);
            }
        }
        items
    }
}

impl Default for AnchorScanStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn page_index(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

impl ExtractionStrategy for AnchorScanStrategy {
    fn name(&self) -> &'static str {
        ANCHOR_SCAN_STRATEGY
    }

    fn parse_listing(&self, document: &Document, page_number: u32) -> ListingPage {
        let html = Html::parse_document(&document.body);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for anchor in html.select(&DETAIL_LINK) {
            let Some(href) = anchor
                .value()
                .attr("href")
                .and_then(|h| resolve_href(&document.url, h))
            else {
                continue;
            };
            if seen.insert(href.clone()) {
                candidates.push(self.candidate_for(anchor, href));
            }
        }

        let next_url = self.next_page_url(&html, &document.url);
        debug!(
            strategy = ANCHOR_SCAN_STRATEGY,
            page = page_number,
            links = candidates.len(),
            has_next = next_url.is_some(),
            "Parsed listing page"
        );

        ListingPage { candidates, next_url }
    }

    fn parse_detail(&self, document: &Document) -> DetailPage {
        let html = Html::parse_document(&document.body);

        let title = html
            .select(&H1)
            .next()
            .or_else(|| html.select(&TITLE).next())
            .map(element_text)
            .and_then(non_empty);

        // Pair each dt with the dd that follows it inside the same list
        let mut quick_facts = Vec::new();
        for dl in html.select(&DEFINITION_LIST) {
            let mut pending_key: Option<String> = None;
            for child in dl.children().filter_map(ElementRef::wrap) {
                match child.value().name() {
                    "dt" => pending_key = non_empty(element_text(child)),
                    "dd" => {
                        if let Some(key) = pending_key.take() {
                            let value = element_text(child);
                            if !value.is_empty() {
                                quick_facts.push((key, value));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut area_candidates = self.areas_under_headings(&html);
        if area_candidates.is_empty() {
            area_candidates = self.areas_from_name_lists(&html);
        }

        DetailPage {
            title,
            quick_facts,
            area_candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://registry.test/find-a-disaster/australian-disasters";

    #[test]
    fn test_parse_listing_from_anchors() {
        let body = r#"
            <table><tbody>
              <tr><td>1 March 2025</td><td>-</td><td>QLD</td><td>Cyclone</td>
                  <td><a href="/disasters/tc-alfred">Tropical Cyclone Alfred</a></td><td>AGRN 1205</td></tr>
            </tbody></table>
            <aside><a href="/disasters/agrn-1300">AGRN-1300 Bushfires</a></aside>
            <a href="/disasters/tc-alfred">Duplicate link</a>
            <nav aria-label="Pagination"><a href="?page=1">2</a><a href="?page=4">Last</a></nav>
        "#;
        let doc = Document::new(ROOT, body);
        let page = AnchorScanStrategy::new().parse_listing(&doc, 1);

        assert_eq!(page.candidates.len(), 2);
        assert_eq!(page.candidates[0].reference_id.as_deref(), Some("AGRN-1205"));
        assert_eq!(page.candidates[0].summary.end_date_text.as_deref(), Some("-"));
        assert_eq!(page.candidates[1].reference_id.as_deref(), Some("AGRN-1300"));
        assert_eq!(page.candidates[1].summary.end_date_text, None);
        assert_eq!(page.next_url.as_deref(), Some(format!("{}?page=1", ROOT).as_str()));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let body = r#"<a href="/disasters/x">AGRN 1</a>
            <nav class="pagination"><a href="?page=0">1</a><a href="?page=3">4</a></nav>"#;
        let doc = Document::new(format!("{}?page=3", ROOT), body);
        let page = AnchorScanStrategy::new().parse_listing(&doc, 4);
        assert_eq!(page.next_url, None);
    }

    #[test]
    fn test_no_pager_means_no_next() {
        let doc = Document::new(ROOT, r#"<a href="/disasters/x">AGRN 1</a>"#);
        assert_eq!(AnchorScanStrategy::new().parse_listing(&doc, 1).next_url, None);
    }

    #[test]
    fn test_detail_areas_under_heading() {
        let body = r#"
            <h1>Tropical Cyclone Alfred</h1>
            <ul><li>Home</li><li>Getting help</li><li>Contact</li></ul>
            <dl><dt>Start date</dt><dd>1 March 2025</dd><dt>End date</dt><dd>-</dd></dl>
            <h2>Affected areas</h2>
            <p>The following Local Government Areas:</p>
            <ul><li>Brisbane</li><li>Logan</li></ul>
            <h2>Assistance</h2>
            <ul><li>Personal hardship</li></ul>
        "#;
        let doc = Document::new("https://registry.test/disasters/tc-alfred", body);
        let detail = AnchorScanStrategy::new().parse_detail(&doc);

        assert_eq!(detail.title.as_deref(), Some("Tropical Cyclone Alfred"));
        assert_eq!(detail.fact(&["start date"]), Some("1 March 2025"));
        assert_eq!(detail.area_candidates, vec!["Brisbane", "Logan"]);
    }

    #[test]
    fn test_detail_falls_back_to_name_lists() {
        let body = r#"
            <ul><li>Home</li><li>About</li></ul>
            <ul><li>Brisbane</li><li>Gold Coast</li><li>Logan</li></ul>
        "#;
        let doc = Document::new("https://registry.test/disasters/x", body);
        let detail = AnchorScanStrategy::new().parse_detail(&doc);
        assert_eq!(detail.area_candidates, vec!["Brisbane", "Gold Coast", "Logan"]);
    }
}
