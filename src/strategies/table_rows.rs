use super::base::{element_text, non_empty, resolve_href, DetailPage, ExtractionStrategy, ListingPage};
use crate::app::ports::Document;
use crate::constants::TABLE_ROWS_STRATEGY;
use crate::parser::fields::normalize_reference_id;
use crate::types::{CrawlCandidate, SummaryFields};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("table tr").expect("row selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("cell selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("link selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static DT: Lazy<Selector> = Lazy::new(|| Selector::parse("dt").expect("dt selector"));
static DD: Lazy<Selector> = Lazy::new(|| Selector::parse("dd").expect("dd selector"));
static LIST_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul li, ol li").expect("list item selector"));

/// Minimum cells for a row to count as a declaration row
const MIN_CELLS: usize = 5;

/// Reads the listing as a table: one declaration per row, columns in
/// registry order (start, end, jurisdiction, type, name, reference).
/// Detail pages are read with document-wide dt/dd pairing and every list
/// item as an area candidate.
pub struct TableRowStrategy;

impl TableRowStrategy {
    pub fn new() -> Self {
        Self
    }

    fn parse_row(&self, row: ElementRef<'_>, base_url: &str) -> Option<CrawlCandidate> {
        let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
        if cells.len() < MIN_CELLS {
            return None;
        }

        let link = row
            .select(&LINK)
            .find_map(|a| a.value().attr("href").and_then(|href| resolve_href(base_url, href)))?;

        let texts: Vec<String> = cells.iter().map(|c| element_text(*c)).collect();
        let reference_id = texts
            .last()
            .and_then(|t| normalize_reference_id(t))
            .or_else(|| row.select(&LINK).find_map(|a| normalize_reference_id(&element_text(a))));

        Some(CrawlCandidate {
            reference_id,
            detail_url: link,
            summary: SummaryFields {
                start_date_text: Some(texts[0].clone()),
                end_date_text: Some(texts[1].clone()),
                jurisdiction_text: Some(texts[2].clone()),
                type_text: Some(texts[3].clone()),
                event_name: non_empty(texts[4].clone()),
            },
        })
    }

    fn find_next(&self, html: &Html, base_url: &str) -> Option<String> {
        html.select(&LINK)
            .filter(|a| is_next_control(*a) && !is_disabled(*a))
            .find_map(|a| a.value().attr("href").and_then(|href| resolve_href(base_url, href)))
    }
}

impl Default for TableRowStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn is_next_control(a: ElementRef<'_>) -> bool {
    let text = element_text(a).to_lowercase();
    let rel_next = a.value().attr("rel").map(|r| r.contains("next")).unwrap_or(false);
    let aria_next = a
        .value()
        .attr("aria-label")
        .map(|l| l.to_lowercase().contains("next"))
        .unwrap_or(false);
    rel_next || aria_next || text.contains("next") || text == ">" || text == "›" || text == "»"
}

fn is_disabled(a: ElementRef<'_>) -> bool {
    let class_disabled = a.value().classes().any(|c| c == "disabled");
    let aria_disabled = a.value().attr("aria-disabled") == Some("true");
    let parent_disabled = a
        .parent()
        .and_then(ElementRef::wrap)
        .map(|p| p.value().classes().any(|c| c == "disabled"))
        .unwrap_or(false);
    class_disabled || aria_disabled || parent_disabled
}

impl ExtractionStrategy for TableRowStrategy {
    fn name(&self) -> &'static str {
        TABLE_ROWS_STRATEGY
    }

    fn parse_listing(&self, document: &Document, page_number: u32) -> ListingPage {
        let html = Html::parse_document(&document.body);
        let candidates: Vec<CrawlCandidate> = html
            .select(&ROW)
            .filter_map(|row| self.parse_row(row, &document.url))
            .collect();
        let next_url = self.find_next(&html, &document.url);

        debug!(
            strategy = TABLE_ROWS_STRATEGY,
            page = page_number,
            rows = candidates.len(),
            has_next = next_url.is_some(),
            "Parsed listing page"
        );

        ListingPage { candidates, next_url }
    }

    fn parse_detail(&self, document: &Document) -> DetailPage {
        let html = Html::parse_document(&document.body);

        let title = html.select(&H1).next().map(element_text).and_then(non_empty);

        // dt and dd are paired by position across the whole document
        let quick_facts = html
            .select(&DT)
            .zip(html.select(&DD))
            .map(|(dt, dd)| (element_text(dt), element_text(dd)))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();

        let area_candidates = html.select(&LIST_ITEM).map(element_text).collect();

        DetailPage {
            title,
            quick_facts,
            area_candidates,
        }
    }
}
