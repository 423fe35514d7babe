use super::dates::{DateNormalizer, NormalizedDate};
use super::fields::{find_state_in_text, map_disaster_type, map_state_code, normalize_reference_id};
use super::location::LocationExtractor;
use super::status::{StatusInput, StatusResolver};
use crate::app::ports::Document;
use crate::constants::{
    END_DATE_LABELS, NAME_LABELS, REFERENCE_LABELS, START_DATE_LABELS, STATE_LABELS, TYPE_LABELS,
};
use crate::error::ExtractionError;
use crate::strategies::DetailPage;
use crate::types::{CrawlCandidate, DisasterRecord, DisasterType, ReviewReason};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Turns one detail document plus its listing summary into a canonical
/// record. Detail-page quick facts win over the summary row; either may
/// be missing.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    dates: DateNormalizer,
    status: StatusResolver,
    locations: LocationExtractor,
    extractor_version: String,
}

impl RecordExtractor {
    /// Extractor with the built-in rule tables, versioned after the strategy
    /// that parsed the documents.
    pub fn new(strategy_name: &str) -> Self {
        Self::with_components(
            DateNormalizer::new(),
            StatusResolver::new(),
            LocationExtractor::new(),
            format!("{}/{}", strategy_name, env!("CARGO_PKG_VERSION")),
        )
    }

    pub fn with_components(
        dates: DateNormalizer,
        status: StatusResolver,
        locations: LocationExtractor,
        extractor_version: impl Into<String>,
    ) -> Self {
        Self {
            dates,
            status,
            locations,
            extractor_version: extractor_version.into(),
        }
    }

    pub fn extractor_version(&self) -> &str {
        &self.extractor_version
    }

    pub fn extract(
        &self,
        candidate: &CrawlCandidate,
        detail: &DetailPage,
        document: &Document,
        extracted_at: DateTime<Utc>,
    ) -> Result<DisasterRecord, ExtractionError> {
        let summary = &candidate.summary;
        let title = detail.title.as_deref();

        let reference_id = candidate
            .reference_id
            .clone()
            .or_else(|| detail.fact(REFERENCE_LABELS).and_then(normalize_reference_id))
            .or_else(|| title.and_then(normalize_reference_id))
            .or_else(|| normalize_reference_id(&candidate.detail_url))
            .ok_or_else(|| ExtractionError::IdentityMissing {
                url: candidate.detail_url.clone(),
            })?;

        let mut review_reasons = Vec::new();

        let event_name = summary
            .event_name
            .clone()
            .or_else(|| title.map(str::to_string))
            .or_else(|| detail.fact(NAME_LABELS).map(str::to_string))
            .unwrap_or_else(|| reference_id.clone());

        let end_text = detail.fact(END_DATE_LABELS).or(summary.end_date_text.as_deref());
        if end_text.is_none() {
            review_reasons.push(ReviewReason::MissingEndDate);
        }
        let raw_end_date_text = end_text.unwrap_or_default().trim().to_string();
        let end_date = self.dates.normalize(&raw_end_date_text);
        if end_date == NormalizedDate::Unparsed {
            review_reasons.push(ReviewReason::UnparsedEndDate {
                text: raw_end_date_text.clone(),
            });
        }

        let declaration_date = match detail.fact(START_DATE_LABELS).or(summary.start_date_text.as_deref()) {
            Some(text) => match self.dates.normalize(text) {
                NormalizedDate::Date(date) => Some(date),
                NormalizedDate::Sentinel => None,
                NormalizedDate::Unparsed => {
                    review_reasons.push(ReviewReason::UnparsedDeclarationDate {
                        text: text.trim().to_string(),
                    });
                    None
                }
            },
            None => None,
        };

        let decision = self.status.resolve(&StatusInput {
            end_date,
            event_name: &event_name,
            title,
            as_of: extracted_at.date_naive(),
        });

        let disaster_type = match detail.fact(TYPE_LABELS).or(summary.type_text.as_deref()) {
            Some(label) => match map_disaster_type(label) {
                DisasterType::Other => map_disaster_type(&event_name),
                mapped => mapped,
            },
            None => map_disaster_type(&event_name),
        };

        let state_code = detail
            .fact(STATE_LABELS)
            .or(summary.jurisdiction_text.as_deref())
            .and_then(map_state_code)
            .or_else(|| title.and_then(find_state_in_text))
            .or_else(|| find_state_in_text(&event_name));
        if state_code.is_none() {
            review_reasons.push(ReviewReason::UnknownJurisdiction);
        }

        let affected_areas = self.locations.extract(&detail.area_candidates);

        if !review_reasons.is_empty() {
            debug!(
                reference_id = %reference_id,
                reasons = review_reasons.len(),
                ambiguous_status = decision.ambiguous,
                "Record flagged for review"
            );
        }

        Ok(DisasterRecord {
            reference_id,
            event_name,
            disaster_type,
            declaration_date,
            expiry_date: decision.expiry_date(end_date),
            raw_end_date_text,
            status: decision.status,
            state_code,
            affected_areas,
            source_url: document.url.clone(),
            extracted_at,
            extractor_version: self.extractor_version.clone(),
            needs_review: !review_reasons.is_empty(),
            review_reasons,
            document_sha256: document.sha256(),
        })
    }
}
