use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Disaster categories used by the canonical schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisasterType {
    Flood,
    Bushfire,
    Cyclone,
    SevereStorm,
    Earthquake,
    Drought,
    Other,
}

impl DisasterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisasterType::Flood => "flood",
            DisasterType::Bushfire => "bushfire",
            DisasterType::Cyclone => "cyclone",
            DisasterType::SevereStorm => "severe_storm",
            DisasterType::Earthquake => "earthquake",
            DisasterType::Drought => "drought",
            DisasterType::Other => "other",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "flood" => Some(DisasterType::Flood),
            "bushfire" => Some(DisasterType::Bushfire),
            "cyclone" => Some(DisasterType::Cyclone),
            "severe_storm" => Some(DisasterType::SevereStorm),
            "earthquake" => Some(DisasterType::Earthquake),
            "drought" => Some(DisasterType::Drought),
            "other" => Some(DisasterType::Other),
            _ => None,
        }
    }
}

/// The eight Australian jurisdictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateCode {
    Nsw,
    Vic,
    Qld,
    Sa,
    Wa,
    Tas,
    Nt,
    Act,
}

impl StateCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateCode::Nsw => "NSW",
            StateCode::Vic => "VIC",
            StateCode::Qld => "QLD",
            StateCode::Sa => "SA",
            StateCode::Wa => "WA",
            StateCode::Tas => "TAS",
            StateCode::Nt => "NT",
            StateCode::Act => "ACT",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NSW" => Some(StateCode::Nsw),
            "VIC" => Some(StateCode::Vic),
            "QLD" => Some(StateCode::Qld),
            "SA" => Some(StateCode::Sa),
            "WA" => Some(StateCode::Wa),
            "TAS" => Some(StateCode::Tas),
            "NT" => Some(StateCode::Nt),
            "ACT" => Some(StateCode::Act),
            _ => None,
        }
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eligibility status. Always derived by the status resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    Active,
    Expired,
}

impl DeclarationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationStatus::Active => "active",
            DeclarationStatus::Expired => "expired",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DeclarationStatus::Active)
    }
}

impl fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record was marked for manual review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    /// End-date text was present but matched no known format
    UnparsedEndDate { text: String },
    /// Declaration-date text was present but matched no known format
    UnparsedDeclarationDate { text: String },
    /// Neither the listing row nor the detail page carried an end-date field
    MissingEndDate,
    UnknownJurisdiction,
}

/// Canonical disaster declaration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasterRecord {
    pub reference_id: String,
    pub event_name: String,
    pub disaster_type: DisasterType,
    pub declaration_date: Option<NaiveDate>,
    /// `None` means "no end date", the active-disaster sentinel
    pub expiry_date: Option<NaiveDate>,
    pub raw_end_date_text: String,
    pub status: DeclarationStatus,
    pub state_code: Option<StateCode>,
    pub affected_areas: Vec<String>,
    pub source_url: String,
    pub extracted_at: DateTime<Utc>,
    pub extractor_version: String,
    pub needs_review: bool,
    pub review_reasons: Vec<ReviewReason>,
    /// SHA-256 of the detail document the record was extracted from
    pub document_sha256: String,
}

impl DisasterRecord {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Inline summary lifted from a listing row. Fields are `None` when the
/// listing did not carry the column at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryFields {
    pub start_date_text: Option<String>,
    pub end_date_text: Option<String>,
    pub jurisdiction_text: Option<String>,
    pub type_text: Option<String>,
    pub event_name: Option<String>,
}

/// One detail link discovered by the crawler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCandidate {
    pub reference_id: Option<String>,
    pub detail_url: String,
    pub summary: SummaryFields,
}
