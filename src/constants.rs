//! Rule tables shared by the normalizers. Extending a heuristic means editing
//! one of these tables, not the code that evaluates them.

/// Default listing root of the public disaster registry.
pub const DEFAULT_LISTING_URL: &str =
    "https://www.disasterassist.gov.au/find-a-disaster/australian-disasters";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

// Strategy names (used in config and CLI)
pub const TABLE_ROWS_STRATEGY: &str = "table_rows";
pub const ANCHOR_SCAN_STRATEGY: &str = "anchor_scan";

/// End-date texts that mean "intentionally blank", compared after trimming
/// and case-folding.
pub const END_DATE_SENTINELS: &[&str] = &["", "-", "–", "—", "- -", "--", "– –", "n/a", "na"];

/// Event-name patterns marking a declaration that has no end in sight.
pub const ONGOING_KEYWORD_PATTERNS: &[&str] =
    &[r"onwards", r"commencing", r"continuing", r"from \d{4}$"];

/// Boilerplate that shows up inside list markup on detail pages but is not
/// an area name. Matched case-insensitively on word boundaries.
pub const AREA_EXCLUDED_PHRASES: &[&str] = &[
    "Home",
    "Contact",
    "About",
    "Help",
    "Search",
    "Menu",
    "Services Australia",
    "Skip to",
    "Portfolio",
    "Border",
    "Find a disaster",
    "Getting help",
    "How to help",
    "Disaster arrangements",
    "Key contacts",
    "Web privacy",
    "Accessibility",
    "Freedom of information",
    "Copyright",
    "Privacy",
    "Lost or damaged",
    "National Emergency",
    "Disaster Recovery Funding",
    "Bushfire",
    "Storm",
    "Flood",
    "Cyclone",
    "Drought",
    "Information publication scheme",
    "Queensland Reconstruction Authority",
    "NSW Rural Assistance Authority",
    "NSW Reconstruction Authority",
    "Emergency assistance grants",
    "TasRecovery",
    "VicEmergency",
    "Emergency Recovery Victoria",
    "Service NSW",
    "Recovering from emergencies",
    "Personal hardship",
    "Personal and financial counselling",
    "Removal of debris",
    "Counter disaster operations",
    "Restoration of essential public assets",
    "Freight subsidies",
    "Government of South Australia",
    "Western Australia Department",
    "Department of Foreign Affairs",
];

/// Any area candidate containing one of these (case-insensitive) is rejected.
pub const AREA_DENIED_KEYWORDS: &[&str] = &[
    "assistance",
    "recovery",
    "authority",
    "department",
    "government",
    "scheme",
    "grants",
    "operations",
    "counselling",
    "restoration",
];

/// Substrings that make a candidate look like a link or contact detail.
pub const AREA_URL_MARKERS: &[&str] = &["http", "www.", "://", "@"];

pub const AREA_MIN_LEN: usize = 3;
pub const AREA_MAX_LEN: usize = 50;

/// Keyword table for disaster types, checked in order.
pub const DISASTER_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("flood", &["flood"]),
    ("bushfire", &["bushfire", "wildfire", "fire"]),
    ("cyclone", &["cyclone"]),
    ("severe_storm", &["storm", "hail", "tornado"]),
    ("earthquake", &["earthquake", "tremor", "seismic"]),
    ("drought", &["drought", "dry conditions"]),
];

/// Jurisdiction names and abbreviations, longest names first so that
/// "Western Australia" is not read as a bare "Australia" mention.
pub const STATE_NAMES: &[(&str, &str)] = &[
    ("australian capital territory", "ACT"),
    ("northern territory", "NT"),
    ("new south wales", "NSW"),
    ("western australia", "WA"),
    ("south australia", "SA"),
    ("queensland", "QLD"),
    ("victoria", "VIC"),
    ("tasmania", "TAS"),
    ("nsw", "NSW"),
    ("vic", "VIC"),
    ("qld", "QLD"),
    ("act", "ACT"),
    ("tas", "TAS"),
    ("wa", "WA"),
    ("sa", "SA"),
    ("nt", "NT"),
];

// Quick-facts labels, matched case-insensitively as substrings of the key
pub const END_DATE_LABELS: &[&str] = &["end date", "expiry", "ended", "end"];
pub const START_DATE_LABELS: &[&str] = &["start date", "date declared", "declared", "start"];
pub const STATE_LABELS: &[&str] = &["state", "territory", "jurisdiction"];
pub const TYPE_LABELS: &[&str] = &["disaster type", "event type", "hazard", "type"];
pub const NAME_LABELS: &[&str] = &["event name", "disaster name", "name"];
pub const REFERENCE_LABELS: &[&str] = &["agrn", "reference"];

/// Headings that introduce the affected-area list on a detail page.
pub const AREA_HEADING_MARKERS: &[&str] = &["local government area", "affected area", "lga"];
