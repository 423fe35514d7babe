use super::dates::NormalizedDate;
use crate::constants::ONGOING_KEYWORD_PATTERNS;
use crate::types::DeclarationStatus;
use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Rules that can declare a record active, evaluated in table order.
/// A record matching none of them is expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusRule {
    SentinelEndDate,
    OngoingKeyword,
    FutureEndDate,
}

pub const DEFAULT_STATUS_RULES: &[StatusRule] = &[
    StatusRule::SentinelEndDate,
    StatusRule::OngoingKeyword,
    StatusRule::FutureEndDate,
];

/// Everything the resolver looks at for one record
#[derive(Debug, Clone, Copy)]
pub struct StatusInput<'a> {
    pub end_date: NormalizedDate,
    pub event_name: &'a str,
    pub title: Option<&'a str>,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDecision {
    pub status: DeclarationStatus,
    /// The rule that made the record active, if any
    pub matched_rule: Option<StatusRule>,
    /// Unparseable end-date text decided by fall-through
    pub ambiguous: bool,
}

impl StatusDecision {
    /// Expiry date implied by the decision. Active records carry no end date.
    pub fn expiry_date(&self, end_date: NormalizedDate) -> Option<NaiveDate> {
        match self.status {
            DeclarationStatus::Active => None,
            DeclarationStatus::Expired => end_date.date(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusResolver {
    rules: Vec<StatusRule>,
    ongoing: Regex,
}

impl Default for StatusResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusResolver {
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_STATUS_RULES, ONGOING_KEYWORD_PATTERNS)
            .expect("built-in ongoing keyword patterns compile")
    }

    pub fn with_rules(rules: &[StatusRule], ongoing_patterns: &[&str]) -> Result<Self, regex::Error> {
        let ongoing = RegexBuilder::new(&ongoing_patterns.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            rules: rules.to_vec(),
            ongoing,
        })
    }

    pub fn is_ongoing_name(&self, text: &str) -> bool {
        self.ongoing.is_match(text.trim())
    }

    pub fn resolve(&self, input: &StatusInput<'_>) -> StatusDecision {
        for rule in &self.rules {
            if self.rule_matches(*rule, input) {
                return StatusDecision {
                    status: DeclarationStatus::Active,
                    matched_rule: Some(*rule),
                    ambiguous: false,
                };
            }
        }

        StatusDecision {
            status: DeclarationStatus::Expired,
            matched_rule: None,
            ambiguous: matches!(input.end_date, NormalizedDate::Unparsed),
        }
    }

    fn rule_matches(&self, rule: StatusRule, input: &StatusInput<'_>) -> bool {
        match rule {
            StatusRule::SentinelEndDate => input.end_date.is_sentinel(),
            StatusRule::OngoingKeyword => {
                self.is_ongoing_name(input.event_name)
                    || input.title.map(|t| self.is_ongoing_name(t)).unwrap_or(false)
            }
            StatusRule::FutureEndDate => match input.end_date {
                NormalizedDate::Date(end) => end > input.as_of,
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn input(end_date: NormalizedDate, event_name: &str) -> StatusInput<'_> {
        StatusInput {
            end_date,
            event_name,
            title: None,
            as_of: ymd(2025, 6, 1),
        }
    }

    #[test]
    fn test_sentinel_is_active() {
        let resolver = StatusResolver::new();
        let decision = resolver.resolve(&input(NormalizedDate::Sentinel, "NSW Floods"));
        assert_eq!(decision.status, DeclarationStatus::Active);
        assert_eq!(decision.matched_rule, Some(StatusRule::SentinelEndDate));
        assert_eq!(decision.expiry_date(NormalizedDate::Sentinel), None);
    }

    #[test]
    fn test_ongoing_keyword_overrides_past_date() {
        let resolver = StatusResolver::new();
        let past = NormalizedDate::Date(ymd(2020, 1, 31));
        for name in [
            "Severe weather from 1 November 2024 onwards",
            "Bushfires commencing 30 December 2019",
            "Continuing drought conditions",
            "Queensland flooding from 2022",
        ] {
            let decision = resolver.resolve(&input(past, name));
            assert_eq!(decision.status, DeclarationStatus::Active, "{}", name);
            assert_eq!(decision.matched_rule, Some(StatusRule::OngoingKeyword));
            assert_eq!(decision.expiry_date(past), None);
        }
    }

    #[test]
    fn test_keyword_in_title_only() {
        let resolver = StatusResolver::new();
        let mut status_input = input(NormalizedDate::Date(ymd(2021, 3, 1)), "Storms");
        status_input.title = Some("Storms and flooding commencing 1 March 2021");
        assert_eq!(resolver.resolve(&status_input).status, DeclarationStatus::Active);
    }

    #[test]
    fn test_year_keyword_must_end_the_name() {
        let resolver = StatusResolver::new();
        let decision = resolver.resolve(&input(
            NormalizedDate::Date(ymd(2022, 5, 1)),
            "Flooding from 2022 in the Northern Rivers",
        ));
        assert_eq!(decision.status, DeclarationStatus::Expired);
    }

    #[test]
    fn test_future_end_date_is_active() {
        let resolver = StatusResolver::new();
        let future = NormalizedDate::Date(ymd(2025, 12, 31));
        let decision = resolver.resolve(&input(future, "Tropical Cyclone Alfred"));
        assert_eq!(decision.status, DeclarationStatus::Active);
        assert_eq!(decision.matched_rule, Some(StatusRule::FutureEndDate));
    }

    #[test]
    fn test_past_end_date_is_expired() {
        let resolver = StatusResolver::new();
        let past = NormalizedDate::Date(ymd(2024, 1, 1));
        let decision = resolver.resolve(&input(past, "Tropical Cyclone Jasper"));
        assert_eq!(decision.status, DeclarationStatus::Expired);
        assert!(!decision.ambiguous);
        assert_eq!(decision.expiry_date(past), Some(ymd(2024, 1, 1)));
    }

    #[test]
    fn test_end_date_today_is_expired() {
        let resolver = StatusResolver::new();
        let decision = resolver.resolve(&input(NormalizedDate::Date(ymd(2025, 6, 1)), "Storm"));
        assert_eq!(decision.status, DeclarationStatus::Expired);
    }

    #[test]
    fn test_unparsed_falls_through_as_ambiguous() {
        let resolver = StatusResolver::new();
        let decision = resolver.resolve(&input(NormalizedDate::Unparsed, "Flooding"));
        assert_eq!(decision.status, DeclarationStatus::Expired);
        assert!(decision.ambiguous);

        let decision = resolver.resolve(&input(NormalizedDate::Unparsed, "Flooding onwards"));
        assert_eq!(decision.status, DeclarationStatus::Active);
        assert!(!decision.ambiguous);
    }

    #[test]
    fn test_custom_rule_table() {
        let resolver = StatusResolver::with_rules(&[StatusRule::SentinelEndDate], &["ongoing"]).unwrap();
        let future = NormalizedDate::Date(ymd(2030, 1, 1));
        assert_eq!(resolver.resolve(&input(future, "Drought")).status, DeclarationStatus::Expired);
        assert!(resolver.is_ongoing_name("Ongoing drought"));
    }
}
