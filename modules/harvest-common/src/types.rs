use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Placeholder for optional record fields the page did not provide.
pub const UNKNOWN: &str = "unknown";

/// Placeholder for a date node that was present but held nothing recognizable.
pub const DATE_NOT_FOUND: &str = "date not found";

// --- Subject ---

/// What the caller asked to harvest: a place name plus an optional locality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectQuery {
    pub name: String,
    pub location: Option<String>,
}

impl SubjectQuery {
    pub fn new(name: impl Into<String>, location: Option<String>) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }

    /// Free-text search terms, name first.
    pub fn search_terms(&self) -> String {
        match self.location.as_deref().map(str::trim) {
            Some(loc) if !loc.is_empty() => format!("{} {}", self.name.trim(), loc),
            _ => self.name.trim().to_string(),
        }
    }
}

/// Place-level metadata read once per harvest and stamped onto every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectMetadata {
    pub name: String,
    pub average_score: Option<String>,
    pub total_count: Option<String>,
}

// --- Identity ---

/// Opaque per-item identity as rendered by the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

impl ItemIdentity {
    /// Returns `None` for blank identities; those items are malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Scores ---

/// A review score on the 1..=5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn label(self) -> String {
        if self.0 == 1 {
            "1 star".to_string()
        } else {
            format!("{} stars", self.0)
        }
    }
}

impl TryFrom<u8> for Score {
    type Error = HarvestError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value)
            .ok_or_else(|| HarvestError::Validation(format!("score {value} is outside 1..=5")))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of scores the caller wants back. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSet(BTreeSet<Score>);

impl ScoreSet {
    pub fn new(scores: impl IntoIterator<Item = Score>) -> Result<Self, HarvestError> {
        let set: BTreeSet<Score> = scores.into_iter().collect();
        if set.is_empty() {
            return Err(HarvestError::Validation(
                "at least one wanted score is required".to_string(),
            ));
        }
        Ok(Self(set))
    }

    pub fn from_values(values: &[u8]) -> Result<Self, HarvestError> {
        let scores = values
            .iter()
            .map(|v| Score::try_from(*v))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(scores)
    }

    /// Parse a comma-separated list such as `"1,2,3"`.
    pub fn parse_list(raw: &str) -> Result<Self, HarvestError> {
        let mut values = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let value: u8 = part
                .parse()
                .map_err(|_| HarvestError::Validation(format!("'{part}' is not a score")))?;
            values.push(value);
        }
        Self::from_values(&values)
    }

    pub fn contains(&self, score: Score) -> bool {
        self.0.contains(&score)
    }

    pub fn max(&self) -> Score {
        // Non-empty by construction.
        self.0.iter().next_back().copied().unwrap_or(Score(Score::MAX))
    }

}

impl fmt::Display for ScoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

// --- Source attribution ---

/// Where a review originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Source {
    FirstParty,
    Syndicated(String),
}

// --- Records ---

/// One accepted review. Only first-party reviews with a wanted score become records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identity: ItemIdentity,
    pub subject: SubjectMetadata,
    pub score: Score,
    pub score_label: String,
    pub author: String,
    pub posted_at: String,
    pub body: String,
    pub permalink: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoIdentity,
    NoScore,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoIdentity => write!(f, "no-identity"),
            RejectReason::NoScore => write!(f, "no-score"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    Duplicate,
    UnwantedScore { score: Score },
    AboveEarlyStopThreshold { score: Score },
    NonPrimarySource { source: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Duplicate => write!(f, "duplicate"),
            SkipReason::UnwantedScore { score } => write!(f, "unwanted-score({score})"),
            SkipReason::AboveEarlyStopThreshold { score } => {
                write!(f, "above-early-stop-threshold({score})")
            }
            SkipReason::NonPrimarySource { source } => write!(f, "non-primary-source({source})"),
        }
    }
}

/// Per-item extraction result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Accepted(Record),
    Rejected(RejectReason),
    Skipped(SkipReason),
}

impl ExtractionOutcome {
    pub fn record(&self) -> Option<&Record> {
        match self {
            ExtractionOutcome::Accepted(record) => Some(record),
            _ => None,
        }
    }
}

/// Early-stop decision, recomputed on every observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Continue,
    StopPagination,
    StopExtraction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_rejects_out_of_range() {
        assert!(Score::new(0).is_none());
        assert!(Score::new(6).is_none());
        assert_eq!(Score::new(3).map(Score::value), Some(3));
    }

    #[test]
    fn score_label_is_pluralized() {
        assert_eq!(Score::new(1).unwrap().label(), "1 star");
        assert_eq!(Score::new(4).unwrap().label(), "4 stars");
    }

    #[test]
    fn score_set_parses_comma_list() {
        let set = ScoreSet::parse_list("3, 1,2").unwrap();
        assert_eq!(set.max().value(), 3);
        assert!(set.contains(Score::new(1).unwrap()));
        assert_eq!(set.to_string(), "1,2,3");
    }

    #[test]
    fn score_set_rejects_empty_and_invalid() {
        assert!(ScoreSet::parse_list("").is_err());
        assert!(ScoreSet::parse_list("2,9").is_err());
        assert!(ScoreSet::parse_list("two").is_err());
    }

    #[test]
    fn identity_rejects_blank() {
        assert!(ItemIdentity::parse("   ").is_none());
        assert_eq!(ItemIdentity::parse(" abc ").unwrap().as_str(), "abc");
    }

    #[test]
    fn search_terms_join_name_and_location() {
        let q = SubjectQuery::new("Cafe Lumen", Some("Berlin".to_string()));
        assert_eq!(q.search_terms(), "Cafe Lumen Berlin");
        let q = SubjectQuery::new("Cafe Lumen", Some("  ".to_string()));
        assert_eq!(q.search_terms(), "Cafe Lumen");
    }

    #[test]
    fn score_serializes_as_number() {
        let json = serde_json::to_string(&Score::new(2).unwrap()).unwrap();
        assert_eq!(json, "2");
        let bad: Result<Score, _> = serde_json::from_str("7");
        assert!(bad.is_err());
    }
}
