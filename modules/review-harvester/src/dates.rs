//! Relative-date phrases and source attribution.
//!
//! The locale table maps a locale tag to an ordered list of
//! (pattern, normalizer) pairs plus the connector words that introduce a
//! source name ("on Tripadvisor", "bei Tripadvisor"). Locales are consulted in
//! table order and the first match wins.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use harvest_common::{Source, DATE_NOT_FOUND};

static RATING_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+/\d+\s*").unwrap());

/// German before English, matching the order the page mixes them in.
pub static STANDARD_LOCALES: LazyLock<LocaleTable> = LazyLock::new(LocaleTable::standard);

// ---------------------------------------------------------------------------
// Locale table
// ---------------------------------------------------------------------------

pub struct DatePattern {
    regex: Regex,
    normalize: fn(&str) -> String,
}

pub struct LocalePatterns {
    pub tag: &'static str,
    /// Words that introduce a source name after the date.
    pub connectors: Vec<&'static str>,
    /// Substring marking text as a relative date even when no pattern matched.
    pub relative_marker: &'static str,
    patterns: Vec<DatePattern>,
}

impl LocalePatterns {
    pub fn new(
        tag: &'static str,
        connectors: &[&'static str],
        relative_marker: &'static str,
    ) -> Self {
        Self {
            tag,
            connectors: connectors.to_vec(),
            relative_marker,
            patterns: Vec::new(),
        }
    }

    /// Append a case-insensitive pattern; earlier patterns take precedence.
    pub fn pattern(mut self, src: &str, normalize: fn(&str) -> String) -> Result<Self, regex::Error> {
        self.patterns.push(DatePattern {
            regex: RegexBuilder::new(src).case_insensitive(true).build()?,
            normalize,
        });
        Ok(self)
    }
}

/// A date phrase found inside a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub locale: &'static str,
    pub posted_at: String,
    /// The pattern swallowed a trailing connector ("vor 2 Jahren bei").
    pub consumed_connector: bool,
    /// Text after the match.
    pub rest: String,
}

pub struct LocaleTable {
    locales: Vec<LocalePatterns>,
}

impl LocaleTable {
    pub fn empty() -> Self {
        Self {
            locales: Vec::new(),
        }
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.insert(german().expect("valid German date patterns"));
        table.insert(english().expect("valid English date patterns"));
        table
    }

    /// Append a locale; it is consulted after every existing one.
    pub fn insert(&mut self, locale: LocalePatterns) {
        self.locales.push(locale);
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.locales.iter().map(|l| l.tag).collect()
    }

    pub fn find_date(&self, text: &str) -> Option<DateMatch> {
        for locale in &self.locales {
            for pattern in &locale.patterns {
                let Some(m) = pattern.regex.find(text) else {
                    continue;
                };
                let raw = m.as_str().trim();
                let posted_at = (pattern.normalize)(raw);
                return Some(DateMatch {
                    locale: locale.tag,
                    consumed_connector: posted_at.len() < raw.len(),
                    posted_at,
                    rest: text[m.end()..].to_string(),
                });
            }
        }
        None
    }

    fn connectors(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.locales.iter().flat_map(|l| l.connectors.iter().copied())
    }

    fn looks_relative(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.locales
            .iter()
            .any(|l| lower.contains(&l.relative_marker.to_lowercase()))
    }

    /// Split `text` at the first ` <connector> ` of any locale.
    fn split_on_connector<'t>(&self, text: &'t str) -> Option<(&'t str, &'t str)> {
        self.connectors()
            .filter_map(|c| {
                let token = format!(" {c} ");
                text.find(&token)
                    .map(|idx| (idx, &text[..idx], &text[idx + token.len()..]))
            })
            .min_by_key(|(idx, _, _)| *idx)
            .map(|(_, before, after)| (before, after))
    }

    /// Strip a leading connector word (`on X` → `X`), skipping any separator
    /// before it (`· on X`). `None` if there is none.
    fn strip_leading_connector<'t>(&self, text: &'t str) -> Option<&'t str> {
        let trimmed = text.trim_start_matches(is_separator);
        self.connectors().find_map(|c| {
            let head = trimmed.get(..c.len())?;
            let tail = &trimmed[c.len()..];
            (head.eq_ignore_ascii_case(c) && tail.starts_with(char::is_whitespace))
                .then(|| tail.trim())
        })
    }
}

const SEPARATORS: [char; 5] = ['·', '•', '-', '|', '–'];

fn is_separator(c: char) -> bool {
    c.is_whitespace() || SEPARATORS.contains(&c)
}

fn keep(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_trailing_bei(raw: &str) -> String {
    let mut collapsed = keep(raw);
    let stem = collapsed.len().saturating_sub(4);
    let has_bei = collapsed
        .get(stem..)
        .is_some_and(|tail| tail.eq_ignore_ascii_case(" bei"));
    if has_bei {
        collapsed.truncate(stem);
    }
    collapsed
}

fn german() -> Result<LocalePatterns, regex::Error> {
    LocalePatterns::new("de", &["bei", "auf"], "vor ")
        .pattern(r"vor\s+\d+\s+Jahren?(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+einem\s+Jahr(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+\d+\s+Monaten?(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+einem\s+Monat(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+\d+\s+Wochen?(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+einer\s+Woche(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+\d+\s+Tagen?(?:\s+bei)?", strip_trailing_bei)?
        .pattern(r"vor\s+einem\s+Tag(?:\s+bei)?", strip_trailing_bei)
}

fn english() -> Result<LocalePatterns, regex::Error> {
    LocalePatterns::new("en", &["on"], "ago")
        .pattern(r"\d+\s+years?\s+ago", keep)?
        .pattern(r"\ban?\s+year\s+ago", keep)?
        .pattern(r"\d+\s+months?\s+ago", keep)?
        .pattern(r"\ban?\s+month\s+ago", keep)?
        .pattern(r"\d+\s+weeks?\s+ago", keep)?
        .pattern(r"\ban?\s+week\s+ago", keep)?
        .pattern(r"\d+\s+days?\s+ago", keep)?
        .pattern(r"\ban?\s+day\s+ago", keep)
}

// ---------------------------------------------------------------------------
// Source attribution
// ---------------------------------------------------------------------------

/// Which names count as the primary platform and which as mirrors.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    pub first_party: String,
    pub syndicated: Vec<String>,
}

impl SourcePolicy {
    fn mentions_first_party(&self, text: &str) -> bool {
        text.contains(&self.first_party)
    }

    fn known_syndicator(&self, text: &str) -> Option<&str> {
        self.syndicated
            .iter()
            .find(|name| text.contains(name.as_str()))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateAttribution {
    pub posted_at: String,
    pub source: Source,
}

impl DateAttribution {
    fn first_party(posted_at: impl Into<String>) -> Self {
        Self {
            posted_at: posted_at.into(),
            source: Source::FirstParty,
        }
    }

    fn not_found() -> Self {
        Self::first_party(DATE_NOT_FOUND)
    }
}

/// Parse a combined "score · date · source" text.
pub fn parse_combined(text: &str, table: &LocaleTable, policy: &SourcePolicy) -> DateAttribution {
    let normalized = keep(text);

    if let Some(found) = table.find_date(&normalized) {
        let source = attribute_source(&normalized, &found, table, policy);
        return DateAttribution {
            posted_at: found.posted_at,
            source,
        };
    }

    if !table.looks_relative(&normalized) {
        return DateAttribution::not_found();
    }

    match table.split_on_connector(&normalized) {
        Some((before, after)) => {
            let date_part = RATING_PREFIX_RE
                .replace(before.trim(), "")
                .trim_matches(is_separator)
                .to_string();
            if date_part.is_empty() {
                return DateAttribution::not_found();
            }
            let source_part = after.trim_matches(is_separator);
            let source = if policy.mentions_first_party(source_part) || source_part.is_empty() {
                Source::FirstParty
            } else {
                Source::Syndicated(source_part.to_string())
            };
            DateAttribution {
                posted_at: date_part,
                source,
            }
        }
        None => {
            let date_part = RATING_PREFIX_RE.replace(&normalized, "").trim().to_string();
            if date_part.is_empty() {
                DateAttribution::not_found()
            } else {
                DateAttribution::first_party(date_part)
            }
        }
    }
}

fn attribute_source(
    text: &str,
    found: &DateMatch,
    table: &LocaleTable,
    policy: &SourcePolicy,
) -> Source {
    if policy.mentions_first_party(text) {
        return Source::FirstParty;
    }
    if let Some(name) = policy.known_syndicator(text) {
        return Source::Syndicated(name.to_string());
    }
    let trailing = if found.consumed_connector {
        Some(found.rest.trim())
    } else {
        table.strip_leading_connector(&found.rest)
    };
    match trailing {
        Some(name) if !name.is_empty() => Source::Syndicated(name.to_string()),
        _ => Source::FirstParty,
    }
}

/// The oldest page layout: "<date> on <source>" in a single span. Only
/// first-party mentions yield a date.
pub fn parse_legacy(text: &str, table: &LocaleTable, policy: &SourcePolicy) -> DateAttribution {
    let normalized = keep(text);
    if !policy.mentions_first_party(&normalized) {
        return DateAttribution::not_found();
    }
    let date = match table.split_on_connector(&normalized) {
        Some((before, _)) => before.trim().to_string(),
        None => normalized.replace(&policy.first_party, "").trim().to_string(),
    };
    if date.is_empty() {
        DateAttribution::not_found()
    } else {
        DateAttribution::first_party(date)
    }
}
