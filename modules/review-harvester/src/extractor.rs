//! Per-item field extraction.
//!
//! Every field has its own fallback chain. Only identity and score can reject
//! an item; everything else degrades to a placeholder. The only side effect is
//! the best-effort "see more" click before reading the body.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use harvest_common::{
    ExtractionOutcome, ItemIdentity, Record, RejectReason, Score, ScoreSet, SkipReason, Source,
    SubjectMetadata, DATE_NOT_FOUND, UNKNOWN,
};

use crate::dates::{self, DateAttribution, LocaleTable, SourcePolicy};
use crate::locator::{find_in, text_in};
use crate::profile::SiteProfile;
use crate::traits::{NodeHandle, Scope, Session};

static FIRST_INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static FRACTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)/5").unwrap());

// --- Score parsing ---

/// First integer in an accessibility label ("4 stars", "4 Sterne").
pub fn parse_star_label(label: &str) -> Option<Score> {
    let caps = FIRST_INT_RE.captures(label)?;
    caps[1].parse::<u8>().ok().and_then(Score::new)
}

/// `N/5` anywhere in the text.
pub fn parse_fraction(text: &str) -> Option<Score> {
    let caps = FRACTION_RE.captures(text)?;
    caps[1].parse::<u8>().ok().and_then(Score::new)
}

/// Recover an item's score: labelled star, then fractional label, then any
/// span mentioning `/5`. Used by both extraction and the pagination-side
/// early-stop window.
pub async fn read_score(
    session: &dyn Session,
    profile: &SiteProfile,
    item: &NodeHandle,
) -> Result<Option<Score>> {
    if let Some(node) = find_in(session, item, &profile.score_label).await? {
        if let Some(label) = session
            .attribute(&node, &profile.score_label_attribute)
            .await?
        {
            if let Some(score) = parse_star_label(&label) {
                return Ok(Some(score));
            }
        }
    }

    if let Some(text) = text_in(session, item, &profile.score_fraction).await? {
        if let Some(score) = parse_fraction(&text).or_else(|| parse_star_label(&text)) {
            return Ok(Some(score));
        }
    }

    let candidates = session
        .locate_all(&profile.score_scan, Scope::Node(item))
        .await?;
    if let Some(first) = candidates.first() {
        let text = session.text(first).await?;
        return Ok(parse_fraction(&text));
    }

    Ok(None)
}

// --- Extractor ---

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub advanced_date_parsing: bool,
    pub expand_settle: Duration,
}

/// Run-level context stamped onto every record.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub subject: SubjectMetadata,
    pub base_address: String,
}

pub struct FieldExtractor<'a> {
    session: &'a dyn Session,
    profile: &'a SiteProfile,
    locales: &'a LocaleTable,
    sources: SourcePolicy,
    options: ExtractOptions,
    context: ExtractContext,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(
        session: &'a dyn Session,
        profile: &'a SiteProfile,
        locales: &'a LocaleTable,
        options: ExtractOptions,
        context: ExtractContext,
    ) -> Self {
        Self {
            session,
            profile,
            locales,
            sources: SourcePolicy {
                first_party: profile.first_party.clone(),
                syndicated: profile.syndication_sources.clone(),
            },
            options,
            context,
        }
    }

    pub async fn identity(&self, item: &NodeHandle) -> Result<Option<ItemIdentity>> {
        let raw = self
            .session
            .attribute(item, &self.profile.identity_attribute)
            .await?;
        Ok(raw.as_deref().and_then(ItemIdentity::parse))
    }

    pub async fn score(&self, item: &NodeHandle) -> Result<Option<Score>> {
        read_score(self.session, self.profile, item).await
    }

    /// Full extraction of one item, identity through permalink.
    pub async fn extract(&self, item: &NodeHandle, wanted: &ScoreSet) -> Result<ExtractionOutcome> {
        let Some(identity) = self.identity(item).await? else {
            return Ok(ExtractionOutcome::Rejected(RejectReason::NoIdentity));
        };
        let Some(score) = self.score(item).await? else {
            return Ok(ExtractionOutcome::Rejected(RejectReason::NoScore));
        };
        self.complete(item, identity, score, wanted).await
    }

    /// Everything after identity and score: the wanted-set filter, then the
    /// remaining fields.
    pub async fn complete(
        &self,
        item: &NodeHandle,
        identity: ItemIdentity,
        score: Score,
        wanted: &ScoreSet,
    ) -> Result<ExtractionOutcome> {
        if !wanted.contains(score) {
            return Ok(ExtractionOutcome::Skipped(SkipReason::UnwantedScore { score }));
        }

        let author = text_in(self.session, item, &self.profile.author)
            .await?
            .unwrap_or_else(|| UNKNOWN.to_string());

        let dated = self.date_and_source(item).await?;
        if let Source::Syndicated(source) = dated.source {
            debug!(identity = %identity, source = source.as_str(), "Skipping syndicated review");
            return Ok(ExtractionOutcome::Skipped(SkipReason::NonPrimarySource { source }));
        }

        self.expand(item).await;
        let body = text_in(self.session, item, &self.profile.body)
            .await?
            .unwrap_or_else(|| UNKNOWN.to_string());

        let permalink = self.profile.permalink(&self.context.base_address, &identity);

        Ok(ExtractionOutcome::Accepted(Record {
            identity,
            subject: self.context.subject.clone(),
            score,
            score_label: score.label(),
            author,
            posted_at: dated.posted_at,
            body,
            permalink,
        }))
    }

    async fn date_and_source(&self, item: &NodeHandle) -> Result<DateAttribution> {
        if let Some(text) = text_in(self.session, item, &self.profile.date_direct).await? {
            return Ok(DateAttribution {
                posted_at: text,
                source: Source::FirstParty,
            });
        }

        if !self.options.advanced_date_parsing {
            return Ok(DateAttribution {
                posted_at: UNKNOWN.to_string(),
                source: Source::FirstParty,
            });
        }

        if let Some(text) = text_in(self.session, item, &self.profile.date_combined).await? {
            debug!(text = text.as_str(), "Parsing combined date node");
            return Ok(dates::parse_combined(&text, self.locales, &self.sources));
        }

        if let Some(text) = text_in(self.session, item, &self.profile.date_legacy).await? {
            debug!(text = text.as_str(), "Parsing legacy date node");
            return Ok(dates::parse_legacy(&text, self.locales, &self.sources));
        }

        Ok(DateAttribution {
            posted_at: DATE_NOT_FOUND.to_string(),
            source: Source::FirstParty,
        })
    }

    /// Best effort: missing control or a refused click is fine.
    async fn expand(&self, item: &NodeHandle) {
        let button = match find_in(self.session, item, &self.profile.expand).await {
            Ok(Some(button)) => button,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "Expand lookup failed");
                return;
            }
        };
        match self.session.click(&button).await {
            Ok(()) => tokio::time::sleep(self.options.expand_settle).await,
            Err(e) => debug!(error = %e, "Expand click failed"),
        }
    }
}
