//! Harvest orchestrator.
//!
//! One call to [`Harvester::harvest`] owns one rendering session from open to
//! release: navigate to the subject's reviews, optionally sort lowest first,
//! grow the listing, then extract every loaded item in order. Fatal
//! navigation misses end the run early with an empty report and a diagnostic;
//! nothing from a single item can end it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use harvest_common::{
    ExtractionOutcome, HarvestConfig, HarvestError, ItemIdentity, Record, RejectReason, ScoreSet,
    SkipReason, StopSignal, SubjectMetadata, SubjectQuery,
};

use crate::dates::LocaleTable;
use crate::dedup::DedupLedger;
use crate::early_stop::EarlyStopPolicy;
use crate::extractor::{ExtractContext, ExtractOptions, FieldExtractor};
use crate::locator::{require, resolve, resolve_and_click, LocatorChain};
use crate::pagination::{self, PaginationReport, PaginationSettings, PaginationStop};
use crate::profile::SiteProfile;
use crate::run_log::{EventSink, HarvestEvent};
use crate::stats::HarvestStats;
use crate::traits::{NodeHandle, RenderSurface, Scope, Session};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What the caller gets back. `records` never holds a partial record.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub records: Vec<Record>,
    pub count: usize,
    pub stats: HarvestStats,
    /// Set when the run ended on a fatal condition.
    pub diagnostic: Option<String>,
    pub pagination: Option<PaginationReport>,
}

impl HarvestReport {
    fn failed(diagnostic: String, stats: HarvestStats) -> Self {
        Self {
            records: Vec::new(),
            count: 0,
            stats,
            diagnostic: Some(diagnostic),
            pagination: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session guard
// ---------------------------------------------------------------------------

/// Closes the session on every exit path. `release` is the normal path; if
/// the harvest future is dropped first, `Drop` hands the close to the runtime.
struct SessionGuard {
    session: Arc<dyn Session>,
    sink: Arc<dyn EventSink>,
    released: bool,
}

impl SessionGuard {
    fn new(session: Arc<dyn Session>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session,
            sink,
            released: false,
        }
    }

    fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    async fn release(mut self) {
        let clean = match self.session.close().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Session close failed");
                false
            }
        };
        self.released = true;
        self.sink.emit(HarvestEvent::SessionReleased { clean });
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "Deferred session close failed");
                    }
                });
            }
            Err(_) => warn!("No runtime available to close abandoned session"),
        }
    }
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

pub struct Harvester {
    surface: Arc<dyn RenderSurface>,
    config: HarvestConfig,
    profile: SiteProfile,
    locales: LocaleTable,
    sink: Arc<dyn EventSink>,
}

/// Result of processing one item.
struct ItemStep {
    identity: Option<ItemIdentity>,
    outcome: ExtractionOutcome,
    stop: bool,
}

impl ItemStep {
    fn done(identity: Option<ItemIdentity>, outcome: ExtractionOutcome) -> Self {
        Self {
            identity,
            outcome,
            stop: false,
        }
    }
}

impl Harvester {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        config: HarvestConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            profile: SiteProfile::maps(&config),
            locales: LocaleTable::standard(),
            surface,
            config,
            sink,
        }
    }

    /// Harvest the wanted-score reviews of one subject. Never fails: fatal
    /// conditions come back as an empty report with `diagnostic` set.
    pub async fn harvest(&self, query: &SubjectQuery, wanted: &ScoreSet) -> HarvestReport {
        let address = self.profile.search_address(query);
        info!(
            subject = query.name.as_str(),
            wanted = %wanted,
            address = address.as_str(),
            "Starting harvest"
        );

        let session = match self.surface.open_session(&address).await {
            Ok(session) => session,
            Err(e) => {
                let err = HarvestError::Session(e.to_string());
                warn!(error = %err, "Could not open rendering session");
                self.sink.emit(HarvestEvent::SessionOpenFailed {
                    address,
                    error: e.to_string(),
                });
                return HarvestReport::failed(err.to_string(), HarvestStats::default());
            }
        };
        self.sink.emit(HarvestEvent::SessionOpened {
            address: address.clone(),
        });

        let guard = SessionGuard::new(session, self.sink.clone());
        let mut stats = HarvestStats::default();
        let result = self
            .run(guard.session(), query, wanted, &address, &mut stats)
            .await;
        guard.release().await;

        match result {
            Ok((records, pagination)) => {
                info!(
                    subject = query.name.as_str(),
                    accepted = records.len(),
                    enumerated = stats.items_enumerated,
                    "Harvest complete"
                );
                HarvestReport {
                    count: records.len(),
                    records,
                    stats,
                    diagnostic: None,
                    pagination: Some(pagination),
                }
            }
            Err(e) => {
                warn!(subject = query.name.as_str(), fatal = e.is_fatal(), error = %e, "Harvest aborted");
                HarvestReport::failed(e.to_string(), stats)
            }
        }
    }

    async fn run(
        &self,
        session: &dyn Session,
        query: &SubjectQuery,
        wanted: &ScoreSet,
        opened_address: &str,
        stats: &mut HarvestStats,
    ) -> Result<(Vec<Record>, PaginationReport), HarvestError> {
        let profile = &self.profile;

        if resolve_and_click(session, &profile.consent, Scope::Document)
            .await
            .is_some()
        {
            debug!("Dismissed cookie consent");
        }

        let subject = self.metadata(session, query).await;

        let tab = resolve_and_click(session, &profile.reviews_tab, Scope::Document).await;
        self.required(&profile.reviews_tab, tab)?;
        tokio::time::sleep(self.config.nav_settle).await;

        let mut policy = if EarlyStopPolicy::applies(&self.config, wanted)
            && self.activate_sort(session).await
        {
            stats.sort_active = true;
            EarlyStopPolicy::armed(&self.config, wanted)
        } else {
            EarlyStopPolicy::disabled(&self.config, wanted)
        };

        let container = resolve(session, &profile.scroll_container, Scope::Document).await;
        let container = self.required(&profile.scroll_container, container)?;

        let settings = PaginationSettings::for_run(&self.config, policy.is_active());
        let pagination = pagination::drive(
            session,
            profile,
            &container,
            &policy,
            &settings,
            self.sink.as_ref(),
        )
        .await;
        stats.growth_cycles = pagination.cycles;
        stats.early_stop_pagination = pagination.stop == PaginationStop::EarlyStop;

        let base_address = match session.current_address().await {
            Ok(address) => address,
            Err(e) => {
                debug!(error = %e, "Current address unavailable, using the search address");
                opened_address.to_string()
            }
        };

        let extractor = FieldExtractor::new(
            session,
            profile,
            &self.locales,
            ExtractOptions {
                advanced_date_parsing: self.config.advanced_date_parsing,
                expand_settle: self.config.expand_settle,
            },
            ExtractContext {
                subject,
                base_address,
            },
        );

        let items = match session.locate_all(&profile.item, Scope::Document).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Could not enumerate loaded items, nothing to extract");
                Vec::new()
            }
        };
        info!(items = items.len(), "Extracting loaded items");

        let mut ledger = DedupLedger::new();
        let mut records = Vec::new();
        for (index, item) in items.iter().enumerate() {
            stats.items_enumerated += 1;
            let step = match self
                .process_item(&extractor, item, wanted, &mut ledger, &mut policy)
                .await
            {
                Ok(step) => step,
                Err(e) => {
                    stats.items_failed += 1;
                    warn!(index, error = %e, "Item extraction failed");
                    self.sink.emit(HarvestEvent::ItemFailed {
                        index,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let stop = step.stop;
            self.tally(step, stats, &mut records);
            if stop {
                stats.early_stop_extraction = true;
                info!(
                    after_items = index + 1,
                    consecutive_above = policy.consecutive_above(),
                    "Consecutive items above wanted scores, stopping extraction"
                );
                self.sink.emit(HarvestEvent::ExtractionStopped {
                    after_items: index + 1,
                    consecutive_above: policy.consecutive_above(),
                });
                break;
            }
        }
        debug!(distinct = ledger.distinct(), "Extraction pass finished");

        Ok((records, pagination))
    }

    async fn process_item(
        &self,
        extractor: &FieldExtractor<'_>,
        item: &NodeHandle,
        wanted: &ScoreSet,
        ledger: &mut DedupLedger,
        policy: &mut EarlyStopPolicy,
    ) -> anyhow::Result<ItemStep> {
        let Some(identity) = extractor.identity(item).await? else {
            return Ok(ItemStep::done(
                None,
                ExtractionOutcome::Rejected(RejectReason::NoIdentity),
            ));
        };

        if !ledger.accept(&identity) {
            return Ok(ItemStep::done(
                Some(identity),
                ExtractionOutcome::Skipped(SkipReason::Duplicate),
            ));
        }

        let Some(score) = extractor.score(item).await? else {
            return Ok(ItemStep::done(
                Some(identity),
                ExtractionOutcome::Rejected(RejectReason::NoScore),
            ));
        };

        if policy.observe_score(score) == StopSignal::StopExtraction {
            return Ok(ItemStep {
                identity: Some(identity),
                outcome: ExtractionOutcome::Skipped(SkipReason::AboveEarlyStopThreshold { score }),
                stop: true,
            });
        }
        if policy.exceeds(score) {
            return Ok(ItemStep::done(
                Some(identity),
                ExtractionOutcome::Skipped(SkipReason::AboveEarlyStopThreshold { score }),
            ));
        }

        let outcome = extractor.complete(item, identity.clone(), score, wanted).await?;
        Ok(ItemStep::done(Some(identity), outcome))
    }

    fn tally(&self, step: ItemStep, stats: &mut HarvestStats, records: &mut Vec<Record>) {
        let identity = step
            .identity
            .as_ref()
            .map(|i| i.as_str().to_string())
            .unwrap_or_default();

        match step.outcome {
            ExtractionOutcome::Accepted(record) => {
                stats.items_accepted += 1;
                self.sink.emit(HarvestEvent::ItemAccepted {
                    identity,
                    score: record.score.value(),
                });
                records.push(record);
            }
            ExtractionOutcome::Rejected(reason) => {
                match reason {
                    RejectReason::NoIdentity => stats.no_identity += 1,
                    RejectReason::NoScore => stats.no_score += 1,
                }
                debug!(identity = identity.as_str(), reason = %reason, "Malformed item");
                self.sink.emit(HarvestEvent::ItemRejected {
                    reason: reason.to_string(),
                });
            }
            ExtractionOutcome::Skipped(reason) => {
                match &reason {
                    SkipReason::Duplicate => stats.duplicates += 1,
                    SkipReason::UnwantedScore { .. } => stats.unwanted_score += 1,
                    SkipReason::AboveEarlyStopThreshold { .. } => stats.above_threshold += 1,
                    SkipReason::NonPrimarySource { .. } => stats.syndicated += 1,
                }
                self.sink.emit(HarvestEvent::ItemSkipped {
                    identity,
                    reason: reason.to_string(),
                });
            }
        }
    }

    /// Subject heading, average and total. Only the name has a fallback.
    async fn metadata(&self, session: &dyn Session, query: &SubjectQuery) -> SubjectMetadata {
        let profile = &self.profile;
        let name = self
            .chain_text(session, &profile.subject_name)
            .await
            .unwrap_or_else(|| {
                debug!(fallback = query.name.as_str(), "Subject heading not found");
                query.name.clone()
            });
        let metadata = SubjectMetadata {
            name,
            average_score: self.chain_text(session, &profile.average_score).await,
            total_count: self.chain_text(session, &profile.total_count).await,
        };
        self.sink.emit(HarvestEvent::MetadataResolved {
            name: metadata.name.clone(),
            average_score: metadata.average_score.clone(),
            total_count: metadata.total_count.clone(),
        });
        metadata
    }

    async fn chain_text(&self, session: &dyn Session, chain: &LocatorChain) -> Option<String> {
        let node = resolve(session, chain, Scope::Document).await?;
        match session.text(&node).await {
            Ok(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(e) => {
                debug!(chain = chain.name.as_str(), error = %e, "Text read failed");
                None
            }
        }
    }

    /// Open the sort menu and pick lowest rating first. Any miss leaves the
    /// listing in its default order and returns false.
    async fn activate_sort(&self, session: &dyn Session) -> bool {
        let profile = &self.profile;
        let steps = [
            (&profile.sort_control, self.config.menu_settle),
            (&profile.sort_lowest, self.config.nav_settle),
        ];
        for (chain, settle) in steps {
            if resolve_and_click(session, chain, Scope::Document)
                .await
                .is_none()
            {
                warn!(step = chain.name.as_str(), "Sort unavailable, early stop disabled");
                self.sink.emit(HarvestEvent::SortUnavailable {
                    step: chain.name.clone(),
                });
                return false;
            }
            tokio::time::sleep(settle).await;
        }
        info!("Sorted lowest rating first");
        self.sink.emit(HarvestEvent::SortActivated);
        true
    }

    fn required(
        &self,
        chain: &LocatorChain,
        found: Option<NodeHandle>,
    ) -> Result<NodeHandle, HarvestError> {
        require(chain, found).inspect_err(|_| {
            self.sink.emit(HarvestEvent::NavigationFailed {
                element: chain.name.clone(),
            });
        })
    }
}
