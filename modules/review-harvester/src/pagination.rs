//! Pagination driver.
//!
//! Grows the listing by scrolling its container until the item count stops
//! changing for `patience` consecutive cycles, the early-stop window fires, or
//! the cycle cap is reached.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use harvest_common::{HarvestConfig, StopSignal};

use crate::early_stop::EarlyStopPolicy;
use crate::extractor::read_score;
use crate::profile::SiteProfile;
use crate::run_log::{EventSink, HarvestEvent};
use crate::traits::{NodeHandle, Scope, Session};

// ---------------------------------------------------------------------------
// Stability tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Growing,
    Stable,
    Exhausted,
}

/// Counts consecutive observations with an unchanged item count. Any change,
/// up or down, starts the count over.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    patience: u32,
    previous: Option<usize>,
    stable_cycles: u32,
}

impl StabilityTracker {
    pub fn new(patience: u32) -> Self {
        Self {
            patience: patience.max(1),
            previous: None,
            stable_cycles: 0,
        }
    }

    pub fn observe(&mut self, count: usize) -> PaginationState {
        let unchanged = self.previous == Some(count);
        self.previous = Some(count);

        if !unchanged {
            self.stable_cycles = 0;
            return PaginationState::Growing;
        }

        self.stable_cycles += 1;
        if self.stable_cycles >= self.patience {
            PaginationState::Exhausted
        } else {
            PaginationState::Stable
        }
    }

    pub fn stable_cycles(&self) -> u32 {
        self.stable_cycles
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStop {
    Exhausted,
    EarlyStop,
    CycleCap,
    /// The listing could not be enumerated; growth ended where it was.
    Interrupted,
}

impl PaginationStop {
    pub fn as_str(self) -> &'static str {
        match self {
            PaginationStop::Exhausted => "exhausted",
            PaginationStop::EarlyStop => "early_stop",
            PaginationStop::CycleCap => "cycle_cap",
            PaginationStop::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationReport {
    pub cycles: u32,
    pub final_count: usize,
    pub stop: PaginationStop,
}

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub max_cycles: u32,
    pub patience: u32,
    pub settle: Duration,
}

impl PaginationSettings {
    /// Sorted feeds get the tighter cap and patience.
    pub fn for_run(config: &HarvestConfig, sorted: bool) -> Self {
        if sorted {
            Self {
                max_cycles: config.max_cycles_sorted,
                patience: config.patience_sorted,
                settle: config.settle_delay,
            }
        } else {
            Self {
                max_cycles: config.max_cycles,
                patience: config.patience,
                settle: config.settle_delay,
            }
        }
    }
}

/// Run growth cycles against `container`. Nothing here fails the run: a
/// failed scroll is logged and the cycle still counts, and a failed
/// enumeration ends growth with whatever is already loaded.
pub async fn drive(
    session: &dyn Session,
    profile: &SiteProfile,
    container: &NodeHandle,
    policy: &EarlyStopPolicy,
    settings: &PaginationSettings,
    sink: &dyn EventSink,
) -> PaginationReport {
    let mut tracker = StabilityTracker::new(settings.patience);
    let mut count = 0;

    for cycle in 1..=settings.max_cycles {
        let items = match session.locate_all(&profile.item, Scope::Document).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    cycle,
                    item_count = count,
                    error = %e,
                    "Listing enumeration failed, proceeding with loaded items"
                );
                return finish(sink, cycle - 1, count, PaginationStop::Interrupted);
            }
        };
        count = items.len();
        sink.emit(HarvestEvent::GrowthCycle {
            cycle,
            item_count: count,
        });

        if policy.window_ready(count) {
            let start = count.saturating_sub(policy.window());
            let mut trailing = Vec::with_capacity(count - start);
            for item in &items[start..] {
                let score = match read_score(session, profile, item).await {
                    Ok(score) => score,
                    Err(e) => {
                        debug!(error = %e, "Score read failed in trailing window");
                        None
                    }
                };
                trailing.push(score);
            }
            if policy.check_window(&trailing) == StopSignal::StopPagination {
                info!(cycle, item_count = count, "Trailing window above wanted scores, stopping growth");
                return finish(sink, cycle, count, PaginationStop::EarlyStop);
            }
        }

        if tracker.observe(count) == PaginationState::Exhausted {
            info!(
                cycle,
                item_count = count,
                stable_cycles = tracker.stable_cycles(),
                "Listing exhausted"
            );
            return finish(sink, cycle, count, PaginationStop::Exhausted);
        }

        if let Err(e) = session
            .run_script(&profile.scroll_script, std::slice::from_ref(container))
            .await
        {
            warn!(cycle, error = %e, "Scroll script failed");
        }
        tokio::time::sleep(settings.settle).await;
    }

    warn!(
        max_cycles = settings.max_cycles,
        item_count = count,
        "Cycle cap reached before the listing stabilized"
    );
    finish(sink, settings.max_cycles, count, PaginationStop::CycleCap)
}

fn finish(sink: &dyn EventSink, cycles: u32, final_count: usize, stop: PaginationStop) -> PaginationReport {
    sink.emit(HarvestEvent::PaginationStopped {
        reason: stop.as_str().to_string(),
        cycles,
        item_count: final_count,
    });
    PaginationReport {
        cycles,
        final_count,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{require, resolve};
    use crate::run_log::RunLog;
    use crate::testing::{MockPage, MockReview, MockSurface};
    use crate::traits::RenderSurface;
    use harvest_common::ScoreSet;

    #[test]
    fn tracker_exhausts_after_patience_unchanged_cycles() {
        let mut tracker = StabilityTracker::new(3);
        assert_eq!(tracker.observe(10), PaginationState::Growing);
        assert_eq!(tracker.observe(10), PaginationState::Stable);
        assert_eq!(tracker.observe(10), PaginationState::Stable);
        assert_eq!(tracker.observe(10), PaginationState::Exhausted);
    }

    #[test]
    fn growth_resets_stability() {
        let mut tracker = StabilityTracker::new(2);
        tracker.observe(10);
        assert_eq!(tracker.observe(10), PaginationState::Stable);
        assert_eq!(tracker.observe(15), PaginationState::Growing);
        assert_eq!(tracker.stable_cycles(), 0);
        assert_eq!(tracker.observe(15), PaginationState::Stable);
        assert_eq!(tracker.observe(15), PaginationState::Exhausted);
    }

    #[test]
    fn shrinking_count_also_resets() {
        let mut tracker = StabilityTracker::new(2);
        tracker.observe(10);
        tracker.observe(10);
        assert_eq!(tracker.observe(8), PaginationState::Growing);
    }

    #[test]
    fn settings_follow_sort_state() {
        let config = HarvestConfig::default();
        let sorted = PaginationSettings::for_run(&config, true);
        assert_eq!((sorted.max_cycles, sorted.patience), (50, 3));
        let unsorted = PaginationSettings::for_run(&config, false);
        assert_eq!((unsorted.max_cycles, unsorted.patience), (100, 5));
    }

    fn feed(n: usize, score: u8) -> Vec<MockReview> {
        (0..n)
            .map(|i| MockReview::stars(&format!("r{i}"), score))
            .collect()
    }

    async fn run(page: MockPage, policy: EarlyStopPolicy, settings: PaginationSettings) -> (PaginationReport, RunLog) {
        let config = HarvestConfig::immediate();
        let surface = MockSurface::new(&config, page);
        let session = surface.open_session("mock://place").await.unwrap();
        let profile = surface.profile().clone();
        let container = require(
            &profile.scroll_container,
            resolve(session.as_ref(), &profile.scroll_container, Scope::Document).await,
        )
        .unwrap();
        let log = RunLog::new();
        let report = drive(session.as_ref(), &profile, &container, &policy, &settings, &log).await;
        (report, log)
    }

    #[tokio::test]
    async fn stops_when_count_stops_growing() {
        let config = HarvestConfig::immediate();
        let wanted = ScoreSet::from_values(&[1]).unwrap();
        let page = MockPage {
            initial: 10,
            batch: 5,
            ..MockPage::with_reviews(feed(22, 1))
        };
        let settings = PaginationSettings {
            patience: 2,
            ..PaginationSettings::for_run(&config, false)
        };
        let (report, _) = run(page, EarlyStopPolicy::disabled(&config, &wanted), settings).await;

        assert_eq!(report.stop, PaginationStop::Exhausted);
        assert_eq!(report.final_count, 22);
        // 10, 15, 20, 22, 22, 22
        assert_eq!(report.cycles, 6);
    }

    #[tokio::test]
    async fn cycle_cap_bounds_growth() {
        let config = HarvestConfig::immediate();
        let wanted = ScoreSet::from_values(&[1]).unwrap();
        let page = MockPage {
            initial: 1,
            batch: 1,
            ..MockPage::with_reviews(feed(50, 1))
        };
        let settings = PaginationSettings {
            max_cycles: 4,
            ..PaginationSettings::for_run(&config, false)
        };
        let (report, log) = run(page, EarlyStopPolicy::disabled(&config, &wanted), settings).await;

        assert_eq!(report.stop, PaginationStop::CycleCap);
        assert_eq!(report.cycles, 4);
        assert_eq!(report.final_count, 4);
        let growth = log
            .kinds()
            .into_iter()
            .filter(|k| matches!(k, HarvestEvent::GrowthCycle { .. }))
            .count();
        assert_eq!(growth, 4);
    }

    #[tokio::test]
    async fn enumeration_failure_ends_growth_with_loaded_count() {
        let config = HarvestConfig::immediate();
        let wanted = ScoreSet::from_values(&[1]).unwrap();
        let page = MockPage {
            initial: 10,
            batch: 5,
            failing_enumerations: vec![3],
            ..MockPage::with_reviews(feed(40, 1))
        };
        let settings = PaginationSettings::for_run(&config, false);
        let (report, log) = run(page, EarlyStopPolicy::disabled(&config, &wanted), settings).await;

        assert_eq!(report.stop, PaginationStop::Interrupted);
        assert_eq!(report.cycles, 2);
        assert_eq!(report.final_count, 15);
        assert!(log.kinds().contains(&HarvestEvent::PaginationStopped {
            reason: "interrupted".to_string(),
            cycles: 2,
            item_count: 15,
        }));
    }

    #[tokio::test]
    async fn trailing_window_above_wanted_stops_early() {
        let config = HarvestConfig::immediate();
        let wanted = ScoreSet::from_values(&[1, 2]).unwrap();
        let mut reviews = feed(10, 1);
        reviews.extend((10..40).map(|i| MockReview::stars(&format!("r{i}"), 4)));
        let page = MockPage {
            initial: 10,
            batch: 5,
            ..MockPage::with_reviews(reviews)
        };
        let settings = PaginationSettings::for_run(&config, true);
        let (report, log) = run(page, EarlyStopPolicy::armed(&config, &wanted), settings).await;

        assert_eq!(report.stop, PaginationStop::EarlyStop);
        assert_eq!(report.cycles, 2);
        assert_eq!(report.final_count, 15);
        assert!(log.kinds().contains(&HarvestEvent::PaginationStopped {
            reason: "early_stop".to_string(),
            cycles: 2,
            item_count: 15,
        }));
    }
}
