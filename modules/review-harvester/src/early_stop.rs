//! Early stop for ascending-sorted feeds.
//!
//! Once the listing is sorted lowest score first, a run of items above the
//! highest wanted score means nothing further down can be wanted. Two
//! triggers share that argument: a trailing window checked during pagination,
//! and a consecutive-item counter during extraction.

use harvest_common::{HarvestConfig, Score, ScoreSet, StopSignal};

#[derive(Debug, Clone)]
pub struct EarlyStopPolicy {
    active: bool,
    max_wanted: Score,
    window: usize,
    min_items: usize,
    skip_threshold: usize,
    consecutive_above: usize,
}

impl EarlyStopPolicy {
    /// Whether sorting the feed is worth attempting for this wanted set.
    pub fn applies(config: &HarvestConfig, wanted: &ScoreSet) -> bool {
        config.sort_optimization && wanted.max().value() <= config.sort_max_score
    }

    /// Armed policy. Only construct this once the sort has been applied.
    pub fn armed(config: &HarvestConfig, wanted: &ScoreSet) -> Self {
        Self {
            active: true,
            max_wanted: wanted.max(),
            window: config.early_stop_window,
            min_items: config.early_stop_min_items,
            skip_threshold: config.skip_threshold,
            consecutive_above: 0,
        }
    }

    /// Policy that never stops anything.
    pub fn disabled(config: &HarvestConfig, wanted: &ScoreSet) -> Self {
        Self {
            active: false,
            ..Self::armed(config, wanted)
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// The pagination-side window is only consulted past this many items.
    pub fn window_ready(&self, item_count: usize) -> bool {
        self.active && item_count >= self.min_items
    }

    /// True when the score is above every wanted score and the policy is armed.
    pub fn exceeds(&self, score: Score) -> bool {
        self.active && score > self.max_wanted
    }

    /// Pagination side. `trailing` holds the scores of the most recently
    /// loaded items; unreadable scores are `None` and ignored.
    pub fn check_window(&self, trailing: &[Option<Score>]) -> StopSignal {
        if !self.active {
            return StopSignal::Continue;
        }
        let mut recovered = trailing.iter().flatten().peekable();
        if recovered.peek().is_none() {
            return StopSignal::Continue;
        }
        if recovered.all(|s| *s > self.max_wanted) {
            StopSignal::StopPagination
        } else {
            StopSignal::Continue
        }
    }

    /// Extraction side, called for every scored item in order.
    pub fn observe_score(&mut self, score: Score) -> StopSignal {
        if !self.active {
            return StopSignal::Continue;
        }
        if score > self.max_wanted {
            self.consecutive_above += 1;
            if self.consecutive_above >= self.skip_threshold {
                return StopSignal::StopExtraction;
            }
        } else {
            self.consecutive_above = 0;
        }
        StopSignal::Continue
    }

    pub fn consecutive_above(&self) -> usize {
        self.consecutive_above
    }
}
