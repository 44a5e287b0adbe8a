//! Harvest run log: structured timeline of everything a harvest did.
//!
//! The harvester emits `HarvestEvent`s into an injected `EventSink`. The
//! tracing sink forwards them to the log; `RunLog` keeps a sequenced,
//! timestamped copy that front ends can serialize.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarvestEvent {
    SessionOpened {
        address: String,
    },
    SessionOpenFailed {
        address: String,
        error: String,
    },
    MetadataResolved {
        name: String,
        average_score: Option<String>,
        total_count: Option<String>,
    },
    NavigationFailed {
        element: String,
    },
    SortActivated,
    SortUnavailable {
        step: String,
    },
    GrowthCycle {
        cycle: u32,
        item_count: usize,
    },
    PaginationStopped {
        reason: String,
        cycles: u32,
        item_count: usize,
    },
    ItemAccepted {
        identity: String,
        score: u8,
    },
    ItemSkipped {
        identity: String,
        reason: String,
    },
    ItemRejected {
        reason: String,
    },
    ItemFailed {
        index: usize,
        error: String,
    },
    ExtractionStopped {
        after_items: usize,
        consecutive_above: usize,
    },
    SessionReleased {
        clean: bool,
    },
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

pub trait EventSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

/// Forwards every event to `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: HarvestEvent) {
        match &event {
            HarvestEvent::ItemAccepted { .. }
            | HarvestEvent::ItemSkipped { .. }
            | HarvestEvent::ItemRejected { .. }
            | HarvestEvent::GrowthCycle { .. } => debug!(event = ?event, "harvest"),
            HarvestEvent::NavigationFailed { .. }
            | HarvestEvent::SessionOpenFailed { .. }
            | HarvestEvent::SortUnavailable { .. }
            | HarvestEvent::ItemFailed { .. } => warn!(event = ?event, "harvest"),
            _ => info!(event = ?event, "harvest"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: HarvestEvent,
}

/// In-memory, sequenced record of one or more runs.
pub struct RunLog {
    pub started_at: DateTime<Utc>,
    events: Mutex<Vec<RunEvent>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<HarvestEvent> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.events())
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RunLog {
    fn emit(&self, event: HarvestEvent) {
        if let Ok(mut events) = self.events.lock() {
            let seq = events.len() as u32;
            events.push(RunEvent {
                seq,
                ts: Utc::now(),
                kind: event,
            });
        }
    }
}

/// Fan out to several sinks.
pub struct Tee(pub Vec<std::sync::Arc<dyn EventSink>>);

impl EventSink for Tee {
    fn emit(&self, event: HarvestEvent) {
        for sink in &self.0 {
            sink.emit(event.clone());
        }
    }
}
