use std::collections::HashSet;

use harvest_common::ItemIdentity;

/// Identities seen during one harvest run. Grows monotonically.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<ItemIdentity>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time an identity is offered, false ever after.
    pub fn accept(&mut self, identity: &ItemIdentity) -> bool {
        if self.seen.contains(identity) {
            return false;
        }
        self.seen.insert(identity.clone())
    }

    /// Number of distinct identities accepted so far.
    pub fn distinct(&self) -> usize {
        self.seen.len()
    }
}
