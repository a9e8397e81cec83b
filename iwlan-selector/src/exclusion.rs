//! Temporary memory of ePDG addresses that recently failed, with the "never empty the
//! candidate list" reset rule.

use std::collections::HashSet;
use std::net::IpAddr;

use parking_lot::Mutex;

use iwlan_types::address::CandidateAddress;
use iwlan_types::FailureClass;

/// Per-selector exclusion memory. The whole read-subtract-maybe-clear sequence in
/// [`ExclusionSet::apply`] runs under one lock acquisition so it is atomic relative to a
/// concurrent `on_connection_failed`/`on_connected_successfully` call.
#[derive(Default)]
pub struct ExclusionSet {
    excluded: Mutex<HashSet<IpAddr>>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed address when its class is externally attributable; internal failures
    /// never affect the exclusion set.
    pub fn on_connection_failed(&self, addr: IpAddr, class: FailureClass) {
        match class {
            FailureClass::Network | FailureClass::Protocol => {
                self.excluded.lock().insert(addr);
            }
            FailureClass::Internal => {}
        }
    }

    pub fn on_connected_successfully(&self) {
        self.excluded.lock().clear();
    }

    /// Removes excluded addresses from `candidates`. If doing so would leave the list empty
    /// while `candidates` itself was not, clears the exclusion set and returns the original,
    /// unfiltered list instead.
    pub fn apply(&self, candidates: Vec<CandidateAddress>) -> Vec<CandidateAddress> {
        if candidates.is_empty() {
            return candidates;
        }
        let mut excluded = self.excluded.lock();
        let filtered: Vec<_> =
            candidates.iter().filter(|c| !excluded.contains(&c.addr)).cloned().collect();
        if filtered.is_empty() {
            excluded.clear();
            candidates
        } else {
            filtered
        }
    }
}
