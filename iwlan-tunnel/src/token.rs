//! Per-APN monotonic epoch counters used to discard callbacks from sessions the manager has
//! already abandoned.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Default)]
pub struct TokenTable {
    tokens: Mutex<HashMap<String, u64>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new session epoch for `apn` and returns its token.
    pub fn next(&self, apn: &str) -> u64 {
        let mut tokens = self.tokens.lock();
        let entry = tokens.entry(apn.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current token for `apn`, or `None` if no session has ever started for it.
    pub fn current(&self, apn: &str) -> Option<u64> {
        self.tokens.lock().get(apn).copied()
    }

    /// True if `token` is the current epoch for `apn`; stale callbacks must be dropped before
    /// any state mutation.
    pub fn is_current(&self, apn: &str, token: u64) -> bool {
        self.current(apn) == Some(token)
    }
}
