//! Per-APN record of a live tunnel. Keyed by APN string, as a flat arena rather than the
//! cyclic manager/session/callback graph a reference IKE binding tends to grow.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ike::IkeSession;
use iwlan_types::TunnelLinkProperties;

#[derive(Clone)]
pub struct TunnelConfig {
    pub apn: String,
    pub token: u64,
    pub session: Arc<dyn IkeSession>,
    pub src_ipv4: Option<IpAddr>,
    pub src_ipv6: Option<(IpAddr, u8)>,
    pub is_emergency: bool,
    pub bound_epdg: IpAddr,
    pub link_properties: Option<TunnelLinkProperties>,
}

#[derive(Default)]
pub struct TunnelConfigTable {
    entries: Mutex<HashMap<String, TunnelConfig>>,
}

impl TunnelConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: TunnelConfig) {
        self.entries.lock().insert(config.apn.clone(), config);
    }

    pub fn remove(&self, apn: &str) -> Option<TunnelConfig> {
        self.entries.lock().remove(apn)
    }

    pub fn get(&self, apn: &str) -> Option<TunnelConfig> {
        self.entries.lock().get(apn).cloned()
    }

    pub fn contains(&self, apn: &str) -> bool {
        self.entries.lock().contains_key(apn)
    }

    pub fn set_link_properties(&self, apn: &str, props: TunnelLinkProperties) {
        if let Some(entry) = self.entries.lock().get_mut(apn) {
            entry.link_properties = Some(props);
        }
    }

    pub fn for_each_session(&self, mut f: impl FnMut(&TunnelConfig)) {
        for config in self.entries.lock().values() {
            f(config);
        }
    }
}
