//! Tracks which ePDG address is currently serving normal traffic and, optionally, a distinct
//! one serving emergency traffic.

use std::collections::HashSet;
use std::net::IpAddr;

use parking_lot::Mutex;

#[derive(Default)]
struct Bindings {
    normal: Option<IpAddr>,
    normal_apns: HashSet<String>,
    emergency: Option<IpAddr>,
    emergency_apns: HashSet<String>,
}

#[derive(Default)]
pub struct EpdgMonitor {
    bindings: Mutex<Bindings>,
}

impl EpdgMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `apn` connected to `ip`. An emergency APN binds to a distinct emergency
    /// slot only when `distinct_emergency_allowed` is true and `ip` differs from the current
    /// normal binding; otherwise it shares the normal slot.
    pub fn apn_connected(
        &self,
        apn: &str,
        ip: IpAddr,
        is_emergency: bool,
        distinct_emergency_allowed: bool,
    ) {
        let mut bindings = self.bindings.lock();
        if is_emergency && distinct_emergency_allowed && bindings.normal != Some(ip) {
            bindings.emergency = Some(ip);
            bindings.emergency_apns.insert(apn.to_string());
        } else {
            bindings.normal = Some(ip);
            bindings.normal_apns.insert(apn.to_string());
        }
    }

    pub fn apn_disconnected(&self, apn: &str) {
        let mut bindings = self.bindings.lock();
        bindings.normal_apns.remove(apn);
        bindings.emergency_apns.remove(apn);
        if bindings.normal_apns.is_empty() {
            bindings.normal = None;
        }
        if bindings.emergency_apns.is_empty() {
            bindings.emergency = None;
        }
    }

    pub fn epdg_for_normal(&self) -> Option<IpAddr> {
        self.bindings.lock().normal
    }

    pub fn epdg_for_emergency(&self) -> Option<IpAddr> {
        let bindings = self.bindings.lock();
        bindings.emergency.or(bindings.normal)
    }

    pub fn has_separate_emergency_epdg(&self) -> bool {
        let bindings = self.bindings.lock();
        bindings.emergency.is_some() && bindings.emergency != bindings.normal
    }
}
