//! The external IKEv2/IPsec engine collaborator. This crate never speaks the IKE protocol
//! itself; it only defines the boundary and drives it.

use std::net::IpAddr;
use std::sync::Arc;

use iwlan_types::{IwlanError, TunnelLinkProperties};

/// Opaque handle to the underlying data-bearing network, as supplied by the embedding process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkHandle(pub u64);

/// Mobility options to start an IKE session with, per the protocol-choice rule: IPv4 ePDG
/// addresses get MOBIKE, IPv6 addresses do not; both get REKEY_MOBILITY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobilityOptions {
    pub mobike: bool,
    pub rekey_mobility: bool,
}

impl MobilityOptions {
    pub fn for_address(addr: IpAddr) -> Self {
        Self { mobike: addr.is_ipv4(), rekey_mobility: true }
    }
}

#[derive(Debug, Clone)]
pub struct IkeSessionParams {
    pub epdg_address: IpAddr,
    pub initial_contact: bool,
    pub mobility: MobilityOptions,
    pub retransmit_timer_msec: [u32; 6],
    pub dpd_timer_sec: u32,
    pub natt_keep_alive_timer_sec: u32,
}

#[derive(Debug, Clone)]
pub struct ChildSessionParams {
    pub request_pcscf: bool,
    pub pdu_session_id: u8,
}

/// Collapsed liveness-check status stream (see the liveness-check collapse rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessStatus {
    OnDemandStarted,
    OnDemandOngoing,
    BackgroundStarted,
    BackgroundOngoing,
    Success,
    Failure,
}

/// Callbacks the engine delivers asynchronously. Every callback carries the `(apn, token)`
/// pair it was issued for; the manager drops any callback whose token does not match the
/// APN's current epoch before mutating any state.
pub trait IkeSessionCallbacks: Send + Sync {
    fn on_ike_opened(&self, apn: &str, token: u64);
    fn on_ike_closed(&self, apn: &str, token: u64);
    fn on_ike_closed_with_exception(&self, apn: &str, token: u64, err: IwlanError);
    fn on_ike_liveness_status_changed(&self, apn: &str, token: u64, status: LivenessStatus);
    fn on_child_opened(&self, apn: &str, token: u64, props: TunnelLinkProperties);
    fn on_child_closed(&self, apn: &str, token: u64);
}

/// A live IKE session handle.
pub trait IkeSession: Send + Sync {
    fn set_network(&self, network: NetworkHandle);
    fn close(&self);
    fn kill(&self);
    fn request_liveness_check(&self);
}

/// Factory for IKE sessions. Implementations wrap whatever platform IKE library is available;
/// this crate depends only on this trait.
pub trait IkeEngine: Send + Sync {
    fn create_ike_session(
        &self,
        apn: &str,
        token: u64,
        network: NetworkHandle,
        params: IkeSessionParams,
        child_params: ChildSessionParams,
        callbacks: Arc<dyn IkeSessionCallbacks>,
    ) -> Arc<dyn IkeSession>;
}
