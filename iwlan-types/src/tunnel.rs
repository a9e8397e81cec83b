use std::net::IpAddr;

use crate::error::IwlanError;

/// Requested PDN protocol for a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ip,
    Ipv6,
    Ipv4v6,
    /// Derived from the addresses a tunnel actually came up with; never requested by a caller.
    Unknown,
}

/// A single internal (inner-tunnel) address with its prefix length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddress {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

/// Caller-supplied parameters for bringing up one APN's tunnel.
#[derive(Debug, Clone)]
pub struct TunnelSetupRequest {
    pub apn: String,
    pub protocol: Protocol,
    pub is_roaming: bool,
    pub is_emergency: bool,
    pub request_pcscf: bool,
    pub pdu_session_id: u8,
    pub src_ipv4: Option<IpAddr>,
    pub src_ipv6: Option<(IpAddr, u8)>,
}

impl TunnelSetupRequest {
    /// Structural admission check from the tunnel manager's `bringUpTunnel` rule; does not
    /// check for an already-open tunnel with the same APN name, which requires manager state.
    pub fn is_well_formed(&self) -> bool {
        !self.apn.is_empty()
            && matches!(self.protocol, Protocol::Ip | Protocol::Ipv6 | Protocol::Ipv4v6)
            && self.pdu_session_id <= 15
    }
}

/// Link properties delivered to the caller once a tunnel reaches the OPEN state.
#[derive(Debug, Clone, Default)]
pub struct TunnelLinkProperties {
    pub internal_addresses: Vec<LinkAddress>,
    pub dns_addresses: Vec<IpAddr>,
    pub pcscf_addresses: Vec<IpAddr>,
    pub iface_name: String,
    pub slice_info: Vec<u8>,
}

impl TunnelLinkProperties {
    /// Derives the effective protocol from which address families are present.
    pub fn protocol_type(&self) -> Protocol {
        let has_v4 = self.internal_addresses.iter().any(|a| a.addr.is_ipv4());
        let has_v6 = self.internal_addresses.iter().any(|a| a.addr.is_ipv6());
        match (has_v4, has_v6) {
            (true, true) => Protocol::Ipv4v6,
            (true, false) => Protocol::Ip,
            (false, true) => Protocol::Ipv6,
            (false, false) => Protocol::Unknown,
        }
    }
}

/// Liveness-check outcome reported to the caller, collapsed from the IKE engine's
/// finer-grained status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkValidationState {
    InProgress,
    Success,
    Failure,
}

/// Callback surface a caller registers per APN; the tunnel manager invokes these from its
/// event loop, never from a caller thread.
pub trait TunnelCallback: Send + Sync {
    fn on_opened(&self, apn: &str, props: &TunnelLinkProperties);
    fn on_closed(&self, apn: &str, err: &IwlanError);
    fn on_network_validation_status_changed(&self, apn: &str, state: NetworkValidationState);
}
