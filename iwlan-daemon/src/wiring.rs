//! Wires a `CarrierConfig` loaded from disk, a DNS-backed `EpdgSelector`, and a pluggable
//! `IkeEngine` into one running `EpdgTunnelManager`. This is the "binary that just parses
//! args, sets up logging, and drives the library" half of the teacher's
//! `headless-client`/`bin-shared` split; `Daemon` is the library half `main.rs` constructs and
//! drives.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use iwlan_selector::{EpdgSelector, SelectionContext, Selector};
use iwlan_tunnel::{EpdgTunnelManager, IkeEngine, NetworkHandle};
use iwlan_types::{CarrierConfig, TunnelCallback, TunnelSetupRequest};

use crate::carrier_config::TomlCarrierConfig;
use crate::ike_stub::LoggingIkeEngine;
use crate::reporting::TracingErrorPolicyReporter;

/// Production `DnsClient`/`NetworkProbe` aliases kept concrete here so the rest of the daemon
/// only has to name `Daemon`, not its type parameters.
type ProdSelector =
    EpdgSelector<TomlCarrierConfig, iwlan_selector::dns::StubResolverDnsClient, StaticLocalProbe>;

pub use iwlan_selector::network_probe::StaticNetworkProbe as StaticLocalProbe;

/// Owns the selector and tunnel manager for one underlying network / SIM slot.
pub struct Daemon {
    selector: Arc<ProdSelector>,
    manager: EpdgTunnelManager,
}

impl Daemon {
    /// Builds a selector over a TOML carrier config file and a stub-resolver DNS client, a
    /// logging placeholder `IkeEngine` (§6.2 is external to this crate), and the tunnel
    /// manager that drives them.
    pub fn new(carrier_config_path: &Path, local_addresses: Vec<IpAddr>) -> anyhow::Result<Self> {
        let carrier_config = Arc::new(TomlCarrierConfig::load(carrier_config_path)?);
        let dns = Arc::new(iwlan_selector::dns::StubResolverDnsClient::new());
        let probe = Arc::new(StaticLocalProbe::new(local_addresses));
        let selector = Arc::new(EpdgSelector::new(carrier_config.clone(), dns, probe));

        Self::with_collaborators(
            selector,
            carrier_config,
            Arc::new(LoggingIkeEngine::new()),
            Arc::new(TracingErrorPolicyReporter),
        )
    }

    /// Lower-level constructor taking already-built collaborators; used by `new` and by tests
    /// that substitute a fake `IkeEngine` or `CarrierConfig`.
    pub fn with_collaborators(
        selector: Arc<ProdSelector>,
        carrier_config: Arc<dyn CarrierConfig>,
        ike: Arc<dyn IkeEngine>,
        error_policy: Arc<dyn iwlan_tunnel::ErrorPolicyReporter>,
    ) -> anyhow::Result<Self> {
        let selector_dyn: Arc<dyn Selector> = selector.clone();
        let manager = EpdgTunnelManager::new(
            selector_dyn,
            ike,
            carrier_config,
            error_policy,
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        Ok(Self { selector, manager })
    }

    pub fn bring_up_tunnel(
        &self,
        request: TunnelSetupRequest,
        callback: Arc<dyn TunnelCallback>,
    ) -> bool {
        self.manager.bring_up_tunnel(request, callback)
    }

    pub fn close_tunnel(&self, apn: &str, force: bool, callback: Arc<dyn TunnelCallback>) {
        self.manager.close_tunnel(apn, force, callback)
    }

    pub fn update_network(&self, network: Option<NetworkHandle>, reachable: bool) {
        self.manager.update_network(network, reachable)
    }

    pub fn request_network_validation(&self, apn: &str) {
        self.manager.request_network_validation(apn)
    }

    pub fn set_network_validated(&self, validated: bool) {
        self.manager.set_network_validated(validated)
    }

    /// Pushes a carrier-signaled PCO payload into the selector's `PcoStore` (§6.4); only
    /// `ApnType::Ims` payloads are retained.
    pub fn push_pco(&self, apn_type: iwlan_selector::ApnType, pco_id: u16, payload: Vec<u8>) {
        self.selector.pco_store().push(apn_type, pco_id, payload);
    }

    pub fn clear_pco(&self) {
        self.selector.pco_store().clear();
    }

    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}
