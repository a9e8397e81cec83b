//! A logging placeholder for the external IKEv2/IPsec engine collaborator (§6.2). The real
//! protocol engine is explicitly out of scope for this crate and is assumed to be supplied by
//! the embedding process as a reusable library; this stub exists purely so `iwlan-daemon`
//! links and runs standalone for manual wiring checks. It records every call and never invokes
//! a callback on its own — a real `IkeEngine` plugs in here unchanged, the manager only ever
//! depends on the trait.

use std::sync::Arc;

use iwlan_tunnel::{
    ChildSessionParams, IkeEngine, IkeSession, IkeSessionCallbacks, IkeSessionParams, NetworkHandle,
};

pub struct LoggingIkeEngine;

impl LoggingIkeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingIkeEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct LoggingIkeSession {
    apn: String,
    token: u64,
}

impl IkeSession for LoggingIkeSession {
    fn set_network(&self, network: NetworkHandle) {
        tracing::info!(apn = %self.apn, token = self.token, ?network, "set_network (no-op engine)");
    }

    fn close(&self) {
        tracing::info!(apn = %self.apn, token = self.token, "close (no-op engine)");
    }

    fn kill(&self) {
        tracing::info!(apn = %self.apn, token = self.token, "kill (no-op engine)");
    }

    fn request_liveness_check(&self) {
        tracing::info!(apn = %self.apn, token = self.token, "request_liveness_check (no-op engine)");
    }
}

impl IkeEngine for LoggingIkeEngine {
    fn create_ike_session(
        &self,
        apn: &str,
        token: u64,
        network: NetworkHandle,
        params: IkeSessionParams,
        child_params: ChildSessionParams,
        _callbacks: Arc<dyn IkeSessionCallbacks>,
    ) -> Arc<dyn IkeSession> {
        tracing::info!(
            apn,
            token,
            ?network,
            epdg = %params.epdg_address,
            initial_contact = params.initial_contact,
            mobike = params.mobility.mobike,
            request_pcscf = child_params.request_pcscf,
            "create_ike_session (no-op engine: plug in a real IkeEngine to drive actual tunnels)"
        );
        Arc::new(LoggingIkeSession { apn: apn.to_string(), token })
    }
}
