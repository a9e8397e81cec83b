//! `EpdgTunnelManager`: the single-threaded event loop that drives per-APN tunnel state.
//!
//! Modeled on the command-channel-driven state machine idiom (a `Command` enum drained by one
//! loop task, shared bookkeeping kept out of the per-state data so the loop never needs a
//! lock around its own step function). External events (IKE callbacks, selection results,
//! caller requests) are all funneled onto the same channel so state mutation only ever happens
//! on the loop task.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use iwlan_selector::{SelectionContext, Selector};
use iwlan_types::{
    AddressFilter, AddressOrder, CarrierConfig, CarrierConfigKey, FailureClass, FeatureFlags,
    IwlanError, NetworkValidationState, Protocol, TunnelCallback, TunnelLinkProperties,
    TunnelSetupRequest,
};

use crate::config_table::{TunnelConfig, TunnelConfigTable};
use crate::error_policy::ErrorPolicyReporter;
use crate::ike::{
    ChildSessionParams, IkeEngine, IkeSessionCallbacks, IkeSessionParams, LivenessStatus,
    MobilityOptions, NetworkHandle,
};
use crate::monitor::EpdgMonitor;
use crate::state_machine::ApnState;
use crate::token::TokenTable;

fn protocol_to_filter(protocol: Protocol) -> AddressFilter {
    match protocol {
        Protocol::Ip => AddressFilter::Ipv4Only,
        Protocol::Ipv6 => AddressFilter::Ipv6Only,
        Protocol::Ipv4v6 | Protocol::Unknown => AddressFilter::Ipv4v6,
    }
}

struct PendingRequest {
    request: TunnelSetupRequest,
    callback: Arc<dyn TunnelCallback>,
}

enum ManagerEvent {
    BringUp { request: TunnelSetupRequest, callback: Arc<dyn TunnelCallback> },
    Close { apn: String, force: bool },
    UpdateNetwork { network: Option<NetworkHandle>, reachable: bool },
    RequestNetworkValidation { apn: String },
    SetNetworkValidated { validated: bool },
    SelectionResult { apn: String, token: u64, result: Result<Vec<IpAddr>, IwlanError> },
    IkeOpened { apn: String, token: u64 },
    IkeClosed { apn: String, token: u64 },
    IkeClosedWithException { apn: String, token: u64, err: IwlanError },
    IkeLiveness { apn: String, token: u64, status: LivenessStatus },
    ChildOpened { apn: String, token: u64, props: TunnelLinkProperties },
    ChildClosed { apn: String, token: u64 },
    Shutdown,
}

/// Shared admission bookkeeping the public (synchronous) API reads without going through the
/// loop, mirroring the shared-values-outside-the-state-enum idiom of command-driven state
/// machines.
#[derive(Default)]
struct AdmissionState {
    open_or_opening_apns: HashSet<String>,
    has_network: bool,
}

struct LoopState {
    states: HashMap<String, ApnState>,
    callbacks: HashMap<String, Arc<dyn TunnelCallback>>,
    queue: VecDeque<PendingRequest>,
    busy_apn: Option<String>,
    network: Option<NetworkHandle>,
    /// A network update received while a tunnel was live but the new network was not reachable
    /// for the bound source address; replayed once a reachable update for it arrives.
    pending_network: Option<NetworkHandle>,
    /// Whether the current underlying network carries the platform's "validated" signal; drives
    /// whether timeout-class failures get reported to `reportNetworkConnectivity`.
    network_validated: bool,
    contacted_epdgs: HashSet<IpAddr>,
    last_validation_state: HashMap<String, NetworkValidationState>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            states: HashMap::new(),
            callbacks: HashMap::new(),
            queue: VecDeque::new(),
            busy_apn: None,
            network: None,
            pending_network: None,
            network_validated: false,
            contacted_epdgs: HashSet::new(),
            last_validation_state: HashMap::new(),
        }
    }
}

/// Forwards IKE engine callbacks onto the manager's event channel; the loop task does the
/// actual state mutation.
struct CallbackRelay {
    tx: mpsc::UnboundedSender<ManagerEvent>,
}

impl IkeSessionCallbacks for CallbackRelay {
    fn on_ike_opened(&self, apn: &str, token: u64) {
        let _ = self.tx.send(ManagerEvent::IkeOpened { apn: apn.to_string(), token });
    }

    fn on_ike_closed(&self, apn: &str, token: u64) {
        let _ = self.tx.send(ManagerEvent::IkeClosed { apn: apn.to_string(), token });
    }

    fn on_ike_closed_with_exception(&self, apn: &str, token: u64, err: IwlanError) {
        let _ = self
            .tx
            .send(ManagerEvent::IkeClosedWithException { apn: apn.to_string(), token, err });
    }

    fn on_ike_liveness_status_changed(&self, apn: &str, token: u64, status: LivenessStatus) {
        let _ = self.tx.send(ManagerEvent::IkeLiveness { apn: apn.to_string(), token, status });
    }

    fn on_child_opened(&self, apn: &str, token: u64, props: TunnelLinkProperties) {
        let _ = self.tx.send(ManagerEvent::ChildOpened { apn: apn.to_string(), token, props });
    }

    fn on_child_closed(&self, apn: &str, token: u64) {
        let _ = self.tx.send(ManagerEvent::ChildClosed { apn: apn.to_string(), token });
    }
}

/// Drives the full tunnel lifecycle for every APN sharing one underlying network.
pub struct EpdgTunnelManager {
    tx: mpsc::UnboundedSender<ManagerEvent>,
    admission: Arc<Mutex<AdmissionState>>,
    configs: Arc<TunnelConfigTable>,
    monitor: Arc<EpdgMonitor>,
}

impl EpdgTunnelManager {
    pub fn new(
        selector: Arc<dyn Selector>,
        ike: Arc<dyn IkeEngine>,
        carrier_config: Arc<dyn CarrierConfig>,
        error_policy: Arc<dyn ErrorPolicyReporter>,
        selection_ctx: Arc<Mutex<SelectionContext>>,
    ) -> Self {
        Self::with_features(
            selector,
            ike,
            carrier_config,
            error_policy,
            selection_ctx,
            FeatureFlags::default(),
        )
    }

    pub fn with_features(
        selector: Arc<dyn Selector>,
        ike: Arc<dyn IkeEngine>,
        carrier_config: Arc<dyn CarrierConfig>,
        error_policy: Arc<dyn ErrorPolicyReporter>,
        selection_ctx: Arc<Mutex<SelectionContext>>,
        features: FeatureFlags,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let admission = Arc::new(Mutex::new(AdmissionState::default()));
        let tokens = Arc::new(TokenTable::new());
        let configs = Arc::new(TunnelConfigTable::new());
        let monitor = Arc::new(EpdgMonitor::new());

        let worker = ManagerWorker {
            rx,
            tx: tx.clone(),
            selector,
            ike,
            carrier_config,
            error_policy,
            selection_ctx,
            admission: admission.clone(),
            tokens,
            configs: configs.clone(),
            monitor: monitor.clone(),
            features,
            state: LoopState::new(),
        };
        tokio::spawn(worker.run());

        Self { tx, admission, configs, monitor }
    }

    /// Admission per the structural rules; queues or starts the actual work on the loop task.
    /// Returns `false` immediately without touching loop state when the request is malformed,
    /// a tunnel already exists for this APN, or no underlying network is set.
    pub fn bring_up_tunnel(
        &self,
        request: TunnelSetupRequest,
        callback: Arc<dyn TunnelCallback>,
    ) -> bool {
        if !request.is_well_formed() {
            return false;
        }
        let mut admission = self.admission.lock();
        if !admission.has_network || admission.open_or_opening_apns.contains(&request.apn) {
            return false;
        }
        admission.open_or_opening_apns.insert(request.apn.clone());
        drop(admission);

        let _ = self.tx.send(ManagerEvent::BringUp { request, callback });
        true
    }

    pub fn close_tunnel(&self, apn: &str, force: bool, callback: Arc<dyn TunnelCallback>) {
        if !self.admission.lock().open_or_opening_apns.contains(apn) {
            callback.on_closed(apn, &IwlanError::TunnelNotFound);
            return;
        }
        let _ = self.tx.send(ManagerEvent::Close { apn: apn.to_string(), force });
    }

    pub fn update_network(&self, network: Option<NetworkHandle>, reachable: bool) {
        self.admission.lock().has_network = network.is_some();
        let _ = self.tx.send(ManagerEvent::UpdateNetwork { network, reachable });
    }

    pub fn request_network_validation(&self, apn: &str) {
        let _ = self
            .tx
            .send(ManagerEvent::RequestNetworkValidation { apn: apn.to_string() });
    }

    /// Records whether the current underlying network carries the platform's "validated"
    /// signal, consulted when a timeout-class failure considers reporting network connectivity.
    pub fn set_network_validated(&self, validated: bool) {
        let _ = self.tx.send(ManagerEvent::SetNetworkValidated { validated });
    }

    /// Force-closes every open tunnel and stops accepting new bring-ups.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ManagerEvent::Shutdown);
    }

    pub fn epdg_monitor(&self) -> &EpdgMonitor {
        &self.monitor
    }

    pub fn config_table(&self) -> &TunnelConfigTable {
        &self.configs
    }
}

struct ManagerWorker {
    rx: mpsc::UnboundedReceiver<ManagerEvent>,
    tx: mpsc::UnboundedSender<ManagerEvent>,
    selector: Arc<dyn Selector>,
    ike: Arc<dyn IkeEngine>,
    carrier_config: Arc<dyn CarrierConfig>,
    error_policy: Arc<dyn ErrorPolicyReporter>,
    selection_ctx: Arc<Mutex<SelectionContext>>,
    admission: Arc<Mutex<AdmissionState>>,
    tokens: Arc<TokenTable>,
    configs: Arc<TunnelConfigTable>,
    monitor: Arc<EpdgMonitor>,
    features: FeatureFlags,
    state: LoopState,
}

impl ManagerWorker {
    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                ManagerEvent::Shutdown => {
                    self.handle_shutdown();
                    break;
                }
                other => self.handle_event(other),
            }
        }
    }

    #[tracing::instrument(skip(self, event))]
    fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::BringUp { request, callback } => self.handle_bring_up(request, callback),
            ManagerEvent::Close { apn, force } => self.handle_close(&apn, force),
            ManagerEvent::UpdateNetwork { network, reachable } => {
                self.handle_update_network(network, reachable)
            }
            ManagerEvent::RequestNetworkValidation { apn } => {
                if let Some(cfg) = self.configs.get(&apn) {
                    cfg.session.request_liveness_check();
                }
            }
            ManagerEvent::SetNetworkValidated { validated } => {
                self.state.network_validated = validated;
            }
            ManagerEvent::SelectionResult { apn, token, result } => {
                self.handle_selection_result(apn, token, result)
            }
            ManagerEvent::IkeOpened { apn, token } => self.handle_ike_opened(apn, token),
            ManagerEvent::IkeClosed { apn, token } => {
                self.handle_ike_terminated(apn, token, None, false)
            }
            ManagerEvent::IkeClosedWithException { apn, token, err } => {
                self.handle_ike_terminated(apn, token, Some(err), false)
            }
            ManagerEvent::IkeLiveness { apn, token, status } => {
                self.handle_liveness(apn, token, status)
            }
            ManagerEvent::ChildOpened { apn, token, props } => {
                self.handle_child_opened(apn, token, props)
            }
            ManagerEvent::ChildClosed { apn, token } => {
                self.handle_ike_terminated(apn, token, None, false)
            }
            ManagerEvent::Shutdown => self.handle_shutdown(),
        }
    }

    fn handle_bring_up(&mut self, request: TunnelSetupRequest, callback: Arc<dyn TunnelCallback>) {
        if self.state.busy_apn.is_some() {
            self.state.queue.push_back(PendingRequest { request, callback });
            return;
        }
        self.start_resolution(request, callback);
    }

    fn start_resolution(&mut self, request: TunnelSetupRequest, callback: Arc<dyn TunnelCallback>) {
        let apn = request.apn.clone();
        self.state.callbacks.insert(apn.clone(), callback);
        let token = self.tokens.next(&apn);
        self.state.busy_apn = Some(apn.clone());
        self.state.states.insert(apn.clone(), ApnState::Resolving { token, request: request.clone() });

        let selector = self.selector.clone();
        let ctx = self.selection_ctx.lock().clone();
        let filter = protocol_to_filter(request.protocol);
        let is_roaming = request.is_roaming;
        let is_emergency = request.is_emergency;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = selector
                .get_validated_server_list(&ctx, filter, AddressOrder::System, is_roaming, is_emergency)
                .await;
            let _ = tx.send(ManagerEvent::SelectionResult { apn, token, result });
        });
    }

    fn handle_selection_result(
        &mut self,
        apn: String,
        token: u64,
        result: Result<Vec<IpAddr>, IwlanError>,
    ) {
        if !self.tokens.is_current(&apn, token) {
            return;
        }
        let Some(ApnState::Resolving { request, .. }) = self.state.states.get(&apn).cloned() else {
            return;
        };
        match result {
            Ok(candidates) if !candidates.is_empty() => {
                let idx = self.preferred_epdg_for(&request, &candidates);
                let addr = candidates[idx];
                self.create_session(apn, token, request, addr);
            }
            _ => self.fail(&apn, token, IwlanError::EpdgSelectorServerSelectionFailed, false),
        }
    }

    /// Picks the ePDG address for a bring-up given the monitor's current affinity: an emergency
    /// request prefers the existing normal ePDG (tried first, before falling back to a distinct
    /// one); a normal request prefers a distinct emergency ePDG already bound, so it lands on the
    /// same gateway as a live emergency session instead of opening a second one.
    fn preferred_epdg_for(&self, request: &TunnelSetupRequest, candidates: &[IpAddr]) -> usize {
        let preferred = if request.is_emergency {
            self.monitor.epdg_for_normal()
        } else if self.monitor.has_separate_emergency_epdg() {
            self.monitor.epdg_for_emergency()
        } else {
            None
        };
        if let Some(preferred) = preferred {
            if let Some(pos) = candidates.iter().position(|a| *a == preferred) {
                return pos;
            }
        }
        0
    }

    fn create_session(&mut self, apn: String, token: u64, request: TunnelSetupRequest, addr: IpAddr) {
        let initial_contact = !self.state.contacted_epdgs.contains(&addr);
        let mobility = MobilityOptions::for_address(addr);
        let params = IkeSessionParams {
            epdg_address: addr,
            initial_contact,
            mobility,
            retransmit_timer_msec: self.carrier_config.retransmit_timer_msec(),
            dpd_timer_sec: self
                .carrier_config
                .get_int(CarrierConfigKey::DpdTimerSec)
                .unwrap_or(30) as u32,
            natt_keep_alive_timer_sec: self.carrier_config.natt_keep_alive_timer_sec(),
        };
        let child_params = ChildSessionParams {
            request_pcscf: request.request_pcscf,
            pdu_session_id: request.pdu_session_id,
        };
        let network = self.state.network.unwrap_or(NetworkHandle(0));
        let callbacks: Arc<dyn IkeSessionCallbacks> =
            Arc::new(CallbackRelay { tx: self.tx.clone() });
        let session = self.ike.create_ike_session(
            &apn,
            token,
            network,
            params,
            child_params,
            callbacks,
        );
        self.state.contacted_epdgs.insert(addr);
        self.state.states.insert(
            apn.clone(),
            ApnState::Connecting { token, request: request.clone(), bound_epdg: addr },
        );
        self.configs.insert(TunnelConfig {
            apn: apn.clone(),
            token,
            session,
            src_ipv4: request.src_ipv4,
            src_ipv6: request.src_ipv6,
            is_emergency: request.is_emergency,
            bound_epdg: addr,
            link_properties: None,
        });
    }

    fn handle_ike_opened(&mut self, apn: String, token: u64) {
        if !self.tokens.is_current(&apn, token) {
            return;
        }
        tracing::debug!(%apn, "IKE session opened, awaiting child session");
    }

    fn handle_child_opened(&mut self, apn: String, token: u64, props: TunnelLinkProperties) {
        if !self.tokens.is_current(&apn, token) {
            return;
        }
        let Some(ApnState::Connecting { request, bound_epdg, .. }) =
            self.state.states.get(&apn).cloned()
        else {
            return;
        };
        self.configs.set_link_properties(&apn, props.clone());
        self.state.states.insert(apn.clone(), ApnState::Open { token, bound_epdg });
        self.monitor.apn_connected(
            &apn,
            bound_epdg,
            request.is_emergency,
            self.carrier_config.distinct_epdg_for_emergency_allowed(),
        );
        self.selector.on_epdg_connected_successfully();
        if let Some(cb) = self.state.callbacks.get(&apn) {
            cb.on_opened(&apn, &props);
        }
        self.release_busy_slot_if(&apn);
    }

    fn handle_ike_terminated(
        &mut self,
        apn: String,
        token: u64,
        err: Option<IwlanError>,
        _from_force_close: bool,
    ) {
        if !self.tokens.is_current(&apn, token) {
            return;
        }
        let Some(state) = self.state.states.get(&apn).cloned() else {
            return;
        };
        match state {
            ApnState::Connecting { request, bound_epdg, .. } => {
                let err = err.unwrap_or(IwlanError::IkeSessionClosedBeforeChildSessionOpened);
                let class = err.failure_class();
                // The emergency-affinity first attempt targets the existing normal ePDG before
                // any candidate list has even been excluded from; per the affinity rule it still
                // gets a follow-up selection on failure even when the failure itself classifies
                // as internal (e.g. closing before the child session opened).
                let is_emergency_affinity_attempt =
                    request.is_emergency && self.monitor.epdg_for_normal() == Some(bound_epdg);
                if class == FailureClass::Internal && !is_emergency_affinity_attempt {
                    self.fail(&apn, token, err, false);
                } else {
                    if class != FailureClass::Internal {
                        self.selector.on_epdg_connection_failed(bound_epdg, class);
                    }
                    self.retry_with_next_candidate(apn, token, request, err);
                }
            }
            ApnState::Open { bound_epdg, .. } => {
                let err = err.unwrap_or(IwlanError::IkeNetworkLost);
                self.monitor.apn_disconnected(&apn);
                self.maybe_report_network_connectivity(&err);
                self.fail_open_tunnel(&apn, token, bound_epdg, err);
            }
            ApnState::Closing { .. } => {
                // Reaching CLOSING at all only happens via a caller-initiated `close_tunnel`;
                // `force` only chose kill() vs. a graceful close() above, it does not affect
                // whether this termination is voluntary for error-policy reporting purposes.
                self.finalize_close(&apn, token, true);
            }
            ApnState::Resolving { .. } | ApnState::Idle => {}
        }
    }

    fn retry_with_next_candidate(
        &mut self,
        apn: String,
        token: u64,
        request: TunnelSetupRequest,
        last_err: IwlanError,
    ) {
        // IKE_MOBILITY_TIMEOUT is not carrier-attributable: the mobility source disappeared out
        // from under the session, not the peer, so it is never reported to error-policy even
        // though it still drives exclusion and candidate iteration above.
        if !matches!(last_err, IwlanError::IkeMobilityTimeout) {
            self.report_error(&apn, &last_err);
        }
        self.maybe_report_network_connectivity(&last_err);
        // Re-run selection: the exclusion set now omits the address that just failed, per the
        // selector's own bookkeeping, so the manager simply asks again rather than walking a
        // locally cached candidate list.
        self.state.states.insert(apn.clone(), ApnState::Resolving { token, request: request.clone() });
        let selector = self.selector.clone();
        let ctx = self.selection_ctx.lock().clone();
        let filter = protocol_to_filter(request.protocol);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = selector
                .get_validated_server_list(
                    &ctx,
                    filter,
                    AddressOrder::System,
                    request.is_roaming,
                    request.is_emergency,
                )
                .await;
            let _ = tx.send(ManagerEvent::SelectionResult { apn, token, result });
        });
    }

    fn fail(&mut self, apn: &str, token: u64, err: IwlanError, voluntary: bool) {
        let _ = token;
        if !voluntary {
            self.report_error(apn, &err);
        }
        self.state.states.remove(apn);
        self.configs.remove(apn);
        self.admission.lock().open_or_opening_apns.remove(apn);
        if let Some(cb) = self.state.callbacks.remove(apn) {
            cb.on_closed(apn, &err);
        }
        self.release_busy_slot_if(apn);
    }

    fn fail_open_tunnel(&mut self, apn: &str, token: u64, _bound_epdg: IpAddr, err: IwlanError) {
        // A session that successfully opened is never penalized for a later involuntary close.
        self.state.states.remove(apn);
        self.configs.remove(apn);
        self.admission.lock().open_or_opening_apns.remove(apn);
        if let Some(cb) = self.state.callbacks.remove(apn) {
            cb.on_closed(apn, &err);
        }
        let _ = token;
    }

    fn release_busy_slot_if(&mut self, apn: &str) {
        if self.state.busy_apn.as_deref() == Some(apn) {
            self.state.busy_apn = None;
            if let Some(next) = self.state.queue.pop_front() {
                self.start_resolution(next.request, next.callback);
            }
        }
    }

    fn handle_close(&mut self, apn: &str, force: bool) {
        let Some(state) = self.state.states.get(apn).cloned() else {
            // Not yet admitted into the state machine at all means it's still sitting in the
            // FIFO bring-up queue; cancel it there instead of letting it start after the caller
            // already asked to close it.
            if let Some(pos) = self.state.queue.iter().position(|p| p.request.apn == apn) {
                if let Some(pending) = self.state.queue.remove(pos) {
                    self.admission.lock().open_or_opening_apns.remove(apn);
                    pending.callback.on_closed(apn, &IwlanError::NoError);
                }
            } else if let Some(cb) = self.state.callbacks.remove(apn) {
                cb.on_closed(apn, &IwlanError::TunnelNotFound);
            }
            return;
        };
        match state {
            ApnState::Open { token, .. } => {
                self.state.states.insert(apn.to_string(), ApnState::Closing { token, force });
                if let Some(cfg) = self.configs.get(apn) {
                    if force {
                        cfg.session.kill();
                        self.finalize_close(apn, token, true);
                    } else {
                        cfg.session.close();
                    }
                }
            }
            ApnState::Connecting { token, .. } | ApnState::Resolving { token, .. } => {
                if let Some(cfg) = self.configs.get(apn) {
                    cfg.session.kill();
                }
                self.finalize_close(apn, token, true);
            }
            ApnState::Closing { .. } | ApnState::Idle => {}
        }
    }

    fn finalize_close(&mut self, apn: &str, token: u64, voluntary: bool) {
        self.state.states.remove(apn);
        self.configs.remove(apn);
        self.monitor.apn_disconnected(apn);
        self.admission.lock().open_or_opening_apns.remove(apn);
        if let Some(cb) = self.state.callbacks.remove(apn) {
            cb.on_closed(apn, &IwlanError::NoError);
        }
        if voluntary {
            self.error_policy.report_error(apn, &IwlanError::NoError, None);
        }
        self.release_busy_slot_if(apn);
        let _ = token;
    }

    fn handle_liveness(&mut self, apn: String, token: u64, status: LivenessStatus) {
        if !self.tokens.is_current(&apn, token) {
            return;
        }
        let mapped = match status {
            LivenessStatus::OnDemandStarted
            | LivenessStatus::OnDemandOngoing
            | LivenessStatus::BackgroundStarted
            | LivenessStatus::BackgroundOngoing => NetworkValidationState::InProgress,
            LivenessStatus::Success => NetworkValidationState::Success,
            LivenessStatus::Failure => NetworkValidationState::Failure,
        };
        let changed = self.state.last_validation_state.get(&apn) != Some(&mapped);
        if changed {
            self.state.last_validation_state.insert(apn.clone(), mapped);
            if let Some(cb) = self.state.callbacks.get(&apn) {
                cb.on_network_validation_status_changed(&apn, mapped);
            }
        }
    }

    /// `updateNetwork(None, _)` freezes: the stored network is cleared, new bring-ups are
    /// rejected at the admission layer, and existing OPEN tunnels are left untouched. Otherwise,
    /// while no tunnel is live past IDLE the new network is adopted unconditionally; with a live
    /// tunnel, an unreachable update is stashed instead of applied and replayed verbatim the
    /// next time a reachable update names the same network.
    fn handle_update_network(&mut self, network: Option<NetworkHandle>, reachable: bool) {
        let Some(network) = network else {
            self.state.network = None;
            self.state.pending_network = None;
            return;
        };
        if !self.state.states.is_empty() && !reachable {
            self.state.pending_network = Some(network);
            return;
        }
        self.state.pending_network = None;
        self.state.network = Some(network);
        self.configs.for_each_session(|cfg| cfg.session.set_network(network));
    }

    fn handle_shutdown(&mut self) {
        let apns: Vec<String> = self.state.states.keys().cloned().collect();
        for apn in apns {
            if let Some(cfg) = self.configs.get(&apn) {
                cfg.session.kill();
            }
            if let Some(token) = self.tokens.current(&apn) {
                self.finalize_close(&apn, token, true);
            }
        }
        self.state.queue.clear();
    }

    /// `IKE_INIT_TIMEOUT`/`IKE_DPD_TIMEOUT`/`IKE_MOBILITY_TIMEOUT`/`IKE_NETWORK_LOST` all mean
    /// the peer never answered; when the network claims to be validated and both the carrier
    /// config and platform feature flag ask for it, tell the network collaborator it may not
    /// actually be working.
    fn maybe_report_network_connectivity(&self, err: &IwlanError) {
        let is_no_response = matches!(
            err,
            IwlanError::IkeInitTimeout
                | IwlanError::IkeDpdTimeout
                | IwlanError::IkeMobilityTimeout
                | IwlanError::IkeNetworkLost
        );
        if !is_no_response || !self.state.network_validated || !self.features.validate_network_on_no_response
        {
            return;
        }
        if !self.carrier_config.validate_underlying_network_on_no_response() {
            return;
        }
        if let Some(network) = self.state.network {
            self.error_policy.report_network_connectivity(network, false);
        }
    }

    fn report_error(&self, apn: &str, err: &IwlanError) {
        let backoff = match err {
            IwlanError::IkeProtocolException { data, .. } => {
                data.first().and_then(|b| IwlanError::decode_backoff(*b))
            }
            _ => None,
        };
        self.error_policy.report_error(apn, err, backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_policy::NoopErrorPolicyReporter;
    use crate::ike::fake::FakeIkeEngine;
    use async_trait::async_trait;
    use iwlan_types::{CarrierConfigKey as K, Protocol};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSelector {
        responses: Mutex<VecDeque<Vec<IpAddr>>>,
        successes: AtomicUsize,
    }

    impl FakeSelector {
        fn new(responses: Vec<Vec<IpAddr>>) -> Self {
            Self { responses: Mutex::new(responses.into()), successes: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Selector for FakeSelector {
        async fn get_validated_server_list(
            &self,
            _ctx: &SelectionContext,
            _filter: AddressFilter,
            _order: AddressOrder,
            _is_roaming: bool,
            _is_emergency: bool,
        ) -> Result<Vec<IpAddr>, IwlanError> {
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                Ok(responses.pop_front().unwrap_or_default())
            } else {
                Ok(responses.front().cloned().unwrap_or_default())
            }
        }

        fn on_epdg_connection_failed(&self, _addr: IpAddr, _class: FailureClass) {}

        fn on_epdg_connected_successfully(&self) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct DistinctEmergencyConfig;

    impl CarrierConfig for DistinctEmergencyConfig {
        fn get_int(&self, _key: K) -> Option<i64> {
            None
        }
        fn get_int_array(&self, _key: K) -> Option<Vec<i64>> {
            None
        }
        fn get_string(&self, _key: K) -> Option<String> {
            None
        }
        fn get_string_array(&self, _key: K) -> Option<Vec<String>> {
            None
        }
        fn get_bool(&self, key: K) -> Option<bool> {
            matches!(key, K::KeyDistinctEpdgForEmergencyAllowed).then_some(true)
        }
    }

    #[derive(Default)]
    struct TestConfig;

    impl CarrierConfig for TestConfig {
        fn get_int(&self, _key: K) -> Option<i64> {
            None
        }
        fn get_int_array(&self, _key: K) -> Option<Vec<i64>> {
            None
        }
        fn get_string(&self, _key: K) -> Option<String> {
            None
        }
        fn get_string_array(&self, _key: K) -> Option<Vec<String>> {
            None
        }
        fn get_bool(&self, _key: K) -> Option<bool> {
            None
        }
    }

    struct RecordingCallback {
        opened: Mutex<Vec<TunnelLinkProperties>>,
        closed: Mutex<Vec<IwlanError>>,
    }

    impl RecordingCallback {
        fn new() -> Arc<Self> {
            Arc::new(Self { opened: Mutex::new(Vec::new()), closed: Mutex::new(Vec::new()) })
        }
    }

    impl TunnelCallback for RecordingCallback {
        fn on_opened(&self, _apn: &str, props: &TunnelLinkProperties) {
            self.opened.lock().push(props.clone());
        }
        fn on_closed(&self, _apn: &str, err: &IwlanError) {
            self.closed.lock().push(err.clone());
        }
        fn on_network_validation_status_changed(&self, _apn: &str, _state: NetworkValidationState) {}
    }

    fn request(apn: &str, emergency: bool) -> TunnelSetupRequest {
        TunnelSetupRequest {
            apn: apn.to_string(),
            protocol: Protocol::Ip,
            is_roaming: false,
            is_emergency: emergency,
            request_pcscf: false,
            pdu_session_id: 0,
            src_ipv4: None,
            src_ipv6: None,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn rejects_bring_up_without_network() {
        let selector = Arc::new(FakeSelector::new(vec![vec!["127.0.0.1".parse().unwrap()]]));
        let ike = Arc::new(FakeIkeEngine::new());
        let manager = EpdgTunnelManager::new(
            selector,
            ike,
            Arc::new(TestConfig),
            Arc::new(NoopErrorPolicyReporter),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        let cb = RecordingCallback::new();
        assert!(!manager.bring_up_tunnel(request("ims", false), cb));
    }

    #[tokio::test]
    async fn bring_up_then_open_round_trip() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        let selector = Arc::new(FakeSelector::new(vec![vec![addr]]));
        let ike = Arc::new(FakeIkeEngine::new());
        let manager = EpdgTunnelManager::new(
            selector,
            ike.clone(),
            Arc::new(TestConfig),
            Arc::new(NoopErrorPolicyReporter),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        manager.update_network(Some(NetworkHandle(1)), true);
        let cb = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("ims", false), cb.clone()));

        settle().await;
        assert_eq!(ike.session_count(), 1);

        let callbacks = ike.callbacks_for("ims", 1);
        callbacks.on_ike_opened("ims", 1);
        callbacks.on_child_opened("ims", 1, TunnelLinkProperties::default());

        settle().await;
        assert_eq!(cb.opened.lock().len(), 1);
        assert_eq!(manager.epdg_monitor().epdg_for_normal(), Some(addr));
    }

    #[tokio::test]
    async fn back_to_back_bring_up_serializes_s5() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        let selector = Arc::new(FakeSelector::new(vec![vec![addr]]));
        let ike = Arc::new(FakeIkeEngine::new());
        let manager = EpdgTunnelManager::new(
            selector,
            ike.clone(),
            Arc::new(TestConfig),
            Arc::new(NoopErrorPolicyReporter),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        manager.update_network(Some(NetworkHandle(1)), true);

        let cb1 = RecordingCallback::new();
        let cb2 = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("apn1", false), cb1.clone()));
        assert!(manager.bring_up_tunnel(request("apn2", false), cb2.clone()));

        settle().await;
        // Only apn1's session should have been created so far; apn2 is queued.
        assert_eq!(ike.session_count(), 1);

        let cb_apn1 = ike.callbacks_for("apn1", 1);
        cb_apn1.on_ike_opened("apn1", 1);
        cb_apn1.on_child_opened("apn1", 1, TunnelLinkProperties::default());

        settle().await;
        assert_eq!(ike.session_count(), 2);
        let apn2_session = ike.sessions.lock().get(&("apn2".to_string(), 1)).cloned().unwrap();
        assert!(apn2_session.params.initial_contact);
    }

    /// Closing an APN while its bring-up is still sitting in the FIFO queue (admitted, but
    /// resolution never started) cancels it in place instead of silently starting it later.
    #[tokio::test]
    async fn close_while_queued_cancels_instead_of_starting() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        let selector = Arc::new(FakeSelector::new(vec![vec![addr]]));
        let ike = Arc::new(FakeIkeEngine::new());
        let manager = EpdgTunnelManager::new(
            selector,
            ike.clone(),
            Arc::new(TestConfig),
            Arc::new(NoopErrorPolicyReporter),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        manager.update_network(Some(NetworkHandle(1)), true);

        let cb1 = RecordingCallback::new();
        let cb2 = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("apn1", false), cb1.clone()));
        assert!(manager.bring_up_tunnel(request("apn2", false), cb2.clone()));
        settle().await;
        assert_eq!(ike.session_count(), 1);

        // apn2 is still queued behind apn1; closing it now must cancel the queued entry rather
        // than reporting TunnelNotFound (it is admitted) or letting it start once apn1 opens.
        manager.close_tunnel("apn2", false, RecordingCallback::new());
        settle().await;
        assert_eq!(cb2.closed.lock().len(), 1);
        assert!(matches!(cb2.closed.lock()[0], IwlanError::NoError));

        let cb_apn1 = ike.callbacks_for("apn1", 1);
        cb_apn1.on_ike_opened("apn1", 1);
        cb_apn1.on_child_opened("apn1", 1, TunnelLinkProperties::default());
        settle().await;
        assert_eq!(ike.session_count(), 1);

        // The admission slot freed by the cancellation lets apn2 be brought up again.
        let cb2_retry = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("apn2", false), cb2_retry));
        settle().await;
        assert_eq!(ike.session_count(), 2);
    }

    #[tokio::test]
    async fn emergency_prefers_same_epdg_then_falls_back_s6() {
        let normal_addr: IpAddr = "127.0.0.1".parse().unwrap();
        let emergency_addr: IpAddr = "127.0.0.2".parse().unwrap();
        let selector = Arc::new(FakeSelector::new(vec![
            vec![normal_addr],
            vec![normal_addr, emergency_addr],
        ]));
        let ike = Arc::new(FakeIkeEngine::new());
        let manager = EpdgTunnelManager::new(
            selector,
            ike.clone(),
            Arc::new(DistinctEmergencyConfig),
            Arc::new(NoopErrorPolicyReporter),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        manager.update_network(Some(NetworkHandle(1)), true);

        let cb_ims = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("ims", false), cb_ims.clone()));
        settle().await;
        let ims_cb = ike.callbacks_for("ims", 1);
        ims_cb.on_ike_opened("ims", 1);
        ims_cb.on_child_opened("ims", 1, TunnelLinkProperties::default());
        settle().await;
        assert_eq!(manager.epdg_monitor().epdg_for_normal(), Some(normal_addr));

        let cb_sos = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("sos", true), cb_sos.clone()));
        settle().await;

        let sos_session = ike.sessions.lock().get(&("sos".to_string(), 1)).cloned().unwrap();
        assert_eq!(sos_session.network, NetworkHandle(1));
        assert_eq!(sos_session.params.epdg_address, normal_addr);
        assert!(!sos_session.params.initial_contact);

        let sos_cb = ike.callbacks_for("sos", 1);
        sos_cb.on_ike_closed_with_exception("sos", 1, IwlanError::IkeSessionClosedBeforeChildSessionOpened);
        settle().await;

        let sos_session_2 = ike.sessions.lock().get(&("sos".to_string(), 2)).cloned().unwrap();
        assert_eq!(sos_session_2.params.epdg_address, emergency_addr);
        assert!(sos_session_2.params.initial_contact);

        let sos_cb_2 = ike.callbacks_for("sos", 2);
        sos_cb_2.on_ike_opened("sos", 2);
        sos_cb_2.on_child_opened("sos", 2, TunnelLinkProperties::default());
        settle().await;
        assert!(manager.epdg_monitor().has_separate_emergency_epdg());

        // "ims" is re-brought-up (e.g. after an earlier close) while "sos" still holds the
        // distinct emergency ePDG: the new normal tunnel binds to that same emergency ePDG
        // rather than the original normal one.
        manager.close_tunnel("ims", true, cb_ims.clone());
        settle().await;

        let cb_ims_2 = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("ims", false), cb_ims_2.clone()));
        settle().await;
        let ims_session_2 = ike.sessions.lock().get(&("ims".to_string(), 2)).cloned().unwrap();
        assert_eq!(ims_session_2.params.epdg_address, emergency_addr);
    }

    #[derive(Default)]
    struct RecordingErrorPolicy {
        errors: Mutex<Vec<IwlanError>>,
        connectivity_reports: Mutex<Vec<(NetworkHandle, bool)>>,
    }

    impl ErrorPolicyReporter for RecordingErrorPolicy {
        fn report_error(&self, _apn: &str, err: &IwlanError, _backoff: Option<Duration>) {
            self.errors.lock().push(err.clone());
        }
        fn report_network_connectivity(&self, network: NetworkHandle, is_connected: bool) {
            self.connectivity_reports.lock().push((network, is_connected));
        }
    }

    struct ValidateOnNoResponseConfig;

    impl CarrierConfig for ValidateOnNoResponseConfig {
        fn get_int(&self, _key: K) -> Option<i64> {
            None
        }
        fn get_int_array(&self, _key: K) -> Option<Vec<i64>> {
            None
        }
        fn get_string(&self, _key: K) -> Option<String> {
            None
        }
        fn get_string_array(&self, _key: K) -> Option<Vec<String>> {
            None
        }
        fn get_bool(&self, key: K) -> Option<bool> {
            matches!(key, K::KeyValidateUnderlyingNetworkOnNoResponse).then_some(true)
        }
    }

    #[tokio::test]
    async fn mobility_timeout_drives_exclusion_without_reporting_error() {
        let failing_addr: IpAddr = "127.0.0.1".parse().unwrap();
        let next_addr: IpAddr = "127.0.0.2".parse().unwrap();
        let selector = Arc::new(FakeSelector::new(vec![vec![failing_addr], vec![next_addr]]));
        let ike = Arc::new(FakeIkeEngine::new());
        let error_policy = Arc::new(RecordingErrorPolicy::default());
        let manager = EpdgTunnelManager::new(
            selector,
            ike.clone(),
            Arc::new(ValidateOnNoResponseConfig),
            error_policy.clone(),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        manager.update_network(Some(NetworkHandle(1)), true);
        manager.set_network_validated(true);

        let cb = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("ims", false), cb.clone()));
        settle().await;

        let first_cb = ike.callbacks_for("ims", 1);
        first_cb.on_ike_closed_with_exception("ims", 1, IwlanError::IkeMobilityTimeout);
        settle().await;

        // Candidate iteration stays within the same (apn, token) epoch; the retry's session
        // overwrites the failed one rather than minting a new token.
        let retried_session = ike.sessions.lock().get(&("ims".to_string(), 1)).cloned().unwrap();
        assert_eq!(retried_session.params.epdg_address, next_addr);
        assert!(error_policy.errors.lock().is_empty());
        assert_eq!(
            error_policy.connectivity_reports.lock().as_slice(),
            &[(NetworkHandle(1), false)]
        );
    }

    #[tokio::test]
    async fn unreachable_network_update_is_deferred_until_reachable() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        let selector = Arc::new(FakeSelector::new(vec![vec![addr]]));
        let ike = Arc::new(FakeIkeEngine::new());
        let manager = EpdgTunnelManager::new(
            selector,
            ike.clone(),
            Arc::new(TestConfig),
            Arc::new(NoopErrorPolicyReporter),
            Arc::new(Mutex::new(SelectionContext::default())),
        );
        manager.update_network(Some(NetworkHandle(1)), true);

        let cb = RecordingCallback::new();
        assert!(manager.bring_up_tunnel(request("ims", false), cb.clone()));
        settle().await;
        let session_cb = ike.callbacks_for("ims", 1);
        session_cb.on_ike_opened("ims", 1);
        session_cb.on_child_opened("ims", 1, TunnelLinkProperties::default());
        settle().await;

        // Unreachable update while OPEN must not be applied to the live session.
        manager.update_network(Some(NetworkHandle(2)), false);
        settle().await;
        let session = ike.sessions.lock().get(&("ims".to_string(), 1)).cloned().unwrap();
        assert_eq!(session.network, NetworkHandle(1));

        // A later reachable update for the same network is applied.
        manager.update_network(Some(NetworkHandle(2)), true);
        settle().await;
        let session = ike.sessions.lock().get(&("ims".to_string(), 1)).cloned().unwrap();
        assert_eq!(session.network, NetworkHandle(2));
    }
}
