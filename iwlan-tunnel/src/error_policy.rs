//! The error-policy / network-connectivity-reporting collaborator. External to this crate;
//! only the interface the manager drives is defined here.

use std::time::Duration;

use iwlan_types::IwlanError;

use crate::ike::NetworkHandle;

pub trait ErrorPolicyReporter: Send + Sync {
    /// Reports a typed error for `apn`, with a decoded backoff duration when the IKE protocol
    /// exception carried one.
    fn report_error(&self, apn: &str, err: &IwlanError, backoff: Option<Duration>);

    /// Reports that `network` did or did not respond, used when a timeout-class error fires
    /// while the carrier config asks for connectivity validation.
    fn report_network_connectivity(&self, network: NetworkHandle, is_connected: bool);
}

/// Discards everything; used where no external error-policy collaborator is wired up (e.g.
/// tests).
#[derive(Default)]
pub struct NoopErrorPolicyReporter;

impl ErrorPolicyReporter for NoopErrorPolicyReporter {
    fn report_error(&self, _apn: &str, _err: &IwlanError, _backoff: Option<Duration>) {}
    fn report_network_connectivity(&self, _network: NetworkHandle, _is_connected: bool) {}
}
