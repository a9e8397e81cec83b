//! The error-policy / network-connectivity-reporting collaborator (§7), backed by structured
//! logging. No metrics/telemetry backend is implemented — that is out of scope per the
//! Non-goals — but the logging layer itself is not optional, matching §10.1/§10.2.

use std::time::Duration;

use iwlan_tunnel::{ErrorPolicyReporter, NetworkHandle};
use iwlan_types::IwlanError;

#[derive(Default)]
pub struct TracingErrorPolicyReporter;

impl ErrorPolicyReporter for TracingErrorPolicyReporter {
    fn report_error(&self, apn: &str, err: &IwlanError, backoff: Option<Duration>) {
        match backoff {
            Some(backoff) => {
                tracing::warn!(apn, %err, backoff_secs = backoff.as_secs(), "tunnel error reported");
            }
            None => tracing::warn!(apn, %err, "tunnel error reported"),
        }
    }

    fn report_network_connectivity(&self, network: NetworkHandle, is_connected: bool) {
        tracing::warn!(?network, is_connected, "network connectivity report");
    }
}
