//! Thin process entry point: parses CLI args, sets up the global tracing subscriber, loads the
//! bootstrap and carrier configs from disk, and drives one [`Daemon`] until a termination
//! signal arrives. Mirrors the teacher's `linux-client` binary: a small `main` that wires
//! collaborators together and then blocks on signal handling, with all real logic living in a
//! library crate (`iwlan_daemon::wiring::Daemon`, `iwlan-selector`, `iwlan-tunnel`).

use std::future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::Poll;

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::signal::unix::SignalKind;

use iwlan_daemon::{BootstrapConfig, Daemon};
use iwlan_tunnel::NetworkHandle;
use iwlan_types::{NetworkValidationState, TunnelCallback, TunnelLinkProperties, TunnelSetupRequest};

/// CLI args for the standalone daemon. In production these would be supplied by the service
/// manager that owns the SIM slot / underlying network this process is scoped to.
#[derive(Parser, Debug)]
#[command(name = "iwlan-daemon", about = "ePDG selection and IKE/IPsec tunnel manager")]
struct Cli {
    /// Path to the bootstrap TOML (carrier config location, log directory).
    #[arg(long, env = "IWLAN_BOOTSTRAP_CONFIG")]
    bootstrap_config: PathBuf,

    /// Local addresses the underlying network currently advertises, used by the built-in
    /// `NetworkProbe` in lieu of a platform link-properties API (out of scope per §1).
    #[arg(long = "local-address", value_name = "ADDR")]
    local_addresses: Vec<IpAddr>,
}

struct LoggingTunnelCallback {
    apn: String,
}

impl TunnelCallback for LoggingTunnelCallback {
    fn on_opened(&self, apn: &str, props: &TunnelLinkProperties) {
        tracing::info!(apn, ifname = %props.iface_name, "tunnel opened");
    }

    fn on_closed(&self, apn: &str, err: &iwlan_types::IwlanError) {
        tracing::info!(apn, %err, "tunnel closed");
    }

    fn on_network_validation_status_changed(&self, apn: &str, state: NetworkValidationState) {
        tracing::info!(apn, ?state, "network validation status changed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let bootstrap = BootstrapConfig::load(&cli.bootstrap_config)?;
    iwlan_daemon::logging::setup_global_subscriber(bootstrap.log_dir.as_deref())
        .context("setting up logging")?;

    tracing::info!(?bootstrap, "starting iwlan-daemon");

    let daemon = Daemon::new(&bootstrap.carrier_config_path, cli.local_addresses)
        .context("constructing daemon")?;
    daemon.update_network(Some(NetworkHandle(1)), true);

    // Demonstrates the wiring end to end: bring up the "ims" APN once the network is set, and
    // log its lifecycle. A real embedding process would call `bring_up_tunnel` per its own
    // radio/attach signals instead.
    let request = TunnelSetupRequest {
        apn: "ims".to_string(),
        protocol: iwlan_types::Protocol::Ipv4v6,
        is_roaming: false,
        is_emergency: false,
        request_pcscf: true,
        pdu_session_id: 0,
        src_ipv4: None,
        src_ipv6: None,
    };
    let callback = Arc::new(LoggingTunnelCallback { apn: request.apn.clone() });
    if !daemon.bring_up_tunnel(request, callback) {
        tracing::warn!("initial bring-up was rejected by admission control");
    }

    let mut sigint = tokio::signal::unix::signal(SignalKind::interrupt())?;
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;

    future::poll_fn(|cx| {
        if sigint.poll_recv(cx).is_ready() {
            tracing::info!("received SIGINT, shutting down");
            return Poll::Ready(());
        }
        if sigterm.poll_recv(cx).is_ready() {
            tracing::info!("received SIGTERM, shutting down");
            return Poll::Ready(());
        }
        Poll::Pending
    })
    .await;

    daemon.shutdown();
    Ok(())
}
