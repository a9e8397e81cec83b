//! Process entry point library for `iwlan-daemon`: CLI/bootstrap config loading, logging
//! setup, and the wiring that turns a `CarrierConfig` file plus a pluggable `IkeEngine` into a
//! running `EpdgTunnelManager`. The algorithmic work lives in `iwlan-selector` and
//! `iwlan-tunnel`; this crate is the thin binary that parses args, sets up logging, and drives
//! those libraries, mirroring the split between a platform client binary and its shared library.

pub mod carrier_config;
pub mod config;
pub mod ike_stub;
pub mod logging;
pub mod reporting;
pub mod wiring;

pub use carrier_config::TomlCarrierConfig;
pub use config::BootstrapConfig;
pub use ike_stub::LoggingIkeEngine;
pub use reporting::TracingErrorPolicyReporter;
pub use wiring::Daemon;
