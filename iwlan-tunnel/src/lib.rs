//! Drives per-APN IKE/IPsec tunnel lifecycles against the external IKE engine collaborator:
//! serialized bring-up, candidate iteration on failure, emergency/normal ePDG affinity,
//! network mobility, and liveness checks.

pub mod config_table;
pub mod error_policy;
pub mod ike;
pub mod manager;
pub mod monitor;
pub mod state_machine;
pub mod token;

pub use config_table::{TunnelConfig, TunnelConfigTable};
pub use error_policy::{ErrorPolicyReporter, NoopErrorPolicyReporter};
pub use ike::{
    ChildSessionParams, IkeEngine, IkeSession, IkeSessionCallbacks, IkeSessionParams,
    LivenessStatus, MobilityOptions, NetworkHandle,
};
pub use manager::EpdgTunnelManager;
pub use monitor::EpdgMonitor;
pub use state_machine::ApnState;
pub use token::TokenTable;
