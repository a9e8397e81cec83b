//! Per-APN tunnel state. `IDLE -> RESOLVING -> CONNECTING -> OPEN -> CLOSING -> IDLE`, with
//! `FAILED` a terminal state the manager reports from and immediately collapses back to
//! `IDLE`.

use std::net::IpAddr;

use iwlan_types::TunnelSetupRequest;

#[derive(Debug, Clone)]
pub enum ApnState {
    Idle,
    Resolving {
        token: u64,
        request: TunnelSetupRequest,
    },
    Connecting {
        token: u64,
        request: TunnelSetupRequest,
        bound_epdg: IpAddr,
    },
    Open {
        token: u64,
        bound_epdg: IpAddr,
    },
    Closing {
        token: u64,
        force: bool,
    },
}

impl ApnState {
    pub fn token(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Resolving { token, .. }
            | Self::Connecting { token, .. }
            | Self::Open { token, .. }
            | Self::Closing { token, .. } => Some(*token),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Resolving { .. } => "RESOLVING",
            Self::Connecting { .. } => "CONNECTING",
            Self::Open { .. } => "OPEN",
            Self::Closing { .. } => "CLOSING",
        }
    }
}
