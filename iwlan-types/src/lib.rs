//! Shared data model for the ePDG selector and tunnel manager: PLMN/FQDN inputs, candidate
//! address bookkeeping, the error taxonomy, and the caller-facing tunnel types.

pub mod address;
pub mod carrier;
pub mod error;
pub mod plmn;
pub mod tunnel;

pub use address::{AddressFilter, AddressOrder, AddressSource, CandidateAddress};
pub use carrier::{CarrierConfig, CarrierConfigKey, FeatureFlags};
pub use error::{FailureClass, IwlanError};
pub use plmn::{CellIdentity, Plmn, PlmnSource};
pub use tunnel::{
    LinkAddress, NetworkValidationState, Protocol, TunnelCallback, TunnelLinkProperties,
    TunnelSetupRequest,
};
