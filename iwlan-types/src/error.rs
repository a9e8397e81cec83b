use thiserror::Error;

/// Unified error taxonomy reported to callers and to the error-policy collaborator.
///
/// Variants carry enough structure for callers to `match` on them directly; this is not a
/// string-wrapping error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IwlanError {
    #[error("no error")]
    NoError,
    #[error("SIM is not ready")]
    SimNotReady,
    #[error("ePDG server selection failed")]
    EpdgSelectorServerSelectionFailed,
    #[error("an IPv6 ePDG address is required but the network has no routable IPv6 address")]
    EpdgAddressOnlyIpv6Allowed,
    #[error("an IPv4 ePDG address is required but the network has no routable IPv4 address")]
    EpdgAddressOnlyIpv4Allowed,
    #[error("IKE protocol exception: code {code}")]
    IkeProtocolException { code: i32, data: Vec<u8> },
    #[error("IKE internal exception: {cause}")]
    IkeInternalException { cause: String },
    #[error("underlying network was lost")]
    IkeNetworkLost,
    #[error("IKE session closed before child session opened")]
    IkeSessionClosedBeforeChildSessionOpened,
    #[error("IKE_INIT timed out")]
    IkeInitTimeout,
    #[error("IKE dead peer detection timed out")]
    IkeDpdTimeout,
    #[error("IKE mobility event timed out")]
    IkeMobilityTimeout,
    #[error("no tunnel found for this APN")]
    TunnelNotFound,
}

/// Classifies an `IwlanError` for the purposes of `ExclusionSet` updates (see the selector's
/// failure-handling rules). Only `Network` and `Protocol` classes cause an address to be
/// temporarily excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Network,
    Protocol,
    Internal,
}

impl IwlanError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::IkeInitTimeout | Self::IkeDpdTimeout | Self::IkeMobilityTimeout => {
                FailureClass::Network
            }
            Self::IkeProtocolException { .. } => FailureClass::Protocol,
            _ => FailureClass::Internal,
        }
    }

    /// Decodes a 3GPP backoff-timer notify payload: top 3 bits select a unit, bottom 5 bits
    /// are the value. Unit `0b111` means "deactivate" and reports no backoff.
    pub fn decode_backoff(notify_byte: u8) -> Option<std::time::Duration> {
        let unit = notify_byte >> 5;
        let value = u64::from(notify_byte & 0b0001_1111);
        let seconds = match unit {
            0b000 => value * 600,
            0b001 => value * 3600,
            0b010 => value * 36_000,
            0b011 => value * 2,
            0b100 => value * 30,
            0b101 => value * 60,
            0b110 => value * 3600,
            _ => return None,
        };
        Some(std::time::Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeouts_as_network() {
        assert_eq!(IwlanError::IkeInitTimeout.failure_class(), FailureClass::Network);
        assert_eq!(IwlanError::IkeDpdTimeout.failure_class(), FailureClass::Network);
        assert_eq!(IwlanError::IkeMobilityTimeout.failure_class(), FailureClass::Network);
    }

    #[test]
    fn classifies_protocol_exception() {
        let err = IwlanError::IkeProtocolException { code: 1, data: vec![] };
        assert_eq!(err.failure_class(), FailureClass::Protocol);
    }

    #[test]
    fn classifies_network_lost_as_internal() {
        assert_eq!(IwlanError::IkeNetworkLost.failure_class(), FailureClass::Internal);
    }

    #[test]
    fn deactivate_unit_reports_no_backoff() {
        let byte = 0b111_00001;
        assert_eq!(IwlanError::decode_backoff(byte), None);
    }

    #[test]
    fn decodes_minutes_unit() {
        // unit 0b101 = 1 minute, value 5 -> 300s
        let byte = 0b101_00101;
        assert_eq!(
            IwlanError::decode_backoff(byte),
            Some(std::time::Duration::from_secs(300))
        );
    }
}
