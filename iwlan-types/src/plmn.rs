use std::fmt;

/// A Public Land Mobile Network identity: mobile country code plus mobile network code.
///
/// `mnc` is kept in its original 2- or 3-digit width; FQDN generation zero-pads it to 3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Plmn {
    mcc: String,
    mnc: String,
}

impl Plmn {
    /// Builds a `Plmn`, validating that `mcc` is exactly 3 digits and `mnc` is 2 or 3 digits.
    pub fn new(mcc: impl Into<String>, mnc: impl Into<String>) -> Option<Self> {
        let mcc = mcc.into();
        let mnc = mnc.into();
        let valid_mcc = mcc.len() == 3 && mcc.bytes().all(|b| b.is_ascii_digit());
        let valid_mnc =
            (mnc.len() == 2 || mnc.len() == 3) && mnc.bytes().all(|b| b.is_ascii_digit());
        if valid_mcc && valid_mnc {
            Some(Self { mcc, mnc })
        } else {
            None
        }
    }

    pub fn mcc(&self) -> &str {
        &self.mcc
    }

    pub fn mnc(&self) -> &str {
        &self.mnc
    }

    /// `mnc` zero-padded to 3 digits, as used in the 3GPP FQDN template.
    pub fn mnc_padded(&self) -> String {
        format!("{:0>3}", self.mnc)
    }

    /// `MCC-MNC` form used for allow-list matching.
    pub fn mcc_mnc(&self) -> String {
        format!("{}-{}", self.mcc, self.mnc)
    }
}

impl fmt::Display for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.mcc, self.mnc)
    }
}

/// Priority-ordered sources a selector walks when generating PLMN FQDNs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlmnSource {
    Rplmn,
    Hplmn,
    EhplmnFirst,
    EhplmnAll,
}

/// A registered cellular radio access technology, carrying the identifiers needed to build
/// a cellular-location FQDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellIdentity {
    GsmOrWcdma { plmn: Plmn, lac: u16 },
    Lte { plmn: Plmn, tac: u32 },
    Nr { plmn: Plmn, tac: u32 },
}

impl CellIdentity {
    pub fn plmn(&self) -> &Plmn {
        match self {
            Self::GsmOrWcdma { plmn, .. } | Self::Lte { plmn, .. } | Self::Nr { plmn, .. } => plmn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_mcc_and_mnc() {
        assert!(Plmn::new("31", "120").is_none());
        assert!(Plmn::new("311", "1").is_none());
        assert!(Plmn::new("31a", "120").is_none());
    }

    #[test]
    fn accepts_two_and_three_digit_mnc() {
        assert!(Plmn::new("311", "12").is_some());
        assert!(Plmn::new("311", "120").is_some());
    }

    #[test]
    fn pads_mnc_to_three_digits() {
        let plmn = Plmn::new("311", "12").unwrap();
        assert_eq!(plmn.mnc_padded(), "012");
    }

    #[test]
    fn mcc_mnc_display_form() {
        let plmn = Plmn::new("311", "120").unwrap();
        assert_eq!(plmn.mcc_mnc(), "311-120");
    }
}
