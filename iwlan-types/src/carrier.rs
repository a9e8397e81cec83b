/// Recognized carrier configuration keys. Unknown keys encountered at runtime are tolerated
/// by callers of [`CarrierConfig`]; this enum only names the ones this crate interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarrierConfigKey {
    EpdgAddressPriority,
    EpdgPlmnPriority,
    EpdgStaticAddress,
    EpdgStaticAddressRoaming,
    MccMncs,
    EpdgAddressIpTypePreference,
    EpdgPcoIdIpv4,
    EpdgPcoIdIpv6,
    IkeRekeyHardTimerSec,
    IkeRekeySoftTimerSec,
    ChildSaRekeyHardTimerSec,
    ChildSaRekeySoftTimerSec,
    NattKeepAliveTimerSec,
    DpdTimerSec,
    RetransmitTimerMsec,
    KeyDistinctEpdgForEmergencyAllowed,
    KeyValidateUnderlyingNetworkOnNoResponse,
    KeyIkeDeviceIdentitySupported,
}

/// Platform feature-flag surface, separate from carrier-pushed configuration: these gate
/// behaviors the spec describes as conditional on "the feature flag is on" in addition to
/// whatever carrier config says, so a rollout can hold a behavior back even when carrier config
/// already asks for it.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    /// When off, a second setup-slot resolution request while one is already in flight is
    /// rejected immediately instead of being coalesced onto the in-flight one.
    pub prevent_exhaustion: bool,
    /// When off, `reportNetworkConnectivity` is never called regardless of carrier config.
    pub validate_network_on_no_response: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self { prevent_exhaustion: true, validate_network_on_no_response: true }
    }
}

/// Read-only typed view over carrier-pushed configuration. Implementations back this with
/// whatever storage the embedding process uses; this crate only needs the accessors.
///
/// Every accessor falls back to the documented default instead of panicking or erroring when
/// a key is absent or malformed.
pub trait CarrierConfig: Send + Sync {
    fn get_int(&self, key: CarrierConfigKey) -> Option<i64>;
    fn get_int_array(&self, key: CarrierConfigKey) -> Option<Vec<i64>>;
    fn get_string(&self, key: CarrierConfigKey) -> Option<String>;
    fn get_string_array(&self, key: CarrierConfigKey) -> Option<Vec<String>>;
    fn get_bool(&self, key: CarrierConfigKey) -> Option<bool>;

    /// NAT-T keepalive delay in seconds, clamped to `[0, 3600]`; falls back to `20` when the
    /// configured value is absent or out of range.
    fn natt_keep_alive_timer_sec(&self) -> u32 {
        match self.get_int(CarrierConfigKey::NattKeepAliveTimerSec) {
            Some(v) if (0..=3600).contains(&v) => v as u32,
            _ => 20,
        }
    }

    /// IKE retransmission schedule in milliseconds; falls back to a fixed six-entry default
    /// when the carrier value is absent or malformed.
    fn retransmit_timer_msec(&self) -> [u32; 6] {
        const DEFAULT: [u32; 6] = [500, 1000, 2000, 4000, 8000, 16000];
        match self.get_int_array(CarrierConfigKey::RetransmitTimerMsec) {
            Some(values) if values.len() == 6 => {
                let mut out = DEFAULT;
                for (slot, v) in out.iter_mut().zip(values) {
                    if v >= 0 {
                        *slot = v as u32;
                    }
                }
                out
            }
            _ => DEFAULT,
        }
    }

    fn distinct_epdg_for_emergency_allowed(&self) -> bool {
        self.get_bool(CarrierConfigKey::KeyDistinctEpdgForEmergencyAllowed)
            .unwrap_or(false)
    }

    fn validate_underlying_network_on_no_response(&self) -> bool {
        self.get_bool(CarrierConfigKey::KeyValidateUnderlyingNetworkOnNoResponse)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapConfig {
        ints: HashMap<CarrierConfigKey, i64>,
        int_arrays: HashMap<CarrierConfigKey, Vec<i64>>,
        bools: HashMap<CarrierConfigKey, bool>,
    }

    impl CarrierConfig for MapConfig {
        fn get_int(&self, key: CarrierConfigKey) -> Option<i64> {
            self.ints.get(&key).copied()
        }
        fn get_int_array(&self, key: CarrierConfigKey) -> Option<Vec<i64>> {
            self.int_arrays.get(&key).cloned()
        }
        fn get_string(&self, _key: CarrierConfigKey) -> Option<String> {
            None
        }
        fn get_string_array(&self, _key: CarrierConfigKey) -> Option<Vec<String>> {
            None
        }
        fn get_bool(&self, key: CarrierConfigKey) -> Option<bool> {
            self.bools.get(&key).copied()
        }
    }

    #[test]
    fn natt_timer_falls_back_when_out_of_range() {
        let mut cfg = MapConfig::default();
        cfg.ints.insert(CarrierConfigKey::NattKeepAliveTimerSec, 99999);
        assert_eq!(cfg.natt_keep_alive_timer_sec(), 20);
        cfg.ints.insert(CarrierConfigKey::NattKeepAliveTimerSec, 45);
        assert_eq!(cfg.natt_keep_alive_timer_sec(), 45);
    }

    #[test]
    fn retransmit_schedule_falls_back_on_wrong_length() {
        let mut cfg = MapConfig::default();
        cfg.int_arrays
            .insert(CarrierConfigKey::RetransmitTimerMsec, vec![1, 2, 3]);
        assert_eq!(cfg.retransmit_timer_msec(), [500, 1000, 2000, 4000, 8000, 16000]);
    }
}
