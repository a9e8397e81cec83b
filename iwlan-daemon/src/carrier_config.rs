//! A file-backed `CarrierConfig`: the on-device equivalent of the carrier-pushed key/value
//! store `iwlan-selector` and `iwlan-tunnel` read through the `CarrierConfig` trait. Keys are
//! snake_case TOML table entries; absent or mistyped keys fall through to the trait's own
//! documented defaults rather than erroring, exactly as §6.3 specifies.

use std::path::Path;

use anyhow::Context as _;
use iwlan_types::{CarrierConfig, CarrierConfigKey};
use toml::Value;

fn key_name(key: CarrierConfigKey) -> &'static str {
    match key {
        CarrierConfigKey::EpdgAddressPriority => "epdg_address_priority",
        CarrierConfigKey::EpdgPlmnPriority => "epdg_plmn_priority",
        CarrierConfigKey::EpdgStaticAddress => "epdg_static_address",
        CarrierConfigKey::EpdgStaticAddressRoaming => "epdg_static_address_roaming",
        CarrierConfigKey::MccMncs => "mcc_mncs",
        CarrierConfigKey::EpdgAddressIpTypePreference => "epdg_address_ip_type_preference",
        CarrierConfigKey::EpdgPcoIdIpv4 => "epdg_pco_id_ipv4",
        CarrierConfigKey::EpdgPcoIdIpv6 => "epdg_pco_id_ipv6",
        CarrierConfigKey::IkeRekeyHardTimerSec => "ike_rekey_hard_timer_sec",
        CarrierConfigKey::IkeRekeySoftTimerSec => "ike_rekey_soft_timer_sec",
        CarrierConfigKey::ChildSaRekeyHardTimerSec => "child_sa_rekey_hard_timer_sec",
        CarrierConfigKey::ChildSaRekeySoftTimerSec => "child_sa_rekey_soft_timer_sec",
        CarrierConfigKey::NattKeepAliveTimerSec => "natt_keep_alive_timer_sec",
        CarrierConfigKey::DpdTimerSec => "dpd_timer_sec",
        CarrierConfigKey::RetransmitTimerMsec => "retransmit_timer_msec",
        CarrierConfigKey::KeyDistinctEpdgForEmergencyAllowed => {
            "key_distinct_epdg_for_emergency_allowed"
        }
        CarrierConfigKey::KeyValidateUnderlyingNetworkOnNoResponse => {
            "key_validate_underlying_network_on_no_response"
        }
        CarrierConfigKey::KeyIkeDeviceIdentitySupported => "key_ike_device_identity_supported",
    }
}

/// Read-only view over a carrier config TOML table, parsed once at load time.
pub struct TomlCarrierConfig {
    table: toml::value::Table,
}

impl TomlCarrierConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading carrier config {}", path.display()))?;
        let table = raw
            .parse::<Value>()
            .with_context(|| format!("parsing carrier config {}", path.display()))?
            .as_table()
            .cloned()
            .with_context(|| "carrier config must be a TOML table at the top level")?;
        Ok(Self { table })
    }

    /// An empty config; every accessor falls back to its documented default.
    pub fn empty() -> Self {
        Self { table: toml::value::Table::new() }
    }
}

impl CarrierConfig for TomlCarrierConfig {
    fn get_int(&self, key: CarrierConfigKey) -> Option<i64> {
        self.table.get(key_name(key))?.as_integer()
    }

    fn get_int_array(&self, key: CarrierConfigKey) -> Option<Vec<i64>> {
        self.table
            .get(key_name(key))?
            .as_array()?
            .iter()
            .map(Value::as_integer)
            .collect()
    }

    fn get_string(&self, key: CarrierConfigKey) -> Option<String> {
        self.table.get(key_name(key))?.as_str().map(str::to_string)
    }

    fn get_string_array(&self, key: CarrierConfigKey) -> Option<Vec<String>> {
        self.table
            .get(key_name(key))?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    fn get_bool(&self, key: CarrierConfigKey) -> Option<bool> {
        self.table.get(key_name(key))?.as_bool()
    }
}
