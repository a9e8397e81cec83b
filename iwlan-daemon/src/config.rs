//! The daemon's own bootstrap file: where to find the carrier config and where to log.
//! Deliberately tiny — everything else the manager needs comes from `CarrierConfig` keys.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Path to the TOML-encoded carrier config pushed by the embedding process.
    pub carrier_config_path: PathBuf,
    /// Directory to additionally mirror logs into; stdout logging always happens regardless.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl BootstrapConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading bootstrap config {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("parsing bootstrap config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_bootstrap_config() {
        let toml = r#"
            carrier_config_path = "/etc/iwlan/carrier.toml"
        "#;
        let cfg: BootstrapConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.carrier_config_path, PathBuf::from("/etc/iwlan/carrier.toml"));
        assert_eq!(cfg.log_dir, None);
    }
}
