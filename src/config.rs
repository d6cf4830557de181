use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::WpaCli;
use crate::monitor::MonitorOptions;
use crate::reconcile::AuthHint;

/// Interface used when neither `-i` nor `default_interface` is given.
pub const FALLBACK_INTERFACE: &str = "wlan0";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub default_interface: Option<String>,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub ap: ApConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NetworkConfig {
    pub ssid: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthHint>,
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Control program, `wpa_cli` unless overridden
    pub program: String,
    pub command_timeout_secs: u64,
    pub close_timeout_secs: u64,
    pub prompt: String,
    pub channel_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            program: "wpa_cli".to_string(),
            command_timeout_secs: 10,
            close_timeout_secs: 5,
            prompt: ">".to_string(),
            channel_capacity: 64,
        }
    }
}

impl ControlConfig {
    pub fn transport(&self) -> WpaCli {
        WpaCli::new(&self.program, Duration::from_secs(self.command_timeout_secs))
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            program: self.program.clone(),
            prompt: self.prompt.clone(),
            close_timeout: Duration::from_secs(self.close_timeout_secs),
            capacity: self.channel_capacity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApConfig {
    /// systemd unit running the AP daemon
    pub service: String,
}

impl Default for ApConfig {
    fn default() -> Self {
        ApConfig {
            service: "create_ap".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Config::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn find_network(&self, ssid: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.ssid == ssid)
    }

    pub fn add_network(&mut self, network: NetworkConfig) {
        // Remove existing entry with same SSID
        self.networks.retain(|n| n.ssid != network.ssid);
        self.networks.push(network);
    }

    /// `-i` wins over the configured default, which wins over `wlan0`.
    pub fn interface<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_interface.as_deref())
            .unwrap_or(FALLBACK_INTERFACE)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?;
    Ok(config_dir.join("wlanctl").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.control.program, "wpa_cli");
        assert_eq!(cfg.ap.service, "create_ap");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.default_interface = Some("wlan1".into());
        cfg.add_network(NetworkConfig {
            ssid: "HomeNet".into(),
            password: Some("old".into()),
            auth: None,
            interface: None,
        });
        cfg.add_network(NetworkConfig {
            ssid: "HomeNet".into(),
            password: Some("new".into()),
            auth: Some(AuthHint::Wep),
            interface: Some("wlan1".into()),
        });
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.networks.len(), 1);
        assert_eq!(
            loaded.find_network("HomeNet").and_then(|n| n.password.as_deref()),
            Some("new")
        );
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let cfg: Config = toml::from_str(
            "default_interface = \"wlan2\"\n[control]\ncommand_timeout_secs = 3\n",
        )
        .unwrap();
        assert_eq!(cfg.control.command_timeout_secs, 3);
        assert_eq!(cfg.control.close_timeout_secs, 5);
        assert_eq!(cfg.control.monitor_options().close_timeout, Duration::from_secs(5));
        assert_eq!(cfg.interface(None), "wlan2");
        assert_eq!(cfg.interface(Some("wlan9")), "wlan9");
        assert_eq!(Config::default().interface(None), FALLBACK_INTERFACE);
    }
}
