//! Service manager glue for access point mode.
//!
//! The AP daemon (`create_ap` by default) runs as a systemd unit started
//! with `--config <file>`. [`ApControl`] starts and stops that unit and
//! rewrites its properties file. The unit name is always passed in
//! explicitly, usually from the `[ap]` section of the config file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, WifiError};

#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Human readable status text.
    async fn status(&self, service: &str) -> Result<String>;
    async fn start(&self, service: &str) -> Result<()>;
    async fn stop(&self, service: &str) -> Result<()>;
    async fn enable(&self, service: &str) -> Result<()>;
    async fn disable(&self, service: &str) -> Result<()>;
    async fn is_active(&self, service: &str) -> Result<bool>;
    async fn is_enabled(&self, service: &str) -> Result<bool>;
    /// Path of the unit file, `None` when the unit is not installed.
    async fn unit_file(&self, service: &str) -> Result<Option<PathBuf>>;
}

/// [`ServiceManager`] backed by `systemctl`.
#[derive(Debug, Clone, Default)]
pub struct Systemctl;

impl Systemctl {
    /// Runs systemctl and returns (exit success, stdout, stderr). Several verbs
    /// answer through their exit code, so a failure is not an error here.
    async fn systemctl(&self, args: &[&str]) -> Result<(bool, String, String)> {
        debug!("$ systemctl {}", args.join(" "));
        let output = Command::new("systemctl")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| WifiError::Transport(format!("Failed to execute systemctl: {}", e)))?;
        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }

    async fn verb(&self, verb: &str, service: &str) -> Result<()> {
        let (ok, stdout, stderr) = self.systemctl(&[verb, service]).await?;
        if !ok {
            return Err(WifiError::Service {
                service: service.to_string(),
                message: format!("{} failed: {}", verb, if stderr.is_empty() { stdout } else { stderr }),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn status(&self, service: &str) -> Result<String> {
        let (_, stdout, _) = self.systemctl(&["status", "--no-pager", service]).await?;
        Ok(stdout)
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.verb("start", service).await
    }

    async fn stop(&self, service: &str) -> Result<()> {
        self.verb("stop", service).await
    }

    async fn enable(&self, service: &str) -> Result<()> {
        self.verb("enable", service).await
    }

    async fn disable(&self, service: &str) -> Result<()> {
        self.verb("disable", service).await
    }

    async fn is_active(&self, service: &str) -> Result<bool> {
        let (_, stdout, _) = self.systemctl(&["is-active", service]).await?;
        Ok(stdout == "active")
    }

    async fn is_enabled(&self, service: &str) -> Result<bool> {
        let (_, stdout, _) = self.systemctl(&["is-enabled", service]).await?;
        Ok(stdout == "enabled")
    }

    async fn unit_file(&self, service: &str) -> Result<Option<PathBuf>> {
        let (_, stdout, _) = self
            .systemctl(&["show", "-p", "FragmentPath", "--value", service])
            .await?;
        Ok((!stdout.is_empty()).then(|| PathBuf::from(stdout)))
    }
}

/// Settings of the AP daemon, rendered into its properties file by
/// [`ApOptions::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApOptions {
    pub channel: String,
    pub gateway: String,
    pub wpa_version: u8,
    pub etc_hosts: bool,
    pub dhcp_dns: String,
    pub dns: bool,
    pub dnsmasq: bool,
    pub hidden: bool,
    pub mac_filter: bool,
    pub mac_filter_accept: String,
    pub isolate_clients: bool,
    /// Defaults to `nat` with an internet interface, `none` without.
    pub share_method: Option<String>,
    pub ieee80211n: bool,
    pub ieee80211ac: bool,
    pub ht_capab: String,
    pub vht_capab: String,
    pub driver: String,
    pub virt: bool,
    pub country: String,
    pub freq_band: String,
    pub new_macaddr: String,
    pub daemonize: bool,
    pub haveged: bool,
    pub iface: String,
    pub iface_internet: Option<String>,
    pub ssid: String,
    pub passphrase: String,
    pub use_psk: bool,
}

impl Default for ApOptions {
    fn default() -> Self {
        ApOptions {
            channel: "default".to_string(),
            gateway: "10.1.1.1".to_string(),
            wpa_version: 2,
            etc_hosts: false,
            dhcp_dns: "gateway".to_string(),
            dns: true,
            dnsmasq: true,
            hidden: false,
            mac_filter: false,
            mac_filter_accept: "/etc/hostapd/hostapd.accept".to_string(),
            isolate_clients: false,
            share_method: None,
            ieee80211n: false,
            ieee80211ac: false,
            ht_capab: "[HT40+]".to_string(),
            vht_capab: String::new(),
            driver: "nl80211".to_string(),
            virt: false,
            country: String::new(),
            freq_band: "2.4".to_string(),
            new_macaddr: String::new(),
            daemonize: false,
            haveged: true,
            iface: "wlan0".to_string(),
            iface_internet: None,
            ssid: "MyAccessPoint".to_string(),
            passphrase: "12345678".to_string(),
            use_psk: false,
        }
    }
}

impl ApOptions {
    pub fn new(ssid: impl Into<String>) -> Self {
        ApOptions {
            ssid: ssid.into(),
            ..Default::default()
        }
    }

    /// Renders the options as `KEY=VALUE` properties: booleans become
    /// `1`/`0` and the `dns`, `dnsmasq`, `virt`, `haveged` switches are
    /// written inverted as `NO_*`.
    pub fn normalize(&self) -> Vec<(String, String)> {
        let flag = |b: bool| (if b { "1" } else { "0" }).to_string();
        let internet = self.iface_internet.clone().unwrap_or_default();
        let share_method = self.share_method.clone().unwrap_or_else(|| {
            (if internet.is_empty() { "none" } else { "nat" }).to_string()
        });

        [
            ("CHANNEL", self.channel.clone()),
            ("GATEWAY", self.gateway.clone()),
            ("WPA_VERSION", self.wpa_version.to_string()),
            ("ETC_HOSTS", flag(self.etc_hosts)),
            ("DHCP_DNS", self.dhcp_dns.clone()),
            ("NO_DNS", flag(!self.dns)),
            ("NO_DNSMASQ", flag(!self.dnsmasq)),
            ("HIDDEN", flag(self.hidden)),
            ("MAC_FILTER", flag(self.mac_filter)),
            ("MAC_FILTER_ACCEPT", self.mac_filter_accept.clone()),
            ("ISOLATE_CLIENTS", flag(self.isolate_clients)),
            ("SHARE_METHOD", share_method),
            ("IEEE80211N", flag(self.ieee80211n)),
            ("IEEE80211AC", flag(self.ieee80211ac)),
            ("HT_CAPAB", self.ht_capab.clone()),
            ("VHT_CAPAB", self.vht_capab.clone()),
            ("DRIVER", self.driver.clone()),
            ("NO_VIRT", flag(!self.virt)),
            ("COUNTRY", self.country.clone()),
            ("FREQ_BAND", self.freq_band.clone()),
            ("NEW_MACADDR", self.new_macaddr.clone()),
            ("DAEMONIZE", flag(self.daemonize)),
            ("NO_HAVEGED", flag(!self.haveged)),
            ("WIFI_IFACE", self.iface.clone()),
            ("INTERNET_IFACE", internet),
            ("SSID", self.ssid.clone()),
            ("PASSPHRASE", self.passphrase.clone()),
            ("USE_PSK", flag(self.use_psk)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Finds the `--config <path>` argument in a unit file.
pub fn find_config_path(unit: &str) -> Option<PathBuf> {
    let (_, rest) = unit.split_once("--config ")?;
    let rest = rest.trim_start();
    let path = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split(|c: char| c.is_whitespace() || c == '"').next()?,
    };
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Parses `KEY=VALUE` lines, skipping blanks and `#` comments.
pub fn parse_props(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Overwrites existing keys in place and appends the new ones.
pub fn merge_props(props: &mut Vec<(String, String)>, updates: Vec<(String, String)>) {
    for (key, value) in updates {
        match props.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(entry) => entry.1 = value,
            None => props.push((key, value)),
        }
    }
}

pub fn render_props(props: &[(String, String)]) -> String {
    props.iter().map(|(k, v)| format!("{k}={v}\n")).collect()
}

/// Access point control over one service unit.
pub struct ApControl<M = Systemctl> {
    service: String,
    manager: M,
}

impl ApControl<Systemctl> {
    pub fn systemd(service: impl Into<String>) -> Self {
        ApControl::new(service, Systemctl)
    }
}

impl<M: ServiceManager> ApControl<M> {
    pub fn new(service: impl Into<String>, manager: M) -> Self {
        ApControl {
            service: service.into(),
            manager,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Rewrites the properties file the unit was started with.
    ///
    /// Fails when the unit is not installed or does not use `--config`.
    pub async fn configure(&self, options: &ApOptions) -> Result<PathBuf> {
        let unit = self
            .manager
            .unit_file(&self.service)
            .await?
            .ok_or_else(|| self.error("is not installed properly"))?;
        let unit_content = tokio::fs::read_to_string(&unit).await?;
        let config = find_config_path(&unit_content)
            .ok_or_else(|| self.error("is not started with --config"))?;

        let mut props = read_props(&config).await?;
        merge_props(&mut props, options.normalize());
        tokio::fs::write(&config, render_props(&props)).await?;

        info!(service = %self.service, path = %config.display(), "AP configuration written");
        Ok(config)
    }

    /// Starts the unit, writing `options` into its config first if given.
    pub async fn start(&self, options: Option<&ApOptions>) -> Result<()> {
        if let Some(options) = options {
            self.configure(options).await?;
        }
        self.manager.start(&self.service).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.manager.stop(&self.service).await
    }

    pub async fn status(&self) -> Result<String> {
        self.manager.status(&self.service).await
    }

    pub async fn enable(&self) -> Result<()> {
        self.manager.enable(&self.service).await
    }

    pub async fn disable(&self) -> Result<()> {
        self.manager.disable(&self.service).await
    }

    pub async fn is_active(&self) -> Result<bool> {
        self.manager.is_active(&self.service).await
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        self.manager.is_enabled(&self.service).await
    }

    fn error(&self, message: &str) -> WifiError {
        WifiError::Service {
            service: self.service.clone(),
            message: message.to_string(),
        }
    }
}

async fn read_props(path: &Path) -> Result<Vec<(String, String)>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(parse_props(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
