//! Caller facing entry point.
//!
//! [`Wifi`] resolves interface identifiers (see
//! [`crate::interface::resolve_interface`]) and forwards to the control
//! client, the reconciler, the radio tool or a fresh event monitor.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> wlanctl::Result<()> {
//! use wlanctl::{ConnectOptions, Wifi};
//!
//! let wifi = Wifi::wpa_cli();
//! let persisted = wifi
//!     .connect("wlan0", "HomeNet", Some("password123"), ConnectOptions::default())
//!     .await?;
//! println!("saved: {persisted}, state: {}", wifi.state("wlan0").await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tracing::{debug, info};

use crate::config::ControlConfig;
use crate::control::{ControlClient, ControlTransport, WpaCli};
use crate::error::Result;
use crate::exec;
use crate::interface::resolve_interface;
use crate::iw;
use crate::monitor::{EventMonitor, MonitorOptions};
use crate::parse::{ConnectionState, LinkState, Mode, NetworkProfile, ScanCell, StatusRecord};
use crate::reconcile::{ConnectOptions, NetworkReconciler, Reconciled};

pub struct Wifi<T = WpaCli> {
    reconciler: NetworkReconciler<T>,
}

impl Wifi<WpaCli> {
    pub fn wpa_cli() -> Self {
        Wifi::new(ControlClient::wpa_cli())
    }

    pub fn from_config(config: &ControlConfig) -> Self {
        Wifi::new(ControlClient::new(config.transport()))
    }
}

impl<T: ControlTransport> Wifi<T> {
    pub fn new(client: ControlClient<T>) -> Self {
        Wifi {
            reconciler: NetworkReconciler::new(client),
        }
    }

    pub fn client(&self) -> &ControlClient<T> {
        self.reconciler.client()
    }

    pub fn reconciler(&self) -> &NetworkReconciler<T> {
        &self.reconciler
    }

    pub async fn status(&self, iface: &str) -> Result<StatusRecord> {
        let iface = resolve_interface(iface).await?;
        self.client().status(&iface).await
    }

    pub async fn state(&self, iface: &str) -> Result<LinkState> {
        Ok(self.status(iface).await?.link_state())
    }

    pub async fn mode(&self, iface: &str) -> Result<Mode> {
        Ok(self.status(iface).await?.mode())
    }

    pub async fn connection_state(&self, iface: &str) -> Result<ConnectionState> {
        Ok(self.status(iface).await?.connection_state())
    }

    /// Scan through the supplicant: trigger, then read its scan cache.
    pub async fn scan(&self, iface: &str) -> Result<Vec<ScanCell>> {
        let iface = resolve_interface(iface).await?;
        let cells = self.client().scan(&iface).await?;
        debug!("Found {} cells at {}", cells.len(), iface);
        Ok(cells)
    }

    /// The supplicant's scan cache, without triggering a scan.
    pub async fn scan_results(&self, iface: &str) -> Result<Vec<ScanCell>> {
        let iface = resolve_interface(iface).await?;
        self.client().scan_results(&iface).await
    }

    /// Scan through the radio tool, with channel and security per cell.
    pub async fn radio_scan(&self, iface: &str) -> Result<Vec<ScanCell>> {
        let iface = resolve_interface(iface).await?;
        let cells = iw::scan(&iface).await?;
        debug!("Found {} wireless cells at {}", cells.len(), iface);
        Ok(cells)
    }

    pub async fn list_networks(&self, iface: &str) -> Result<Vec<NetworkProfile>> {
        let iface = resolve_interface(iface).await?;
        self.client().list_networks(&iface).await
    }

    pub async fn find_network_by_ssid(&self, iface: &str, ssid: &str) -> Result<Option<NetworkProfile>> {
        let iface = resolve_interface(iface).await?;
        self.reconciler.find_network_by_ssid(&iface, ssid).await
    }

    /// Configures and selects `ssid`. Returns whether the supplicant saved
    /// its configuration.
    pub async fn connect(
        &self,
        iface: &str,
        ssid: &str,
        credential: Option<&str>,
        options: ConnectOptions,
    ) -> Result<bool> {
        Ok(self.add_or_update_network(iface, ssid, credential, options).await?.persisted)
    }

    pub async fn add_or_update_network(
        &self,
        iface: &str,
        ssid: &str,
        credential: Option<&str>,
        options: ConnectOptions,
    ) -> Result<Reconciled> {
        let iface = resolve_interface(iface).await?;
        self.reconciler
            .add_or_update_network(&iface, ssid, credential, options)
            .await
    }

    pub async fn disconnect(&self, iface: &str) -> Result<String> {
        let iface = resolve_interface(iface).await?;
        self.client().disconnect(&iface).await
    }

    pub async fn remove_network(&self, iface: &str, ssid: &str) -> Result<Option<String>> {
        let iface = resolve_interface(iface).await?;
        self.reconciler.remove_network(&iface, ssid).await
    }

    pub async fn enable_network(&self, iface: &str, ssid: &str) -> Result<Option<String>> {
        let iface = resolve_interface(iface).await?;
        self.reconciler.enable_network(&iface, ssid).await
    }

    pub async fn disable_network(&self, iface: &str, ssid: &str) -> Result<Option<String>> {
        let iface = resolve_interface(iface).await?;
        self.reconciler.disable_network(&iface, ssid).await
    }

    pub async fn select_network(&self, iface: &str, ssid: &str) -> Result<Option<String>> {
        let iface = resolve_interface(iface).await?;
        self.reconciler.select_network(&iface, ssid).await
    }

    pub async fn reload_configuration(&self, iface: &str) -> Result<String> {
        let iface = resolve_interface(iface).await?;
        self.client().reconfigure(&iface).await
    }

    pub async fn save_configuration(&self, iface: &str) -> Result<String> {
        let iface = resolve_interface(iface).await?;
        self.client().save_config(&iface).await
    }

    /// Opens a dedicated monitor session on the resolved interface.
    pub async fn monitor(&self, iface: &str, options: MonitorOptions) -> Result<EventMonitor> {
        let iface = resolve_interface(iface).await?;
        EventMonitor::open(&iface, options)
    }

    pub async fn up(&self, iface: &str) -> Result<()> {
        set_link(&resolve_interface(iface).await?, "up").await
    }

    pub async fn down(&self, iface: &str) -> Result<()> {
        set_link(&resolve_interface(iface).await?, "down").await
    }

    /// Takes the link down, waits `delay`, brings it back up.
    pub async fn reset(&self, iface: &str, delay: Duration) -> Result<()> {
        let iface = resolve_interface(iface).await?;
        set_link(&iface, "down").await?;
        tokio::time::sleep(delay).await;
        set_link(&iface, "up").await?;
        info!("Reset {}", iface);
        Ok(())
    }
}

async fn set_link(iface: &str, state: &str) -> Result<()> {
    debug!("set {} {}", iface, state);
    exec::run("ip", &["link", "set", iface, state]).await?;
    Ok(())
}
