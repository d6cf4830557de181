//! Supplicant control library for Linux WiFi interfaces
//!
//! This library drives wpa_supplicant through its `wpa_cli` control
//! program: it sends commands and parses their replies, watches the
//! supplicant's event stream, and reconciles a desired network (SSID,
//! credential, auth mode) against the profiles the supplicant already has.
//!
//! # Modules
//!
//! - [`config`] - Configuration file (saved networks, control program, AP unit)
//! - [`control`] - Request/response client for the control interface
//! - [`error`] - Error type of the library
//! - [`events`] - Classification of unsolicited control events
//! - [`interface`] - Interface discovery and identifier resolution
//! - [`iw`] - Parsers for the `iw` radio tool
//! - [`lifecycle`] - Monitor session state machine
//! - [`monitor`] - Background event monitor
//! - [`parse`] - Reply parsers and the records they produce
//! - [`reconcile`] - Add-or-update of network profiles
//! - [`service`] - Service manager and access point unit control
//! - [`wifi`] - Facade tying the above together
//!
//! # Example Usage
//!
//! ```no_run
//! # async fn demo() -> wlanctl::Result<()> {
//! use wlanctl::{ConnectOptions, Wifi};
//!
//! let wifi = Wifi::wpa_cli();
//! wifi.connect("wlan0", "HomeNet", Some("password123"), ConnectOptions::default())
//!     .await?;
//!
//! let status = wifi.status("wlan0").await?;
//! println!("State: {:?}", status.wpa_state());
//! # Ok(())
//! # }
//! ```

/// Configuration module for saved networks and control settings.
/// Reads and writes the TOML config file.
pub mod config;

/// Control client issuing one command per call and checking for `FAIL`.
pub mod control;

/// Error module defining the library's error type with `thiserror`.
pub mod error;

/// Pure classification of monitor output into typed notifications.
pub mod events;

mod exec;

/// Interface module for WiFi adapter discovery and identifier resolution.
pub mod interface;

/// `iw dev` and `iw dev <iface> scan` parsers.
pub mod iw;

pub mod lifecycle;

/// Event monitor running `wpa_cli` in interactive mode.
pub mod monitor;

/// Parsers for status, network list and scan result replies.
pub mod parse;

/// Network reconciliation: find or create a profile, then apply it.
pub mod reconcile;

/// systemd service control for access point mode.
pub mod service;

pub mod wifi;

pub use control::{ControlClient, ControlTransport, WpaCli};

pub use error::{Result, WifiError};

pub use events::{ControlEvent, EventKind, MonitorEvent};

pub use interface::{list_wifi_interfaces, resolve_interface, WifiInterface};

pub use monitor::{EventMonitor, MonitorOptions};

pub use parse::{ConnectionState, LinkState, Mode, NetworkProfile, ScanCell, StatusRecord, WpaState};

pub use reconcile::{AuthHint, ConnectOptions, NetworkReconciler, Reconciled};

pub use wifi::Wifi;
