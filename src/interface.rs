use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, WifiError};
use crate::iw::{self, IwDevice};

/// Resolver token for the radio that is not on an external bus.
pub const ONBOARD: &str = "onboard";

/// Resolver token for the first USB radio.
pub const USB: &str = "usb";

#[derive(Debug, Clone, Serialize)]
pub struct WifiInterface {
    pub name: String,
    pub phy: u32,
    pub addr: Option<String>,
    pub is_usb: bool,
}

/// List all WiFi interfaces with a kernel netdev
pub async fn list_wifi_interfaces() -> Result<Vec<WifiInterface>> {
    let devices = iw::dev_list().await?;
    Ok(wifi_interfaces(devices, is_usb_interface))
}

fn wifi_interfaces(devices: Vec<IwDevice>, is_usb: impl Fn(&str) -> bool) -> Vec<WifiInterface> {
    devices
        .into_iter()
        .filter(|d| d.ifindex.is_some())
        .map(|d| WifiInterface {
            is_usb: is_usb(&d.iface),
            name: d.iface,
            phy: d.phy,
            addr: d.addr,
        })
        .collect()
}

/// Check if a network interface is USB-based by examining sysfs
fn is_usb_interface(interface_name: &str) -> bool {
    let device_path = format!("/sys/class/net/{}/device", interface_name);
    let path = Path::new(&device_path);

    if !path.exists() {
        return false;
    }

    // The device symlink points into the bus the radio hangs off
    if let Ok(resolved) = fs::canonicalize(path) {
        if let Some(resolved_str) = resolved.to_str() {
            if resolved_str.contains("usb") {
                return true;
            }
        }
    }

    let uevent_path = format!("{}/uevent", device_path);
    if let Ok(content) = fs::read_to_string(&uevent_path) {
        if content.contains("usb") {
            return true;
        }
    }

    false
}

/// What an interface identifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceRef {
    /// A kernel interface name, used verbatim.
    Name(String),
    /// `phyN` or `phy#N`.
    Phy(u32),
    Onboard,
    Usb,
}

impl InterfaceRef {
    pub fn parse(identifier: &str) -> InterfaceRef {
        let identifier = identifier.trim();
        if identifier == ONBOARD {
            return InterfaceRef::Onboard;
        }
        if identifier == USB {
            return InterfaceRef::Usb;
        }
        identifier
            .strip_prefix("phy")
            .map(|rest| rest.strip_prefix('#').unwrap_or(rest))
            .and_then(|idx| idx.parse().ok())
            .map(InterfaceRef::Phy)
            .unwrap_or_else(|| InterfaceRef::Name(identifier.to_string()))
    }

    /// Picks the matching netdev out of `interfaces`. Raw names never
    /// need a lookup.
    pub fn select(&self, interfaces: &[WifiInterface]) -> Option<String> {
        let found = match self {
            InterfaceRef::Name(name) => return Some(name.clone()),
            InterfaceRef::Phy(phy) => interfaces.iter().find(|i| i.phy == *phy),
            InterfaceRef::Onboard => interfaces.iter().find(|i| !i.is_usb),
            InterfaceRef::Usb => interfaces.iter().find(|i| i.is_usb),
        };
        found.map(|i| i.name.clone())
    }
}

/// Resolve an interface identifier to a kernel interface name.
///
/// Accepts a raw name (`wlan0`), a physical radio (`phy0`, `phy#1`),
/// `onboard` or `usb`. Only the last three query the system.
pub async fn resolve_interface(identifier: &str) -> Result<String> {
    if identifier.trim().is_empty() {
        return Err(WifiError::InvalidArgument("interface is required".to_string()));
    }

    let reference = InterfaceRef::parse(identifier);
    if let InterfaceRef::Name(name) = reference {
        return Ok(name);
    }

    let interfaces = list_wifi_interfaces().await?;
    let name = reference
        .select(&interfaces)
        .ok_or_else(|| WifiError::NotResolvable(identifier.to_string()))?;
    debug!("Resolved '{}' to {}", identifier, name);
    Ok(name)
}
