//! Parsers for the `iw` radio tool.
//!
//! Two outputs matter here:
//!
//! - `iw dev` lists every phy and the interfaces bound to it; the resolver
//!   uses it to map a `phyN` reference to a netdev name
//! - `iw dev <iface> scan` prints one verbose block per BSS; it is the rich
//!   scan path, carrying channel and security that the supplicant's own
//!   `scan_results` table lacks
//!
//! Both parsers are total, unknown lines are ignored.

use serde::Serialize;
use std::cmp::Ordering;

use crate::error::Result;
use crate::exec;
use crate::parse::{ScanCell, Security};

/// One entry of `iw dev`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IwDevice {
    pub phy: u32,
    /// Netdev name, or `Unnamed/non-netdev` for P2P devices and the like.
    pub iface: String,
    pub ifindex: Option<u32>,
    pub wdev: Option<String>,
    pub addr: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// dBm
    pub txpower: Option<f64>,
    pub channel: Option<u32>,
}

/// Parses `iw dev` output. Devices come back ordered by phy index, keeping
/// the listing order inside one phy.
pub fn parse_dev_list(output: &str) -> Vec<IwDevice> {
    let mut devices: Vec<IwDevice> = Vec::new();
    let mut phy: Option<u32> = None;

    for line in output.lines() {
        let line = line.trim();

        if let Some(idx) = line.strip_prefix("phy#") {
            phy = idx.parse().ok();
            continue;
        }
        let Some(phy) = phy else { continue };

        if let Some(name) = line.strip_prefix("Interface ") {
            devices.push(IwDevice {
                phy,
                iface: name.trim().to_string(),
                ..Default::default()
            });
            continue;
        }
        if let Some(name) = line.strip_suffix(" interface").filter(|n| n.starts_with("Unnamed")) {
            devices.push(IwDevice {
                phy,
                iface: name.to_string(),
                ..Default::default()
            });
            continue;
        }

        let Some(device) = devices.last_mut().filter(|d| d.phy == phy) else {
            continue;
        };
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        match key {
            "ifindex" => device.ifindex = value.trim().parse().ok(),
            "wdev" => device.wdev = Some(value.trim().to_string()),
            "addr" => device.addr = Some(value.trim().to_string()),
            "type" => device.kind = Some(value.trim().to_string()),
            "txpower" => device.txpower = leading_number(value).and_then(|n| n.parse().ok()),
            "channel" => device.channel = leading_number(value).and_then(|n| n.parse().ok()),
            _ => {}
        }
    }

    devices.sort_by_key(|d| d.phy);
    devices
}

/// Parses `iw dev <iface> scan` output into cells, strongest signal first.
pub fn parse_scan(output: &str) -> Vec<ScanCell> {
    let mut cells = Vec::new();
    let mut current: Option<CellBuilder> = None;

    for raw in output.lines() {
        if let Some(rest) = raw.strip_prefix("BSS ") {
            cells.extend(current.take().map(CellBuilder::finish));
            let bssid: String = rest
                .chars()
                .take_while(|c| c.is_ascii_hexdigit() || *c == ':' || *c == '-')
                .collect();
            current = Some(CellBuilder::new(bssid.to_lowercase()));
            continue;
        }
        if let Some(cell) = current.as_mut() {
            cell.feed(raw.trim());
        }
    }
    cells.extend(current.map(CellBuilder::finish));

    cells.sort_by(|a, b| match (a.signal, b.signal) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    cells
}

/// Channel number for a centre frequency in MHz.
pub fn channel_from_frequency(freq: u32) -> Option<u32> {
    match freq {
        2484 => Some(14),
        2412..=2472 => Some((freq - 2407) / 5),
        5000..=5895 => Some((freq - 5000) / 5),
        5955..=7115 => Some((freq - 5950) / 5),
        _ => None,
    }
}

#[derive(Default)]
struct CellBuilder {
    bssid: String,
    frequency: Option<u32>,
    signal: Option<f64>,
    ssid: String,
    channel: Option<u32>,
    rsn: bool,
    wpa: bool,
    privacy: bool,
}

impl CellBuilder {
    fn new(bssid: String) -> Self {
        CellBuilder {
            bssid,
            ..Default::default()
        }
    }

    fn feed(&mut self, line: &str) {
        if let Some(v) = line.strip_prefix("freq:") {
            self.frequency = v.trim().parse::<f64>().ok().map(|f| f.round() as u32);
        } else if let Some(v) = line.strip_prefix("signal:") {
            self.signal = leading_number(v).and_then(|n| n.parse().ok());
        } else if let Some(v) = line.strip_prefix("SSID:") {
            let ssid = v.strip_prefix(' ').unwrap_or(v);
            self.ssid = if ssid.contains("\\x00") { String::new() } else { ssid.to_string() };
        } else if let Some(v) = line.strip_prefix("DS Parameter set: channel") {
            self.channel = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("* primary channel:") {
            self.channel = self.channel.or_else(|| v.trim().parse().ok());
        } else if line.starts_with("RSN:") {
            self.rsn = true;
        } else if line.starts_with("WPA:") {
            self.wpa = true;
        } else if let Some(v) = line.strip_prefix("capability:") {
            self.privacy = v.split_whitespace().any(|flag| flag == "Privacy");
        }
    }

    fn finish(self) -> ScanCell {
        let security = if self.rsn {
            Security::Wpa2
        } else if self.wpa {
            Security::Wpa
        } else if self.privacy {
            Security::Wep
        } else {
            Security::Open
        };
        ScanCell {
            bssid: self.bssid,
            frequency: self.frequency,
            signal: self.signal,
            ssid: self.ssid,
            channel: self.channel.or_else(|| self.frequency.and_then(channel_from_frequency)),
            security: Some(security),
        }
    }
}

fn leading_number(value: &str) -> Option<&str> {
    let value = value.trim();
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(value.len());
    (end > 0).then(|| &value[..end])
}

pub async fn dev_list() -> Result<Vec<IwDevice>> {
    let output = exec::run("iw", &["dev"]).await?;
    Ok(parse_dev_list(&output))
}

/// Triggers a radio scan on `interface`. Needs root.
pub async fn scan(interface: &str) -> Result<Vec<ScanCell>> {
    let output = exec::run("iw", &["dev", interface, "scan"]).await?;
    Ok(parse_scan(&output))
}
