//! Reply parsers for the supplicant control protocol.
//!
//! `wpa_cli` answers a command with one of a few textual shapes:
//!
//! - `status` prints newline separated `key=value` pairs
//! - `list_networks` prints a tab separated table with a one-line header
//! - `scan_results` prints a tab separated table with a one-line header
//!
//! Every parser here is total. A line that does not fit the expected shape
//! is dropped (and logged at `debug`/`warn` level) instead of failing the
//! whole reply, because the supplicant adds fields between releases and
//! callers only ever need a handful of them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Value of the `wpa_state` key in a status reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum WpaState {
    Disconnected,
    Inactive,
    Scanning,
    Associating,
    Associated,
    Completed,
    FourWayHandshake,
    GroupHandshake,
    /// Any state this crate does not model (`INTERFACE_DISABLED`, ...).
    Other(String),
}

impl From<&str> for WpaState {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "DISCONNECTED" => WpaState::Disconnected,
            "INACTIVE" => WpaState::Inactive,
            "SCANNING" => WpaState::Scanning,
            "ASSOCIATING" => WpaState::Associating,
            "ASSOCIATED" => WpaState::Associated,
            "COMPLETED" => WpaState::Completed,
            "4WAY_HANDSHAKE" => WpaState::FourWayHandshake,
            "GROUP_HANDSHAKE" => WpaState::GroupHandshake,
            _ => WpaState::Other(value.trim().to_string()),
        }
    }
}

impl fmt::Display for WpaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WpaState::Disconnected => "DISCONNECTED",
            WpaState::Inactive => "INACTIVE",
            WpaState::Scanning => "SCANNING",
            WpaState::Associating => "ASSOCIATING",
            WpaState::Associated => "ASSOCIATED",
            WpaState::Completed => "COMPLETED",
            WpaState::FourWayHandshake => "4WAY_HANDSHAKE",
            WpaState::GroupHandshake => "GROUP_HANDSHAKE",
            WpaState::Other(other) => other,
        };
        f.write_str(s)
    }
}

impl From<WpaState> for String {
    fn from(state: WpaState) -> Self {
        state.to_string()
    }
}

/// Whether the radio currently serves as an access point or a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Ap,
    Station,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Combined view used by `wlanctl state`: an AP beats everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Ap,
    Connected,
    Disconnected,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Ap => "ap",
            Mode::Station => "station",
        })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        })
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Ap => "ap",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        })
    }
}

/// Point-in-time snapshot of a `status` reply.
///
/// All keys are kept; the accessors below cover the ones the rest of the
/// crate relies on. A record is never cached, ask the supplicant again
/// when you need fresh data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusRecord {
    fields: BTreeMap<String, String>,
}

impl StatusRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn wpa_state(&self) -> Option<WpaState> {
        self.get("wpa_state").map(WpaState::from)
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.get("ip_address").filter(|ip| !ip.is_empty())
    }

    pub fn ssid(&self) -> Option<&str> {
        self.get("ssid")
    }

    pub fn bssid(&self) -> Option<&str> {
        self.get("bssid")
    }

    /// Profile id of the network the supplicant is using, if any.
    pub fn id(&self) -> Option<u32> {
        self.get("id").and_then(|id| id.parse().ok())
    }

    /// `ap` when the supplicant is idle but the interface still holds an
    /// address (an AP daemon owns the radio), `station` otherwise.
    pub fn mode(&self) -> Mode {
        match (self.wpa_state(), self.ip_address()) {
            (Some(WpaState::Disconnected), Some(_)) => Mode::Ap,
            _ => Mode::Station,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self.wpa_state() {
            Some(WpaState::Completed) => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn link_state(&self) -> LinkState {
        if self.mode() == Mode::Ap {
            return LinkState::Ap;
        }
        match self.connection_state() {
            ConnectionState::Connected => LinkState::Connected,
            ConnectionState::Disconnected => LinkState::Disconnected,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for StatusRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        StatusRecord {
            fields: iter.into_iter().collect(),
        }
    }
}

/// One row of `list_networks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProfile {
    /// Supplicant assigned id, only meaningful for the session it came from.
    pub id: u32,
    pub ssid: String,
    /// Third column of the table (BSSID restriction, usually `any`).
    pub essid: String,
    /// e.g. `[CURRENT]`, `[DISABLED]`; empty when the column is missing.
    pub flags: String,
}

impl NetworkProfile {
    pub fn is_current(&self) -> bool {
        self.flags.contains("[CURRENT]")
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains("[DISABLED]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    Open,
    Wep,
    Wpa,
    Wpa2,
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Security::Open => "open",
            Security::Wep => "wep",
            Security::Wpa => "wpa",
            Security::Wpa2 => "wpa2",
        })
    }
}

/// One observed access point.
///
/// Cells coming from the supplicant's scan cache only carry bssid,
/// frequency, signal and ssid. Cells from a radio scan (see [`crate::iw`])
/// also carry channel and security.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanCell {
    pub bssid: String,
    pub frequency: Option<u32>,
    /// dBm
    pub signal: Option<f64>,
    pub ssid: String,
    pub channel: Option<u32>,
    pub security: Option<Security>,
}

/// Parses a `status` reply into a [`StatusRecord`].
///
/// Lines of three characters or fewer are skipped, as are lines without a
/// `=`. Only the first `=` splits a line, so values may contain `=`.
pub fn parse_status(reply: &str) -> StatusRecord {
    reply
        .split('\n')
        .filter(|line| line.chars().count() > 3)
        .filter_map(|line| match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Some((key.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                debug!("Dropping status line without key: {:?}", line);
                None
            }
        })
        .collect()
}

/// Parses a `list_networks` reply. The header line is always skipped and
/// rows with fewer than three columns are dropped.
///
/// A row whose id column is not a non-negative integer does not describe a
/// profile the supplicant could address, so it is logged and dropped like
/// any other line of unknown shape. Every row with a numeric id and at
/// least three columns is kept.
pub fn parse_network_list(reply: &str) -> Vec<NetworkProfile> {
    reply
        .split('\n')
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() < 3 {
                return None;
            }
            let id = match fields[0].parse() {
                Ok(id) => id,
                Err(_) => {
                    warn!("Dropping network row with non-numeric id: {:?}", line);
                    return None;
                }
            };
            Some(NetworkProfile {
                id,
                ssid: fields[1].to_string(),
                essid: fields[2].to_string(),
                flags: fields.get(3).copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Parses a `scan_results` reply. Columns are
/// `bssid / frequency / signal level / flags / ssid`; the flags column is
/// not interpreted here.
pub fn parse_scan_results(reply: &str) -> Vec<ScanCell> {
    reply
        .split('\n')
        .skip(1)
        .map(|line| line.split('\t').map(str::trim).collect::<Vec<_>>())
        .filter(|fields| fields.len() > 3)
        .map(|fields| ScanCell {
            bssid: fields[0].to_string(),
            frequency: fields[1].parse().ok(),
            signal: fields[2].parse().ok(),
            ssid: fields.get(4).copied().unwrap_or_default().to_string(),
            channel: None,
            security: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STATUS: &str = "bssid=aa:bb:cc:dd:ee:ff\n\
freq=2437\n\
ssid=HomeNet\n\
id=0\n\
mode=station\n\
pairwise_cipher=CCMP\n\
key_mgmt=WPA2-PSK\n\
wpa_state=COMPLETED\n\
ip_address=192.168.1.23\n\
address=b8:27:eb:7e:11:87\n\
uuid=2a8e0c37-12b8-5b1b-a6c4-1b2f8d7c9e01";

    #[test]
    fn status_keeps_every_key_value_line() {
        let status = parse_status(STATUS);
        assert_eq!(status.len(), 11);
        assert_eq!(status.ssid(), Some("HomeNet"));
        assert_eq!(status.bssid(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(status.id(), Some(0));
        assert_eq!(status.wpa_state(), Some(WpaState::Completed));
        assert_eq!(status.ip_address(), Some("192.168.1.23"));
    }

    #[test]
    fn status_skips_short_and_keyless_lines() {
        let status = parse_status("a=b\nOK\nwpa_state=SCANNING\nnot a pair\n=dangling\n\n");
        assert_eq!(status.len(), 1);
        assert_eq!(status.get("a"), None);
        assert_eq!(status.wpa_state(), Some(WpaState::Scanning));
    }

    #[test]
    fn status_splits_on_first_equals_and_trims() {
        let status = parse_status("p2p_device_address = x=y \r\n");
        assert_eq!(status.get("p2p_device_address"), Some("x=y"));
    }

    #[test]
    fn status_reparse_is_stable() {
        let first = parse_status(STATUS);
        let rendered: Vec<String> = first.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let second = parse_status(&rendered.join("\n"));
        assert_eq!(first, second);
    }

    #[test]
    fn ap_mode_needs_disconnected_state_and_address() {
        let status = parse_status("wpa_state=DISCONNECTED\nip_address=10.1.1.1");
        assert_eq!(status.mode(), Mode::Ap);
        assert_eq!(status.connection_state(), ConnectionState::Disconnected);
        assert_eq!(status.link_state(), LinkState::Ap);

        let status = parse_status("wpa_state=DISCONNECTED");
        assert_eq!(status.mode(), Mode::Station);
    }

    #[test]
    fn completed_means_connected_station() {
        let status = parse_status("wpa_state=COMPLETED");
        assert_eq!(status.connection_state(), ConnectionState::Connected);
        assert_eq!(status.mode(), Mode::Station);
        assert_eq!(status.link_state(), LinkState::Connected);
    }

    #[test]
    fn wpa_state_is_case_insensitive() {
        assert_eq!(WpaState::from("completed"), WpaState::Completed);
        assert_eq!(WpaState::from("4WAY_HANDSHAKE"), WpaState::FourWayHandshake);
        assert_eq!(
            WpaState::from("INTERFACE_DISABLED"),
            WpaState::Other("INTERFACE_DISABLED".into())
        );
    }

    #[test]
    fn network_list_skips_header_and_short_rows() {
        let reply = "network id / ssid / bssid / flags\n\
0\tHomeNet\tany\t[CURRENT]\n\
1\tOffice\tany\n\
2\tbroken\n\
x\tbad id\tany\t";
        let networks = parse_network_list(reply);
        assert_eq!(
            networks,
            vec![
                NetworkProfile {
                    id: 0,
                    ssid: "HomeNet".into(),
                    essid: "any".into(),
                    flags: "[CURRENT]".into(),
                },
                NetworkProfile {
                    id: 1,
                    ssid: "Office".into(),
                    essid: "any".into(),
                    flags: String::new(),
                },
            ]
        );
        assert!(networks[0].is_current());
        assert!(!networks[1].is_disabled());
    }

    #[test]
    fn non_numeric_id_rows_are_dropped() {
        let reply = "network id / ssid / bssid / flags\n-1\tNeg\tany\t\nabc\tWord\tany\t\n7\tKept\tany\t";
        let ids: Vec<u32> = parse_network_list(reply).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn network_list_of_header_only_is_empty() {
        assert!(parse_network_list("network id / ssid / bssid / flags").is_empty());
        assert!(parse_network_list("").is_empty());
    }

    #[test]
    fn scan_results_map_positional_columns() {
        let reply = "bssid / frequency / signal level / flags / ssid\n\
aa:bb:cc:dd:ee:ff\t2412\t-48\t[WPA2-PSK-CCMP][ESS]\tHomeNet\n\
11:22:33:44:55:66\t5180\t-71\t[ESS]\n\
garbage line";
        let cells = parse_scan_results(reply);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].bssid, "aa:bb:cc:dd:ee:ff");
        assert_eq!(cells[0].frequency, Some(2412));
        assert_eq!(cells[0].signal, Some(-48.0));
        assert_eq!(cells[0].ssid, "HomeNet");
        assert_eq!(cells[0].security, None);
        assert_eq!(cells[1].ssid, "");
        assert_eq!(cells[1].frequency, Some(5180));
    }
}
