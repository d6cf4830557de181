//! Request/response behaviour of the control client.

mod common;

use common::FakeSupplicant;
use pretty_assertions::assert_eq;
use wlanctl::{ControlClient, LinkState, WifiError, WpaState};

#[tokio::test]
async fn fail_reply_names_command_and_arguments() {
    let client = ControlClient::new(FakeSupplicant::new().fail_on("enable_network"));
    let err = client.enable_network("wlan0", 4).await.unwrap_err();

    assert_eq!(err.to_string(), "Command failed: enable_network 4");
    assert!(matches!(err, WifiError::CommandFailed { ref command, .. } if command == "enable_network"));
}

#[tokio::test]
async fn replies_are_trimmed() {
    let client = ControlClient::new(FakeSupplicant::new());
    assert_eq!(client.disconnect("wlan0").await.unwrap(), "OK");
}

#[tokio::test]
async fn status_is_parsed() {
    let client = ControlClient::new(FakeSupplicant::new());
    let status = client.status("wlan1").await.unwrap();

    assert_eq!(status.wpa_state(), Some(WpaState::Completed));
    assert_eq!(status.ssid(), Some("HomeNet"));
    assert_eq!(status.ip_address(), Some("10.0.0.7"));
    assert_eq!(status.get("ifname"), Some("wlan1"));
    assert_eq!(status.link_state(), LinkState::Connected);
}

#[tokio::test]
async fn scan_triggers_then_reads_results() {
    let fake = FakeSupplicant::new();
    let client = ControlClient::new(fake.clone());
    let cells = client.scan("wlan0").await.unwrap();

    assert_eq!(fake.calls(), vec!["scan", "scan_results"]);
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].ssid, "HomeNet");
    assert_eq!(cells[0].frequency, Some(2437));
    assert_eq!(cells[1].signal, Some(-71.0));
}

#[tokio::test]
async fn busy_scan_is_a_scan_error() {
    let fake = FakeSupplicant::new().scan_reply("FAIL-BUSY");
    let client = ControlClient::new(fake.clone());
    let err = client.scan("wlan0").await.unwrap_err();

    assert!(matches!(err, WifiError::Scan(ref reply) if reply == "FAIL-BUSY"));
    assert_eq!(fake.count("scan_results"), 0);
}

#[tokio::test]
async fn add_network_returns_the_new_id() {
    let client = ControlClient::new(FakeSupplicant::new().with_network("Office"));
    assert_eq!(client.add_network("wlan0").await.unwrap(), 1);
}

#[tokio::test]
async fn string_values_are_double_quoted() {
    let fake = FakeSupplicant::new();
    let client = ControlClient::new(fake.clone());
    client.set_network_string("wlan0", 0, "ssid", "My Net").await.unwrap();
    client.set_network("wlan0", 0, "priority", "5").await.unwrap();

    assert_eq!(fake.calls(), vec!["set_network 0 ssid \"My Net\"", "set_network 0 priority 5"]);
}

#[tokio::test]
async fn empty_interface_is_rejected() {
    let fake = FakeSupplicant::new();
    let client = ControlClient::new(fake.clone());
    let err = client.status("").await.unwrap_err();

    assert!(matches!(err, WifiError::InvalidArgument(_)));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn ssid_with_quote_is_sent_as_hex() {
    let fake = FakeSupplicant::new();
    let client = ControlClient::new(fake.clone());
    client.set_network_string("wlan0", 0, "ssid", "Bob's \"Net\"").await.unwrap();

    assert_eq!(fake.calls(), vec!["set_network 0 ssid 426f62277320224e657422"]);
}

#[tokio::test]
async fn psk_with_quote_is_rejected() {
    let fake = FakeSupplicant::new();
    let client = ControlClient::new(fake.clone());
    let err = client.set_network_string("wlan0", 0, "psk", "pa\"ss").await.unwrap_err();

    assert!(matches!(err, WifiError::InvalidArgument(_)));
    assert!(fake.calls().is_empty());
}
