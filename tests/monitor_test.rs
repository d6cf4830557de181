//! Event monitor sessions over in-memory streams.

use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::io::{duplex, AsyncWriteExt};
use wlanctl::events::MonitorError;
use wlanctl::lifecycle::SessionState;
use wlanctl::{EventKind, EventMonitor, MonitorEvent, MonitorOptions, WifiError};

const SESSION: &[u8] = b"Selected interface 'wlan0'\n\
Interactive mode\n\
> \r<3>CTRL-EVENT-SCAN-STARTED \n\
<3>CTRL-EVENT-CONNECTED - Connection to aa:bb:cc:dd:ee:ff completed [id=0 id_str=]\r\n\
>\n";

async fn drain(monitor: &mut EventMonitor) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Some(event) = monitor.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn session_output_is_classified_in_order() {
    let options = MonitorOptions::default();
    let mut monitor = EventMonitor::from_streams("wlan0", SESSION, &b""[..], &options).unwrap();
    assert_eq!(monitor.state(), SessionState::Open);

    let events = drain(&mut monitor).await;
    let kinds: Vec<EventKind> = events.iter().map(MonitorEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Data,
            EventKind::Data,
            EventKind::Data,
            EventKind::Control,
            EventKind::Scanning,
            EventKind::Data,
            EventKind::Control,
            EventKind::Connected,
            EventKind::Close,
        ]
    );

    assert_eq!(
        events[0],
        MonitorEvent::Data { raw: "Selected interface 'wlan0'".to_string() }
    );
    let connected = events[7].fields().unwrap();
    assert_eq!(
        connected.get("msg").map(String::as_str),
        Some("Connection to aa:bb:cc:dd:ee:ff completed [id=0 id_str=]")
    );
    assert_eq!(events[8], MonitorEvent::Close { code: None });
    assert_eq!(monitor.state(), SessionState::Closed);
}

#[tokio::test]
async fn close_emits_a_single_close() {
    let (mut writer, stdout) = duplex(1024);
    let (_err_writer, stderr) = duplex(64);
    let mut monitor = EventMonitor::from_streams("wlan0", stdout, stderr, &MonitorOptions::default()).unwrap();

    writer.write_all(b"<3>CTRL-EVENT-DISCONNECTED bssid=aa:bb:cc:dd:ee:ff reason=3\n").await.unwrap();
    let first = monitor.next_event().await.unwrap();
    assert_eq!(first.kind(), EventKind::Data);

    monitor.close().await;
    monitor.close().await;
    assert_eq!(monitor.state(), SessionState::Closed);

    let rest = drain(&mut monitor).await;
    assert_eq!(rest, vec![MonitorEvent::Close { code: None }]);
    assert_eq!(monitor.next_event().await, None);
}

#[tokio::test]
async fn stderr_lines_become_errors() {
    let (_writer, stdout) = duplex(64);
    let mut monitor =
        EventMonitor::from_streams("wlan0", stdout, &b"Could not connect to wpa_supplicant\n"[..], &MonitorOptions::default())
            .unwrap();

    let event = monitor.next_event().await.unwrap();
    assert_eq!(
        event,
        MonitorEvent::Error {
            error: MonitorError::Stderr("Could not connect to wpa_supplicant".to_string())
        }
    );

    monitor.close().await;
    assert_eq!(drain(&mut monitor).await, vec![MonitorEvent::Close { code: None }]);
}

#[tokio::test]
async fn wait_for_skips_other_events() {
    let mut monitor = EventMonitor::from_streams("wlan0", SESSION, &b""[..], &MonitorOptions::default()).unwrap();

    let event = monitor
        .wait_for(EventKind::Connected, Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind(), EventKind::Connected);

    let missing = monitor.wait_for(EventKind::InvalidKey, Duration::from_secs(5)).await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn wait_for_times_out_on_a_quiet_session() {
    let (_writer, stdout) = duplex(64);
    let (_err_writer, stderr) = duplex(64);
    let mut monitor = EventMonitor::from_streams("wlan0", stdout, stderr, &MonitorOptions::default()).unwrap();

    let err = monitor
        .wait_for(EventKind::Connected, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, WifiError::Timeout { .. }));

    monitor.close().await;
}

#[tokio::test]
async fn missing_program_reports_error_then_close() {
    let options = MonitorOptions {
        program: "/nonexistent/wpa_cli".to_string(),
        ..MonitorOptions::default()
    };
    let mut monitor = EventMonitor::open("wlan0", options).unwrap();

    let events = drain(&mut monitor).await;
    let kinds: Vec<EventKind> = events.iter().map(MonitorEvent::kind).collect();
    assert_eq!(kinds, vec![EventKind::Error, EventKind::Close]);
}

#[tokio::test]
async fn empty_interface_is_rejected() {
    let err = EventMonitor::from_streams("", &b""[..], &b""[..], &MonitorOptions::default()).unwrap_err();
    assert!(matches!(err, WifiError::InvalidArgument(_)));
}

#[tokio::test]
async fn undecodable_line_does_not_end_the_session() {
    let mut monitor = EventMonitor::from_streams(
        "wlan0",
        &b"\xff\xfe bad\n<3>CTRL-EVENT-SCAN-STARTED\n"[..],
        &b""[..],
        &MonitorOptions::default(),
    )
    .unwrap();

    let events = drain(&mut monitor).await;
    let kinds: Vec<EventKind> = events.iter().map(MonitorEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Data,
            EventKind::Data,
            EventKind::Control,
            EventKind::Scanning,
            EventKind::Close,
        ]
    );
    assert_eq!(events[0], MonitorEvent::Data { raw: "\u{fffd}\u{fffd} bad".to_string() });
}

#[tokio::test]
async fn close_is_prompt_with_a_full_channel() {
    let options = MonitorOptions {
        capacity: 2,
        close_timeout: Duration::from_secs(30),
        ..MonitorOptions::default()
    };
    let (mut writer, stdout) = duplex(4096);
    let (_err_writer, stderr) = duplex(64);
    let mut monitor = EventMonitor::from_streams("wlan0", stdout, stderr, &options).unwrap();

    for _ in 0..20 {
        writer.write_all(b"<3>CTRL-EVENT-SCAN-RESULTS\n").await.unwrap();
    }
    tokio::task::yield_now().await;

    let started = tokio::time::Instant::now();
    monitor.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(drain(&mut monitor).await, vec![MonitorEvent::Close { code: None }]);
}
