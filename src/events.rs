//! Classification of the supplicant's unsolicited event stream.
//!
//! In interactive mode `wpa_cli` interleaves its prompt, command echo and
//! event lines. Event lines carry a short priority marker such as `<3>`
//! directly in front of a `CTRL-...` tag:
//!
//! ```text
//! <3>CTRL-EVENT-SCAN-STARTED
//! <3>CTRL-EVENT-DISCONNECTED bssid=aa:bb:cc:dd:ee:ff reason=3 locally_generated=1
//! <3>CTRL-EVENT-CONNECTED - Connection to aa:bb:cc:dd:ee:ff completed [id=0 id_str=]
//! ```
//!
//! Everything here is a pure function of the text, so the monitor's I/O
//! side can stay dumb and these rules can be tested without a process.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Field map of a control event.
pub type Fields = BTreeMap<String, String>;

/// Text every control tag starts with.
pub const CTRL_MARKER: &str = "CTRL";

const CONNECTED_TAG: &str = "CTRL-EVENT-CONNECTED";

/// Closed set of notification kinds a monitor can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Data,
    Control,
    Scanning,
    Scanned,
    Connected,
    Disconnected,
    InvalidKey,
    Terminating,
    Error,
    Close,
}

impl EventKind {
    /// Semantic alias for a control tag, if it has one.
    pub fn for_tag(tag: &str) -> Option<EventKind> {
        match tag {
            "CTRL-EVENT-SCAN-STARTED" => Some(EventKind::Scanning),
            "CTRL-EVENT-SCAN-RESULTS" => Some(EventKind::Scanned),
            CONNECTED_TAG => Some(EventKind::Connected),
            "CTRL-EVENT-DISCONNECTED" => Some(EventKind::Disconnected),
            "CTRL-EVENT-SSID-TEMP-DISABLED" => Some(EventKind::InvalidKey),
            "CTRL-EVENT-TERMINATING" => Some(EventKind::Terminating),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Data => "data",
            EventKind::Control => "control",
            EventKind::Scanning => "scanning",
            EventKind::Scanned => "scanned",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::InvalidKey => "invalidkey",
            EventKind::Terminating => "terminating",
            EventKind::Error => "error",
            EventKind::Close => "close",
        })
    }
}

/// One parsed `CTRL-...` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlEvent {
    /// Text after the priority marker.
    pub raw: String,
    pub tag: String,
    pub fields: Fields,
}

impl ControlEvent {
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::for_tag(&self.tag)
    }
}

/// Diagnostic coming out of the monitor session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "message", rename_all = "lowercase")]
pub enum MonitorError {
    /// A line the session wrote to its standard error.
    Stderr(String),
    /// Spawn or pipe level fault.
    Transport(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Stderr(line) => write!(f, "stderr: {line}"),
            MonitorError::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

/// Notification published by an [`crate::monitor::EventMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MonitorEvent {
    Data { raw: String },
    Control(ControlEvent),
    Scanning { fields: Fields },
    Scanned { fields: Fields },
    Connected { fields: Fields },
    Disconnected { fields: Fields },
    #[serde(rename = "invalidkey")]
    InvalidKey { fields: Fields },
    Terminating { fields: Fields },
    Error { error: MonitorError },
    Close { code: Option<i32> },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::Data { .. } => EventKind::Data,
            MonitorEvent::Control(_) => EventKind::Control,
            MonitorEvent::Scanning { .. } => EventKind::Scanning,
            MonitorEvent::Scanned { .. } => EventKind::Scanned,
            MonitorEvent::Connected { .. } => EventKind::Connected,
            MonitorEvent::Disconnected { .. } => EventKind::Disconnected,
            MonitorEvent::InvalidKey { .. } => EventKind::InvalidKey,
            MonitorEvent::Terminating { .. } => EventKind::Terminating,
            MonitorEvent::Error { .. } => EventKind::Error,
            MonitorEvent::Close { .. } => EventKind::Close,
        }
    }

    /// Fields of a control or semantic event.
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            MonitorEvent::Control(event) => Some(&event.fields),
            MonitorEvent::Scanning { fields }
            | MonitorEvent::Scanned { fields }
            | MonitorEvent::Connected { fields }
            | MonitorEvent::Disconnected { fields }
            | MonitorEvent::InvalidKey { fields }
            | MonitorEvent::Terminating { fields } => Some(fields),
            _ => None,
        }
    }

    fn semantic(kind: EventKind, fields: Fields) -> Option<MonitorEvent> {
        match kind {
            EventKind::Scanning => Some(MonitorEvent::Scanning { fields }),
            EventKind::Scanned => Some(MonitorEvent::Scanned { fields }),
            EventKind::Connected => Some(MonitorEvent::Connected { fields }),
            EventKind::Disconnected => Some(MonitorEvent::Disconnected { fields }),
            EventKind::InvalidKey => Some(MonitorEvent::InvalidKey { fields }),
            EventKind::Terminating => Some(MonitorEvent::Terminating { fields }),
            _ => None,
        }
    }
}

/// Splits a chunk of session output into the lines worth publishing.
///
/// `wpa_cli` redraws its prompt with bare carriage returns, so both `\r`
/// and `\n` end a line. Empty lines and the bare prompt are dropped.
pub fn split_lines<'a>(chunk: &'a str, prompt: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    chunk
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(move |line| !line.is_empty() && *line != prompt)
}

/// Returns the text from `CTRL` onwards when the line carries a priority
/// marker (`<N>`) immediately followed by `CTRL`.
pub fn strip_marker(line: &str) -> Option<&str> {
    line.match_indices(CTRL_MARKER).find_map(|(idx, _)| {
        let marker = line.get(idx.checked_sub(3)?..idx)?.as_bytes();
        let is_marker = marker[0] == b'<' && marker[1].is_ascii_digit() && marker[2] == b'>';
        is_marker.then(|| &line[idx..])
    })
}

/// Parses the text after the priority marker into a [`ControlEvent`].
///
/// The tag is the leading run of upper-case letters and hyphens. For
/// `CTRL-EVENT-CONNECTED` the remainder is free text and becomes a single
/// `msg` field; otherwise whitespace separated `key=value` tokens become
/// fields (a token without `=` maps to an empty value).
pub fn parse_control(text: &str) -> Option<ControlEvent> {
    let end = text
        .find(|c: char| !(c.is_ascii_uppercase() || c == '-'))
        .unwrap_or(text.len());
    let tag = &text[..end];
    if tag.is_empty() {
        return None;
    }
    let rest = text[end..].trim();

    let mut fields = Fields::new();
    if tag == CONNECTED_TAG {
        let msg = rest.strip_prefix('-').map(str::trim_start).unwrap_or(rest);
        fields.insert("msg".to_string(), msg.to_string());
    } else {
        for token in rest.split_whitespace() {
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            fields.insert(key.to_string(), value.to_string());
        }
    }

    Some(ControlEvent {
        raw: text.to_string(),
        tag: tag.to_string(),
        fields,
    })
}

/// Turns one published line into its notifications: always a `Data`, and
/// for control lines a `Control` plus, when the tag has an alias, the
/// matching semantic event.
pub fn classify_line(line: &str) -> Vec<MonitorEvent> {
    let mut events = vec![MonitorEvent::Data {
        raw: line.to_string(),
    }];

    if let Some(event) = strip_marker(line).and_then(parse_control) {
        let semantic = event
            .kind()
            .and_then(|kind| MonitorEvent::semantic(kind, event.fields.clone()));
        events.push(MonitorEvent::Control(event));
        events.extend(semantic);
    }

    events
}
