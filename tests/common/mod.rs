//! In-memory supplicant answering control commands the way wpa_supplicant
//! would, recording every command it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use wlanctl::{ControlTransport, Result};

#[derive(Default)]
struct State {
    networks: Vec<(u32, String)>,
    next_id: u32,
    calls: Vec<String>,
    fail_on: Option<String>,
    scan_reply: Option<String>,
    save_reply: Option<String>,
    add_reply: Option<String>,
    gates: HashMap<String, Arc<Notify>>,
}

/// Cloning shares the state, so a test can keep a handle after moving the
/// transport into a client.
#[derive(Clone, Default)]
pub struct FakeSupplicant {
    state: Arc<Mutex<State>>,
}

impl FakeSupplicant {
    pub fn new() -> Self {
        FakeSupplicant::default()
    }

    /// Seeds a profile as if it had been read from the supplicant's config.
    pub fn with_network(self, ssid: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.networks.push((id, ssid.to_string()));
            state.next_id += 1;
        }
        self
    }

    /// Answers `FAIL` to the first command whose recorded line starts with
    /// `prefix` (e.g. `"set_network 0 psk"`).
    pub fn fail_on(self, prefix: &str) -> Self {
        self.state.lock().unwrap().fail_on = Some(prefix.to_string());
        self
    }

    pub fn scan_reply(self, reply: &str) -> Self {
        self.state.lock().unwrap().scan_reply = Some(reply.to_string());
        self
    }

    pub fn save_reply(self, reply: &str) -> Self {
        self.state.lock().unwrap().save_reply = Some(reply.to_string());
        self
    }

    pub fn add_reply(self, reply: &str) -> Self {
        self.state.lock().unwrap().add_reply = Some(reply.to_string());
        self
    }

    /// Holds the next command sent to `interface` until the returned
    /// handle is notified.
    pub fn gate(&self, interface: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state
            .lock()
            .unwrap()
            .gates
            .insert(interface.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls()
            .iter()
            .filter(|line| line.split(' ').next() == Some(command))
            .count()
    }

    pub fn ssids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.networks.iter().map(|(_, ssid)| ssid.clone()).collect()
    }
}

#[async_trait]
impl ControlTransport for FakeSupplicant {
    async fn send(&self, interface: &str, command: &str, args: &[String]) -> Result<String> {
        // give other callers a chance to interleave, like a real process would
        tokio::task::yield_now().await;
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.gates.remove(interface)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        let line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        state.calls.push(line.clone());

        if state.fail_on.as_deref().is_some_and(|prefix| line.starts_with(prefix)) {
            state.fail_on = None;
            return Ok("FAIL\n".to_string());
        }

        let reply = match command {
            "status" => format!("bssid=aa:bb:cc:dd:ee:ff\nssid=HomeNet\nmode=station\nwpa_state=COMPLETED\nip_address=10.0.0.7\nifname={interface}\n"),
            "list_networks" => {
                let mut reply = "network id / ssid / bssid / flags\n".to_string();
                for (id, ssid) in &state.networks {
                    reply.push_str(&format!("{id}\t{ssid}\tany\t\n"));
                }
                reply
            }
            "add_network" if state.add_reply.is_some() => state.add_reply.clone().unwrap_or_default(),
            "add_network" => {
                let id = state.next_id;
                state.next_id += 1;
                state.networks.push((id, String::new()));
                format!("{id}\n")
            }
            "set_network" if args.get(1).map(String::as_str) == Some("ssid") => {
                let id: u32 = args[0].parse().unwrap();
                let ssid = args[2].trim_matches('"').to_string();
                if let Some(network) = state.networks.iter_mut().find(|(nid, _)| *nid == id) {
                    network.1 = ssid;
                }
                "OK\n".to_string()
            }
            "remove_network" => {
                let id: u32 = args[0].parse().unwrap();
                state.networks.retain(|(nid, _)| *nid != id);
                "OK\n".to_string()
            }
            "scan" => state.scan_reply.clone().unwrap_or_else(|| "OK".to_string()),
            "scan_results" => "bssid / frequency / signal level / flags / ssid\n\
                aa:bb:cc:dd:ee:ff\t2437\t-48\t[WPA2-PSK-CCMP][ESS]\tHomeNet\n\
                11:22:33:44:55:66\t5180\t-71\t[ESS]\tCafe\n"
                .to_string(),
            "save_config" => state.save_reply.clone().unwrap_or_else(|| "OK".to_string()),
            _ => "OK\n".to_string(),
        };
        Ok(reply)
    }
}
