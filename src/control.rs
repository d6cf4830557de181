//! Request/response client for the supplicant control interface.
//!
//! Every operation is a single `wpa_cli -i <iface> <command> [args...]`
//! invocation. The reply is trimmed and checked against the `FAIL` sentinel
//! before a dedicated parser from [`crate::parse`] turns it into a value.
//!
//! # Requirements
//!
//! - wpa_supplicant must be running with a control socket for the interface
//! - the `wpa_cli` program (or the one named in the config) must be in PATH
//! - the user must be allowed to open the control socket
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> wlanctl::Result<()> {
//! use wlanctl::control::ControlClient;
//!
//! let client = ControlClient::wpa_cli();
//! let status = client.status("wlan0").await?;
//! println!("state: {:?}", status.wpa_state());
//! # Ok(())
//! # }
//! ```
//!
//! The client keeps no per-interface state. It does not serialize commands
//! either: one in-flight command per interface is the caller's business
//! (see [`crate::reconcile::NetworkReconciler`]).

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, WifiError};
use crate::parse::{self, NetworkProfile, ScanCell, StatusRecord};

/// Literal reply the supplicant uses to reject a command.
pub const FAIL: &str = "FAIL";

/// Literal reply the supplicant uses to accept a command.
pub const OK: &str = "OK";

/// Carries one command to an interface's control socket and returns the
/// raw (untrimmed) reply.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    async fn send(&self, interface: &str, command: &str, args: &[String]) -> Result<String>;
}

/// Transport that runs the `wpa_cli` program once per command.
#[derive(Debug, Clone)]
pub struct WpaCli {
    program: String,
    timeout: Duration,
}

impl WpaCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        WpaCli {
            program: program.into(),
            timeout,
        }
    }
}

impl Default for WpaCli {
    fn default() -> Self {
        WpaCli::new("wpa_cli", Duration::from_secs(10))
    }
}

#[async_trait]
impl ControlTransport for WpaCli {
    async fn send(&self, interface: &str, command: &str, args: &[String]) -> Result<String> {
        let child = Command::new(&self.program)
            .arg("-i")
            .arg(interface)
            .arg(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WifiError::Transport(format!("Failed to execute {}: {}", self.program, e)))?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| WifiError::Timeout {
                command: command.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let error_msg = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(WifiError::Transport(format!(
                "{} {} exited with {}: {}",
                self.program,
                command,
                output.status,
                error_msg.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// High level command wrappers on top of a [`ControlTransport`].
#[derive(Debug, Clone, Default)]
pub struct ControlClient<T = WpaCli> {
    transport: T,
}

impl ControlClient<WpaCli> {
    /// Client backed by `wpa_cli` from PATH with a 10 second command timeout.
    pub fn wpa_cli() -> Self {
        ControlClient::new(WpaCli::default())
    }
}

impl<T: ControlTransport> ControlClient<T> {
    pub fn new(transport: T) -> Self {
        ControlClient { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `command args...` to `interface` and returns the trimmed reply.
    ///
    /// # Returns
    /// - `Ok(reply)` for any reply other than `FAIL`
    /// - `Err(WifiError::CommandFailed)` naming the command and its arguments
    ///   when the supplicant answers `FAIL`
    /// - `Err(WifiError::InvalidArgument)` when `interface` is empty
    pub async fn execute(&self, interface: &str, command: &str, args: &[String]) -> Result<String> {
        require_interface(interface)?;

        debug!(interface, "<<< {} {}", command, args.join(" "));
        let reply = self.transport.send(interface, command, args).await?;
        let reply = reply.trim();
        debug!(interface, ">>> {}", reply);

        if reply == FAIL {
            return Err(WifiError::command_failed(command, args));
        }
        Ok(reply.to_string())
    }

    pub async fn status(&self, interface: &str) -> Result<StatusRecord> {
        let reply = self.execute(interface, "status", &[]).await?;
        Ok(parse::parse_status(&reply))
    }

    /// Triggers a scan, then reads back the supplicant's scan cache.
    ///
    /// Fails with `WifiError::Scan` carrying the raw reply when the trigger
    /// is not acknowledged with `OK` (e.g. `FAIL-BUSY`).
    pub async fn scan(&self, interface: &str) -> Result<Vec<ScanCell>> {
        let reply = self.execute(interface, "scan", &[]).await?;
        if reply != OK {
            return Err(WifiError::Scan(reply));
        }
        self.scan_results(interface).await
    }

    /// Reads the scan cache without triggering a new scan.
    pub async fn scan_results(&self, interface: &str) -> Result<Vec<ScanCell>> {
        let reply = self.execute(interface, "scan_results", &[]).await?;
        Ok(parse::parse_scan_results(&reply))
    }

    /// Creates an empty profile and returns its id.
    pub async fn add_network(&self, interface: &str) -> Result<u32> {
        let reply = self.execute(interface, "add_network", &[]).await?;
        // wpa_cli may echo "Selected interface ..." before the id
        let last = reply.lines().last().unwrap_or_default().trim();
        last.parse()
            .map_err(|_| WifiError::ProtocolParse(format!("add_network returned {:?}, expected a network id", reply)))
    }

    pub async fn list_networks(&self, interface: &str) -> Result<Vec<NetworkProfile>> {
        let reply = self.execute(interface, "list_networks", &[]).await?;
        Ok(parse::parse_network_list(&reply))
    }

    /// Writes a raw token value (numbers, `WPA-PSK`, ...).
    pub async fn set_network(&self, interface: &str, id: u32, name: &str, value: &str) -> Result<String> {
        self.execute(interface, "set_network", &[id.to_string(), name.to_string(), value.to_string()])
            .await
    }

    /// Writes a string value, wrapped in the double quotes the control
    /// protocol requires for literal strings (`ssid`, `psk`, ...).
    ///
    /// A value containing `"` or a control character can not be quoted. It
    /// is sent in the unquoted hex form instead, except for `psk` where
    /// unquoted hex means a raw key; there it is `InvalidArgument`.
    pub async fn set_network_string(&self, interface: &str, id: u32, name: &str, value: &str) -> Result<String> {
        let value = if quotable(value) {
            quote(value)
        } else if name == "psk" {
            return Err(WifiError::InvalidArgument(
                "psk must not contain quotes or control characters".to_string(),
            ));
        } else {
            hex(value)
        };
        self.set_network(interface, id, name, &value).await
    }

    pub async fn get_network(&self, interface: &str, id: u32, name: &str) -> Result<String> {
        self.execute(interface, "get_network", &[id.to_string(), name.to_string()])
            .await
    }

    pub async fn enable_network(&self, interface: &str, id: u32) -> Result<String> {
        self.execute(interface, "enable_network", &[id.to_string()]).await
    }

    pub async fn disable_network(&self, interface: &str, id: u32) -> Result<String> {
        self.execute(interface, "disable_network", &[id.to_string()]).await
    }

    /// Selects `id` and disables every other profile of the session.
    pub async fn select_network(&self, interface: &str, id: u32) -> Result<String> {
        self.execute(interface, "select_network", &[id.to_string()]).await
    }

    pub async fn remove_network(&self, interface: &str, id: u32) -> Result<String> {
        self.execute(interface, "remove_network", &[id.to_string()]).await
    }

    /// Makes the supplicant re-read its configuration file.
    pub async fn reconfigure(&self, interface: &str) -> Result<String> {
        self.execute(interface, "reconfigure", &[]).await
    }

    pub async fn save_config(&self, interface: &str) -> Result<String> {
        self.execute(interface, "save_config", &[]).await
    }

    pub async fn disconnect(&self, interface: &str) -> Result<String> {
        self.execute(interface, "disconnect", &[]).await
    }
}

pub(crate) fn require_interface(interface: &str) -> Result<()> {
    if interface.trim().is_empty() {
        return Err(WifiError::InvalidArgument("interface is required".to_string()));
    }
    Ok(())
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

fn quotable(value: &str) -> bool {
    !value.chars().any(|c| c == '"' || c.is_control())
}

fn hex(value: &str) -> String {
    value.bytes().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_wraps_in_double_quotes() {
        assert_eq!(quote("Home Net"), "\"Home Net\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn values_with_quotes_need_hex() {
        assert!(quotable("Home Net"));
        assert!(!quotable("say \"hi\""));
        assert!(!quotable("tab\there"));
        assert_eq!(hex("a\"b"), "612262");
    }

    #[test]
    fn blank_interface_is_rejected() {
        assert!(matches!(require_interface(""), Err(WifiError::InvalidArgument(_))));
        assert!(matches!(require_interface("  "), Err(WifiError::InvalidArgument(_))));
        assert!(require_interface("wlan0").is_ok());
    }
}
