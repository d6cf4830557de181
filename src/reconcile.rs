//! Turns a desired (ssid, credential, auth) triple into supplicant commands.
//!
//! The supplicant identifies profiles by id, not by SSID, so blindly adding
//! a network on every connect piles up duplicates. The reconciler looks the
//! SSID up first and rewrites the existing profile when there is one:
//!
//! 1. derive the field set from the credential and auth hint
//! 2. `list_networks` and reuse the id of the profile with that SSID,
//!    otherwise `add_network`
//! 3. `set_network` each field, one after the other
//! 4. `enable_network`, `select_network`, `save_config`
//!
//! Any failing command aborts the sequence and is returned as is. Fields
//! already written stay written; the profile may be half configured and it
//! is up to the caller to retry or remove it.
//!
//! All calls against one interface are serialized. Interleaving two
//! reconciliations on the same session could make the second one write
//! into the profile the first one just created.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::control::{ControlClient, ControlTransport, OK, WpaCli};
use crate::error::{Result, WifiError};
use crate::parse::NetworkProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthHint {
    Wep,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    pub auth: Option<AuthHint>,
}

/// How a profile field is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Literal string, sent in double quotes.
    Quoted(String),
    /// Bare token.
    Raw(String),
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    pub id: u32,
    /// `true` when a new profile was added, `false` when one was reused.
    pub created: bool,
    /// `true` when `save_config` answered `OK`.
    pub persisted: bool,
}

/// Field set for a profile, in the order the fields are written.
///
/// - with a credential: WPA-PSK, whatever the hint
/// - without a credential: `key_mgmt NONE`, plus key index 0 with the WEP
///   hint. Absent values (`psk`, `wep_key0`) are not written.
pub fn network_fields(ssid: &str, credential: Option<&str>, options: ConnectOptions) -> Vec<(&'static str, FieldValue)> {
    let mut fields = vec![("ssid", FieldValue::Quoted(ssid.to_string()))];

    match (credential, options.auth) {
        (Some(psk), _) => {
            fields.push(("psk", FieldValue::Quoted(psk.to_string())));
            fields.push(("key_mgmt", FieldValue::Raw("WPA-PSK".to_string())));
        }
        (None, auth) => {
            fields.push(("key_mgmt", FieldValue::Raw("NONE".to_string())));
            if auth == Some(AuthHint::Wep) {
                fields.push(("wep_tx_keyidx", FieldValue::Raw("0".to_string())));
            }
        }
    }

    fields.push(("scan_ssid", FieldValue::Raw("1".to_string())));
    fields
}

pub struct NetworkReconciler<T = WpaCli> {
    client: ControlClient<T>,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<T: ControlTransport> NetworkReconciler<T> {
    pub fn new(client: ControlClient<T>) -> Self {
        NetworkReconciler {
            client,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &ControlClient<T> {
        &self.client
    }

    async fn lock_session(&self, interface: &str) -> OwnedMutexGuard<()> {
        let session = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions.entry(interface.to_string()).or_default().clone()
        };
        session.lock_owned().await
    }

    async fn find_unlocked(&self, interface: &str, ssid: &str) -> Result<Option<NetworkProfile>> {
        let networks = self.client.list_networks(interface).await?;
        Ok(networks.into_iter().find(|n| n.ssid == ssid))
    }

    pub async fn find_network_by_ssid(&self, interface: &str, ssid: &str) -> Result<Option<NetworkProfile>> {
        let _session = self.lock_session(interface).await;
        self.find_unlocked(interface, ssid).await
    }

    /// Creates or rewrites the profile for `ssid` and makes it the active one.
    ///
    /// # Arguments
    /// * `interface` - Interface whose supplicant session holds the profiles
    /// * `ssid` - Network name, must not be empty
    /// * `credential` - Passphrase or WEP key, `None` for an open network
    /// * `options` - Auth hint, see [`network_fields`]
    ///
    /// # Returns
    /// - `Ok(Reconciled)` with the profile id and whether the config was saved
    /// - `Err(WifiError::CommandFailed)` for the first command that failed
    pub async fn add_or_update_network(
        &self,
        interface: &str,
        ssid: &str,
        credential: Option<&str>,
        options: ConnectOptions,
    ) -> Result<Reconciled> {
        if ssid.is_empty() {
            return Err(WifiError::InvalidArgument("ssid must not be empty".to_string()));
        }
        let _session = self.lock_session(interface).await;

        let fields = network_fields(ssid, credential, options);
        debug!(
            interface,
            ssid,
            fields = ?fields.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            "Reconciling network"
        );

        let (id, created) = match self.find_unlocked(interface, ssid).await? {
            Some(network) => (network.id, false),
            None => (self.client.add_network(interface).await?, true),
        };

        for (name, value) in &fields {
            match value {
                FieldValue::Quoted(v) => self.client.set_network_string(interface, id, name, v).await?,
                FieldValue::Raw(v) => self.client.set_network(interface, id, name, v).await?,
            };
        }

        self.client.enable_network(interface, id).await?;
        self.client.select_network(interface, id).await?;
        let persisted = self.client.save_config(interface).await? == OK;

        info!(interface, ssid, id, created, persisted, "Network configured");
        Ok(Reconciled { id, created, persisted })
    }

    /// Removes the profile for `ssid`; `None` when there is none.
    pub async fn remove_network(&self, interface: &str, ssid: &str) -> Result<Option<String>> {
        let _session = self.lock_session(interface).await;
        match self.find_unlocked(interface, ssid).await? {
            Some(network) => Ok(Some(self.client.remove_network(interface, network.id).await?)),
            None => Ok(None),
        }
    }

    pub async fn enable_network(&self, interface: &str, ssid: &str) -> Result<Option<String>> {
        let _session = self.lock_session(interface).await;
        match self.find_unlocked(interface, ssid).await? {
            Some(network) => Ok(Some(self.client.enable_network(interface, network.id).await?)),
            None => Ok(None),
        }
    }

    pub async fn disable_network(&self, interface: &str, ssid: &str) -> Result<Option<String>> {
        let _session = self.lock_session(interface).await;
        match self.find_unlocked(interface, ssid).await? {
            Some(network) => Ok(Some(self.client.disable_network(interface, network.id).await?)),
            None => Ok(None),
        }
    }

    pub async fn select_network(&self, interface: &str, ssid: &str) -> Result<Option<String>> {
        let _session = self.lock_session(interface).await;
        match self.find_unlocked(interface, ssid).await? {
            Some(network) => Ok(Some(self.client.select_network(interface, network.id).await?)),
            None => Ok(None),
        }
    }
}
