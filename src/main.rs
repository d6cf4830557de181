use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use wlanctl::{
    config::{self, Config, NetworkConfig},
    interface,
    service::{ApControl, ApOptions},
    AuthHint, ConnectOptions, EventKind, MonitorEvent, NetworkProfile, ScanCell, StatusRecord, Wifi,
};

#[derive(Parser)]
#[command(name = "wlanctl")]
#[command(about = "Drive wpa_supplicant from the command line and watch its events")]
#[command(version)]
struct Cli {
    /// Interface: a name (wlan0), a radio (phy0), `onboard` or `usb`
    #[arg(short, long, global = true)]
    interface: Option<String>,

    /// Print machine readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List WiFi interfaces
    Interfaces,

    /// Show the supplicant status of the interface
    Status,

    /// Show whether the interface is connected, disconnected or an AP
    State,

    /// Scan for WiFi networks
    Scan {
        /// Scan with the radio tool (channel and security included)
        #[arg(long, conflicts_with = "cached")]
        radio: bool,

        /// Only read the supplicant's scan cache
        #[arg(long)]
        cached: bool,
    },

    /// List configured network profiles
    Networks,

    /// Connect to a WiFi network
    Connect {
        /// SSID of the network to connect to
        ssid: String,

        /// Password for the network (uses saved password if not provided)
        #[arg(short, long)]
        password: Option<String>,

        /// WEP hint: sets key index 0 on a network without a password
        #[arg(long)]
        wep: bool,

        /// Save credentials to config file
        #[arg(short, long)]
        save: bool,

        /// Wait up to this many seconds for the connection to complete
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Disconnect from the current network
    Disconnect,

    /// Remove the profile of a network
    Remove { ssid: String },

    /// Enable the profile of a network
    Enable { ssid: String },

    /// Disable the profile of a network
    Disable { ssid: String },

    /// Select a network, disabling the others
    Select { ssid: String },

    /// Print supplicant events until interrupted
    Monitor,

    /// Bring the link up
    Up,

    /// Take the link down
    Down,

    /// Take the link down and up again
    Reset {
        /// Pause between down and up, in milliseconds
        #[arg(long, default_value = "1000")]
        delay: u64,
    },

    /// Control the access point service
    Ap {
        #[command(subcommand)]
        action: ApAction,
    },

    /// Save network credentials to config file
    SaveNetwork {
        /// SSID of the network
        ssid: String,

        /// Password for the network
        #[arg(short, long)]
        password: Option<String>,

        /// WEP hint: sets key index 0 on a network without a password
        #[arg(long)]
        wep: bool,
    },

    /// Show saved configuration
    ShowConfig,
}

#[derive(Subcommand)]
enum ApAction {
    /// Start the AP service, optionally writing its configuration first
    Start {
        #[command(flatten)]
        settings: ApSettings,
    },
    /// Stop the AP service
    Stop,
    /// Show the AP service status
    Status,
    /// Start the AP service at boot
    Enable,
    /// Do not start the AP service at boot
    Disable,
    /// Write the AP service configuration
    Configure {
        #[command(flatten)]
        settings: ApSettings,
    },
}

#[derive(clap::Args)]
struct ApSettings {
    /// Access point name
    #[arg(long)]
    ssid: Option<String>,

    /// Access point passphrase
    #[arg(long)]
    passphrase: Option<String>,

    /// Interface sharing its internet connection
    #[arg(long)]
    internet: Option<String>,

    /// Gateway address of the access point
    #[arg(long)]
    gateway: Option<String>,

    /// Do not broadcast the SSID
    #[arg(long)]
    hidden: bool,
}

impl ApSettings {
    fn options(&self, iface: &str) -> Option<ApOptions> {
        let ssid = self.ssid.as_ref()?;
        let mut options = ApOptions::new(ssid);
        options.iface = iface.to_string();
        options.iface_internet = self.internet.clone();
        options.hidden = self.hidden;
        if let Some(passphrase) = &self.passphrase {
            options.passphrase = passphrase.clone();
        }
        if let Some(gateway) = &self.gateway {
            options.gateway = gateway.clone();
        }
        Some(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = Config::load().unwrap_or_default();
    let iface = cfg.interface(cli.interface.as_deref()).to_string();
    let wifi = Wifi::from_config(&cfg.control);
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Interfaces => cmd_interfaces(&out).await,
        Commands::Status => cmd_status(&wifi, &iface, &out).await,
        Commands::State => cmd_state(&wifi, &iface, &out).await,
        Commands::Scan { radio, cached } => cmd_scan(&wifi, &iface, radio, cached, &out).await,
        Commands::Networks => cmd_networks(&wifi, &iface, &out).await,
        Commands::Connect {
            ssid,
            password,
            wep,
            save,
            wait,
        } => cmd_connect(&wifi, &cfg, &iface, &ssid, password, wep, save, wait).await,
        Commands::Disconnect => {
            wifi.disconnect(&iface).await?;
            println!("Disconnected {}.", iface);
            Ok(())
        }
        Commands::Remove { ssid } => by_ssid("Removed", &ssid, wifi.remove_network(&iface, &ssid).await?),
        Commands::Enable { ssid } => by_ssid("Enabled", &ssid, wifi.enable_network(&iface, &ssid).await?),
        Commands::Disable { ssid } => by_ssid("Disabled", &ssid, wifi.disable_network(&iface, &ssid).await?),
        Commands::Select { ssid } => by_ssid("Selected", &ssid, wifi.select_network(&iface, &ssid).await?),
        Commands::Monitor => cmd_monitor(&wifi, &cfg, &iface, &out).await,
        Commands::Up => Ok(wifi.up(&iface).await?),
        Commands::Down => Ok(wifi.down(&iface).await?),
        Commands::Reset { delay } => Ok(wifi.reset(&iface, Duration::from_millis(delay)).await?),
        Commands::Ap { action } => cmd_ap(&cfg, &iface, action).await,
        Commands::SaveNetwork { ssid, password, wep } => cmd_save_network(&ssid, password, wep),
        Commands::ShowConfig => cmd_show_config(),
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Output {
    json: bool,
}

impl Output {
    /// Prints `value` as JSON when asked to, otherwise runs `table`.
    fn emit<T: Serialize>(&self, value: &T, table: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            table(value);
        }
        Ok(())
    }
}

async fn cmd_interfaces(out: &Output) -> Result<()> {
    let interfaces = interface::list_wifi_interfaces().await?;

    out.emit(&interfaces, |interfaces| {
        if interfaces.is_empty() {
            println!("No WiFi interfaces found.");
            return;
        }

        println!("{:<16} {:<6} {:<20} {}", "INTERFACE", "PHY", "ADDRESS", "TYPE");
        println!("{}", "-".repeat(52));

        for iface in interfaces {
            let iface_type = if iface.is_usb { "USB" } else { "Built-in" };
            let addr = iface.addr.as_deref().unwrap_or("-");
            println!("{:<16} {:<6} {:<20} {}", iface.name, iface.phy, addr, iface_type);
        }
    })
}

async fn cmd_status(wifi: &Wifi, iface: &str, out: &Output) -> Result<()> {
    let status = wifi.status(iface).await?;
    out.emit(&status, |status| display_status(iface, status))
}

async fn cmd_state(wifi: &Wifi, iface: &str, out: &Output) -> Result<()> {
    let state = wifi.state(iface).await?;
    out.emit(&state, |state| println!("{}", state))
}

async fn cmd_scan(wifi: &Wifi, iface: &str, radio: bool, cached: bool, out: &Output) -> Result<()> {
    if !out.json {
        println!("Scanning on interface: {}", iface);
        println!();
    }

    let mut cells = if radio {
        wifi.radio_scan(iface).await?
    } else if cached {
        wifi.scan_results(iface).await?
    } else {
        wifi.scan(iface).await?
    };
    cells.sort_by(|a, b| {
        b.signal
            .unwrap_or(f64::MIN)
            .total_cmp(&a.signal.unwrap_or(f64::MIN))
    });

    out.emit(&cells, |cells| display_cells(cells))
}

async fn cmd_networks(wifi: &Wifi, iface: &str, out: &Output) -> Result<()> {
    let networks = wifi.list_networks(iface).await?;
    out.emit(&networks, |networks| display_networks(networks))
}

#[allow(clippy::too_many_arguments)]
async fn cmd_connect(
    wifi: &Wifi,
    cfg: &Config,
    iface: &str,
    ssid: &str,
    password: Option<String>,
    wep: bool,
    save: bool,
    wait: Option<u64>,
) -> Result<()> {
    let saved = cfg.find_network(ssid);

    // Get password from argument or config
    let (password, auth) = match password {
        Some(p) => (Some(p), wep.then_some(AuthHint::Wep)),
        None => match saved {
            Some(network) => {
                println!("Using saved credentials for '{}'", ssid);
                (network.password.clone(), network.auth.or(wep.then_some(AuthHint::Wep)))
            }
            None => {
                println!("No password given for '{}', configuring an open network", ssid);
                (None, wep.then_some(AuthHint::Wep))
            }
        },
    };

    // Subscribe before touching the profile so the connect event is not missed
    let mut monitor = match wait {
        Some(_) => Some(wifi.monitor(iface, cfg.control.monitor_options()).await?),
        None => None,
    };

    println!("Connecting to '{}' on interface {}...", ssid, iface);
    let outcome = wifi
        .add_or_update_network(iface, ssid, password.as_deref(), ConnectOptions { auth })
        .await?;
    let verb = if outcome.created { "Added" } else { "Updated" };
    println!("{} network {} ({}).", verb, outcome.id, if outcome.persisted { "saved" } else { "not saved" });

    if let (Some(monitor), Some(secs)) = (monitor.as_mut(), wait) {
        let waited = wait_connected(monitor, Duration::from_secs(secs)).await;
        monitor.close().await;
        waited?;
        println!("Connected successfully!");
    }

    // Save credentials if requested
    if save {
        let mut cfg = cfg.clone();
        cfg.add_network(NetworkConfig {
            ssid: ssid.to_string(),
            password,
            auth,
            interface: Some(iface.to_string()),
        });
        cfg.save()?;
        println!("Credentials saved to config.");
    }

    // Show status after connecting
    println!();
    let status = wifi.status(iface).await?;
    display_status(iface, &status);

    Ok(())
}

async fn wait_connected(monitor: &mut wlanctl::EventMonitor, timeout: Duration) -> Result<()> {
    let wait = async {
        while let Some(event) = monitor.next_event().await {
            match event.kind() {
                EventKind::Connected => return Ok(()),
                EventKind::InvalidKey => bail!("The network rejected the key"),
                _ => {}
            }
        }
        bail!("Monitor closed before the connection completed")
    };
    tokio::time::timeout(timeout, wait)
        .await
        .with_context(|| format!("No connection within {}s", timeout.as_secs()))?
}

fn by_ssid(verb: &str, ssid: &str, reply: Option<String>) -> Result<()> {
    match reply {
        Some(_) => {
            println!("{} '{}'.", verb, ssid);
            Ok(())
        }
        None => bail!("No network profile for '{}'", ssid),
    }
}

async fn cmd_monitor(wifi: &Wifi, cfg: &Config, iface: &str, out: &Output) -> Result<()> {
    let mut monitor = wifi.monitor(iface, cfg.control.monitor_options()).await?;
    if !out.json {
        println!("Monitoring {} (Ctrl-C to stop)", monitor.interface());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        if interrupted {
            monitor.close().await;
        }
        let event = tokio::select! {
            event = monitor.next_event() => event,
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                continue;
            }
        };
        let Some(event) = event else { break };

        if out.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            display_event(&event);
        }
    }

    Ok(())
}

async fn cmd_ap(cfg: &Config, iface: &str, action: ApAction) -> Result<()> {
    let ap = ApControl::systemd(&cfg.ap.service);

    match action {
        ApAction::Start { settings } => {
            ap.start(settings.options(iface).as_ref()).await?;
            println!("Started {}.", ap.service());
        }
        ApAction::Stop => {
            ap.stop().await?;
            println!("Stopped {}.", ap.service());
        }
        ApAction::Status => {
            let active = ap.is_active().await?;
            let enabled = ap.is_enabled().await?;
            println!("Service: {}", ap.service());
            println!("Active:  {}", if active { "yes" } else { "no" });
            println!("Enabled: {}", if enabled { "yes" } else { "no" });
            println!();
            println!("{}", ap.status().await?);
        }
        ApAction::Enable => {
            ap.enable().await?;
            println!("Enabled {}.", ap.service());
        }
        ApAction::Disable => {
            ap.disable().await?;
            println!("Disabled {}.", ap.service());
        }
        ApAction::Configure { settings } => {
            let options = settings
                .options(iface)
                .context("--ssid is required to configure the access point")?;
            let path = ap.configure(&options).await?;
            println!("Wrote {}.", path.display());
        }
    }

    Ok(())
}

fn cmd_save_network(ssid: &str, password: Option<String>, wep: bool) -> Result<()> {
    let mut cfg = Config::load().unwrap_or_default();

    cfg.add_network(NetworkConfig {
        ssid: ssid.to_string(),
        password,
        auth: wep.then_some(AuthHint::Wep),
        interface: None,
    });

    cfg.save()?;

    let path = config::config_path()?;
    println!("Saved network '{}' to {}", ssid, path.display());

    Ok(())
}

fn cmd_show_config() -> Result<()> {
    let path = config::config_path()?;
    println!("Config file: {}", path.display());
    println!();

    let cfg = Config::load()?;

    println!("Default interface: {}", cfg.interface(None));
    println!("Control program:   {}", cfg.control.program);
    println!("AP service:        {}", cfg.ap.service);
    println!();

    if cfg.networks.is_empty() {
        println!("No saved networks.");
    } else {
        println!("{:<24} {:<20} {:<6} {}", "SSID", "INTERFACE", "AUTH", "PASSWORD");
        println!("{}", "-".repeat(66));
        for network in &cfg.networks {
            let iface = network.interface.as_deref().unwrap_or("-");
            let auth = if network.auth == Some(AuthHint::Wep) { "WEP" } else { "-" };
            let masked_pw = match &network.password {
                Some(pw) => "*".repeat(pw.len().min(12)),
                None => "(open)".to_string(),
            };
            println!("{:<24} {:<20} {:<6} {}", network.ssid, iface, auth, masked_pw);
        }
    }

    Ok(())
}

fn display_status(iface: &str, status: &StatusRecord) {
    println!("Interface: {}", iface);
    println!(
        "State:     {}",
        status.wpa_state().map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
    );
    println!("Mode:      {}", status.mode());

    match status.ssid() {
        Some(ssid) => println!("Connected: {}", ssid),
        None => println!("Connected: (none)"),
    }
    if let Some(bssid) = status.bssid() {
        println!("BSSID:     {}", bssid);
    }
    if let Some(ip) = status.ip_address() {
        println!("IP:        {}", ip);
    }
}

fn display_networks(networks: &[NetworkProfile]) {
    if networks.is_empty() {
        println!("No configured networks.");
        return;
    }

    println!("{:<4} {:<32} {:<18} {}", "ID", "SSID", "BSSID", "FLAGS");
    println!("{}", "-".repeat(70));
    for network in networks {
        println!(
            "{:<4} {:<32} {:<18} {}",
            network.id,
            truncate_ssid(&network.ssid, 32),
            network.essid,
            network.flags
        );
    }
}

fn display_cells(cells: &[ScanCell]) {
    if cells.is_empty() {
        println!("No networks found.");
        return;
    }

    println!(
        "{:<32} {:<18} {:>5} {:>4} {:>8} {}",
        "SSID", "BSSID", "FREQ", "CH", "SIGNAL", "SECURITY"
    );
    println!("{}", "-".repeat(84));

    for cell in cells {
        let freq = cell.frequency.map(|f| f.to_string()).unwrap_or_default();
        let channel = cell.channel.map(|c| c.to_string()).unwrap_or_default();
        let signal = cell.signal.map(|s| format!("{:.0}dBm", s)).unwrap_or_default();
        let security = cell.security.map(|s| s.to_string()).unwrap_or_default();
        println!(
            "{:<32} {:<18} {:>5} {:>4} {:>8} {} {}",
            truncate_ssid(&cell.ssid, 32),
            cell.bssid,
            freq,
            channel,
            signal,
            signal_to_bar(cell.signal),
            security
        );
    }
}

fn display_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Data { raw } => println!("data:    {}", raw),
        MonitorEvent::Control(control) => println!("control: {} {:?}", control.tag, control.fields),
        MonitorEvent::Error { error } => eprintln!("error:   {}", error),
        MonitorEvent::Close { code } => match code {
            Some(code) => println!("closed (exit code {})", code),
            None => println!("closed"),
        },
        other => println!("{:<8} {:?}", format!("{}:", other.kind()), other.fields().cloned().unwrap_or_default()),
    }
}

/// Truncates an SSID to fit within a maximum length, appending "...".
fn truncate_ssid(ssid: &str, max_len: usize) -> String {
    if ssid.chars().count() > max_len {
        let kept: String = ssid.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    } else {
        ssid.to_string()
    }
}

/// Four segment bar for a signal level in dBm.
fn signal_to_bar(signal: Option<f64>) -> &'static str {
    match signal {
        Some(s) if s >= -50.0 => "████",
        Some(s) if s >= -60.0 => "███░",
        Some(s) if s >= -70.0 => "██░░",
        Some(s) if s >= -80.0 => "█░░░",
        _ => "░░░░",
    }
}
