//! Long lived listener for the supplicant's unsolicited events.
//!
//! An [`EventMonitor`] runs `wpa_cli -i <iface>` in interactive mode, which
//! attaches to the control socket and prints every event the supplicant
//! broadcasts. A reader task owns the process, splits its output into
//! lines, classifies them with [`crate::events::classify_line`] and pushes
//! the resulting notifications into a bounded channel. Callers pull them
//! with [`EventMonitor::next_event`].
//!
//! The monitor uses a dedicated session, so it never competes with
//! commands sent through [`crate::control::ControlClient`].
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> wlanctl::Result<()> {
//! use wlanctl::monitor::{EventMonitor, MonitorOptions};
//!
//! let mut monitor = EventMonitor::open("wlan0", MonitorOptions::default())?;
//! while let Some(event) = monitor.next_event().await {
//!     println!("{}: {:?}", event.kind(), event);
//! }
//! # Ok(())
//! # }
//! ```

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::control::require_interface;
use crate::error::{Result, WifiError};
use crate::events::{EventKind, MonitorError, MonitorEvent, classify_line, split_lines};
use crate::lifecycle::{SessionLifecycle, SessionState};

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Program attached to the control socket in interactive mode.
    pub program: String,
    /// Prompt the program prints; a line equal to it is not published.
    pub prompt: String,
    /// Upper bound on waiting for the process after a close request.
    pub close_timeout: Duration,
    /// Notifications buffered before the reader task waits for the caller.
    pub capacity: usize,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        MonitorOptions {
            program: "wpa_cli".to_string(),
            prompt: ">".to_string(),
            close_timeout: Duration::from_secs(5),
            capacity: 64,
        }
    }
}

#[derive(Debug)]
pub struct EventMonitor {
    interface: String,
    lifecycle: SessionLifecycle,
    events: Option<mpsc::Receiver<MonitorEvent>>,
    task: Option<JoinHandle<Option<i32>>>,
    cancel: CancellationToken,
    close_timeout: Duration,
    exit_code: Option<i32>,
    pending_close: Option<Option<i32>>,
}

impl EventMonitor {
    /// Starts a monitor session on `interface`.
    ///
    /// A failure to start the process is not returned here; it shows up as
    /// an `Error` notification followed by `Close`, the same way a process
    /// that dies later does.
    pub fn open(interface: &str, options: MonitorOptions) -> Result<Self> {
        require_interface(interface)?;

        let spawned = Command::new(&options.program)
            .arg("-i")
            .arg(interface)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to execute {}: {}", options.program, e);
                return EventMonitor::failed(interface, message, &options);
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return EventMonitor::failed(interface, "monitor process has no output pipes".to_string(), &options);
        };
        let stdin = child.stdin.take();

        debug!(interface, "Monitor attached via {}", options.program);
        EventMonitor::start(interface, stdout, stderr, Some(child), stdin, &options)
    }

    /// Runs the monitor over already open streams instead of a process.
    /// The session ends when `stdout` reaches end of file.
    pub fn from_streams<O, E>(interface: &str, stdout: O, stderr: E, options: &MonitorOptions) -> Result<Self>
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        require_interface(interface)?;
        EventMonitor::start(interface, stdout, stderr, None, None, options)
    }

    fn start<O, E>(
        interface: &str,
        stdout: O,
        stderr: E,
        child: Option<Child>,
        stdin: Option<ChildStdin>,
        options: &MonitorOptions,
    ) -> Result<Self>
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        let cancel = CancellationToken::new();
        let reader = Reader {
            interface: interface.to_string(),
            prompt: options.prompt.clone(),
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(reader.run(stdout, stderr, child, stdin));
        EventMonitor::with_task(interface, rx, task, cancel, options)
    }

    fn failed(interface: &str, message: String, options: &MonitorOptions) -> Result<Self> {
        warn!(interface, "{}", message);
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            let _ = tx
                .send(MonitorEvent::Error {
                    error: MonitorError::Transport(message),
                })
                .await;
            None
        });
        EventMonitor::with_task(interface, rx, task, CancellationToken::new(), options)
    }

    fn with_task(
        interface: &str,
        events: mpsc::Receiver<MonitorEvent>,
        task: JoinHandle<Option<i32>>,
        cancel: CancellationToken,
        options: &MonitorOptions,
    ) -> Result<Self> {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.open()?;
        Ok(EventMonitor {
            interface: interface.to_string(),
            lifecycle,
            events: Some(events),
            task: Some(task),
            cancel,
            close_timeout: options.close_timeout,
            exit_code: None,
            pending_close: None,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Next notification, in the order the session produced them.
    ///
    /// The last notification is always `Close`; after it this returns
    /// `None`.
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        if let Some(events) = self.events.as_mut() {
            if let Some(event) = events.recv().await {
                return Some(event);
            }
            // reader task is gone, so is the process
            self.events = None;
            self.reap().await;
        }
        self.pending_close.take().map(|code| MonitorEvent::Close { code })
    }

    /// Waits for the first notification of `kind`, skipping the others.
    ///
    /// Returns `Ok(None)` when the session closes before such an event.
    pub async fn wait_for(&mut self, kind: EventKind, timeout: Duration) -> Result<Option<MonitorEvent>> {
        let wait = async {
            while let Some(event) = self.next_event().await {
                if event.kind() == kind {
                    return Some(event);
                }
            }
            None
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| WifiError::Timeout {
                command: format!("wait for {kind}"),
                secs: timeout.as_secs(),
            })
    }

    /// Terminates the session.
    ///
    /// Waits at most `close_timeout` for the process to exit, then gives up
    /// on it. Notifications not yet read are discarded and a single `Close`
    /// is queued. Calling this again is a no-op.
    pub async fn close(&mut self) {
        if !self.lifecycle.begin_close() {
            return;
        }
        debug!(interface = %self.interface, "Closing monitor");
        self.cancel.cancel();
        // unread notifications are discarded; this also unblocks the reader
        self.events = None;

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.close_timeout, &mut task).await {
                Ok(Ok(code)) => self.exit_code = code,
                Ok(Err(e)) => warn!(interface = %self.interface, "Monitor task failed: {}", e),
                Err(_) => {
                    warn!(
                        interface = %self.interface,
                        "Monitor did not stop within {:?}, forcing close",
                        self.close_timeout
                    );
                    task.abort();
                }
            }
        }

        if self.lifecycle.finish() {
            self.pending_close = Some(self.exit_code);
        }
    }

    async fn reap(&mut self) {
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(code) => self.exit_code = code,
                Err(e) => warn!(interface = %self.interface, "Monitor task failed: {}", e),
            }
        }
        if self.lifecycle.finish() {
            debug!(interface = %self.interface, code = ?self.exit_code, "Monitor closed");
            self.pending_close = Some(self.exit_code);
        }
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

struct Reader {
    interface: String,
    prompt: String,
    tx: mpsc::Sender<MonitorEvent>,
    cancel: CancellationToken,
}

impl Reader {
    async fn run<O, E>(self, stdout: O, stderr: E, child: Option<Child>, stdin: Option<ChildStdin>) -> Option<i32>
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        // interactive wpa_cli quits on end of input
        let _stdin = stdin;
        let mut out = BufReader::new(stdout);
        let mut err = BufReader::new(stderr);
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut err_open = true;

        let cancelled = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break true,
                read = out.read_until(b'\n', &mut out_buf) => match read {
                    Ok(0) => {
                        if !out_buf.is_empty() {
                            self.publish(&String::from_utf8_lossy(&out_buf)).await;
                        }
                        break false;
                    }
                    Ok(_) => {
                        self.publish(&String::from_utf8_lossy(&out_buf)).await;
                        out_buf.clear();
                    }
                    Err(e) => {
                        self.emit(MonitorEvent::Error { error: MonitorError::Transport(e.to_string()) }).await;
                        break false;
                    }
                },
                read = err.read_until(b'\n', &mut err_buf), if err_open => match read {
                    Ok(0) => err_open = false,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&err_buf).trim().to_string();
                        err_buf.clear();
                        if !text.is_empty() {
                            self.emit(MonitorEvent::Error { error: MonitorError::Stderr(text) }).await;
                        }
                    }
                    Err(e) => {
                        self.emit(MonitorEvent::Error { error: MonitorError::Transport(e.to_string()) }).await;
                        err_open = false;
                    }
                },
            }
        };

        let mut child = child?;
        if !cancelled {
            tokio::select! {
                status = child.wait() => return status.ok().and_then(|s| s.code()),
                _ = self.cancel.cancelled() => {}
            }
        }
        if let Err(e) = child.start_kill() {
            debug!(interface = %self.interface, "Monitor process already gone: {}", e);
        }
        child.wait().await.ok().and_then(|s| s.code())
    }

    async fn publish(&self, chunk: &str) {
        for line in split_lines(chunk, &self.prompt) {
            for event in classify_line(line) {
                if !matches!(event.kind(), EventKind::Data) {
                    debug!(interface = %self.interface, kind = %event.kind(), "{}", line);
                }
                self.emit(event).await;
            }
        }
    }

    async fn emit(&self, event: MonitorEvent) {
        // a full channel must not hold up cancellation
        tokio::select! {
            _ = self.tx.send(event) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}
