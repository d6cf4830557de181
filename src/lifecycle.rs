use serde::Serialize;
use std::fmt;

use crate::error::{Result, WifiError};

/// Lifecycle of a monitor session. `Idle` is a session that was never opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        })
    }
}

/// Open -> Closing -> Closed, each edge taken at most once.
///
/// `Closed` is terminal: a session is never reopened, a new monitor has to
/// be built instead.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        SessionLifecycle::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        SessionLifecycle {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn open(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Open;
                Ok(())
            }
            other => Err(WifiError::InvalidArgument(format!(
                "monitor session is {other} and can not be opened again"
            ))),
        }
    }

    /// Starts closing. Returns `false` when a close is already in flight
    /// or done, in which case the caller must not close again.
    pub fn begin_close(&mut self) -> bool {
        if self.state == SessionState::Open {
            self.state = SessionState::Closing;
            true
        } else {
            false
        }
    }

    /// Moves to `Closed`. Returns `true` only for the call that performed
    /// the transition, which is the one that publishes the close notice.
    pub fn finish(&mut self) -> bool {
        match self.state {
            SessionState::Open | SessionState::Closing => {
                self.state = SessionState::Closed;
                true
            }
            SessionState::Idle | SessionState::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut lc = SessionLifecycle::new();
        assert_eq!(lc.state(), SessionState::Idle);
        lc.open().unwrap();
        assert!(lc.is_open());
        assert!(lc.begin_close());
        assert_eq!(lc.state(), SessionState::Closing);
        assert!(lc.finish());
        assert_eq!(lc.state(), SessionState::Closed);
    }

    #[test]
    fn only_one_close_in_flight() {
        let mut lc = SessionLifecycle::new();
        lc.open().unwrap();
        assert!(lc.begin_close());
        assert!(!lc.begin_close());
        assert!(lc.finish());
        assert!(!lc.finish());
        assert!(!lc.begin_close());
    }

    #[test]
    fn process_exit_closes_without_closing_state() {
        let mut lc = SessionLifecycle::new();
        lc.open().unwrap();
        assert!(lc.finish());
        assert!(!lc.begin_close());
    }

    #[test]
    fn closed_session_can_not_reopen() {
        let mut lc = SessionLifecycle::new();
        lc.open().unwrap();
        lc.finish();
        assert!(matches!(lc.open(), Err(WifiError::InvalidArgument(_))));
    }

    #[test]
    fn idle_session_has_nothing_to_finish() {
        let mut lc = SessionLifecycle::new();
        assert!(!lc.finish());
        assert!(!lc.begin_close());
    }
}
