use thiserror::Error;

/// Errors raised while talking to the supplicant, the radio tool or the
/// service manager.
#[derive(Error, Debug)]
pub enum WifiError {
    /// The control interface answered with its `FAIL` sentinel.
    #[error("Command failed: {}", command_line(.command, .args))]
    CommandFailed { command: String, args: Vec<String> },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Can not resolve interface '{0}'")]
    NotResolvable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected reply: {0}")]
    ProtocolParse(String),

    #[error("Command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    /// The scan trigger did not answer `OK`; carries the raw reply.
    #[error("Scan was not started: {0}")]
    Scan(String),

    #[error("Service '{service}': {message}")]
    Service { service: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WifiError>;

impl WifiError {
    pub fn command_failed(command: &str, args: &[String]) -> Self {
        WifiError::CommandFailed {
            command: command.to_string(),
            args: args.to_vec(),
        }
    }
}

fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_names_the_full_command_line() {
        let err = WifiError::command_failed("set_network", &["0".into(), "scan_ssid".into(), "1".into()]);
        assert_eq!(err.to_string(), "Command failed: set_network 0 scan_ssid 1");
    }

    #[test]
    fn command_failed_without_args() {
        let err = WifiError::command_failed("save_config", &[]);
        assert_eq!(err.to_string(), "Command failed: save_config");
    }
}
