//! Error types for sandctl.

/// Result type alias for sandctl operations.
pub type Result<T> = std::result::Result<T, SandctlError>;

/// Main error type for the sandbox supervisor and task monitor.
#[derive(Debug, thiserror::Error)]
pub enum SandctlError {
    /// A sandbox is already recorded as running
    #[error("Sandbox '{name}' is already running, stop it first")]
    AlreadyRunning { name: String },

    /// One or more ports required by the sandbox are taken
    #[error("Port(s) {ports:?} are not available, stop the app(s) using them first")]
    PortInUse { ports: Vec<u16> },

    /// The sandbox executable could not be spawned
    #[error("Could not start process {executable}: {source}")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending a request or polling failed at the network level
    #[error("Unable to connect to remote service: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a non-success status
    #[error("Remote failure ({status}): {message}")]
    Remote { status: u16, message: String },

    /// A response did not have the expected shape
    #[error("Error parsing response: {0}")]
    Parse(String),

    /// A finished task carried a result that could not be decoded
    #[error("Error decoding task result: {0}")]
    ResultDecode(#[source] serde_json::Error),

    /// The persisted runtime state is unreadable
    #[error("State error: {0}")]
    State(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SandctlError {
    /// Create a new already-running error
    pub fn already_running(name: impl Into<String>) -> Self {
        Self::AlreadyRunning { name: name.into() }
    }

    /// Create a new launch error
    pub fn launch(executable: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            executable: executable.into(),
            source,
        }
    }

    /// Create a new remote error
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Precondition violations are reported to the user, never retried
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. } | Self::PortInUse { .. })
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Protocol and decode failures point at a server/CLI version mismatch
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::ResultDecode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_message_names_sandbox() {
        let err = SandctlError::already_running("box1");
        assert_eq!(err.to_string(), "Sandbox 'box1' is already running, stop it first");
        assert!(err.is_precondition());
    }

    #[test]
    fn test_port_in_use_lists_every_port() {
        let err = SandctlError::PortInUse {
            ports: vec![8080, 4848],
        };
        assert!(err.to_string().contains("[8080, 4848]"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_protocol_classification() {
        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(SandctlError::ResultDecode(decode).is_protocol());
        assert!(SandctlError::parse("no task id").is_protocol());
        assert!(!SandctlError::state("broken").is_protocol());
    }
}
