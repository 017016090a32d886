use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    NotConnected,
    Connecting,
    Connected,
    ConnectFail,
    ConnectInterrupted,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::NotConnected => "not-connected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::ConnectFail => "connect-fail",
            ConnectionStatus::ConnectInterrupted => "connect-interrupted",
        };
        f.write_str(s)
    }
}

/// Text shown next to the connection indicator. `retry` is only used for
/// the interrupted state.
pub fn status_text(status: ConnectionStatus, retry: u32) -> String {
    match status {
        ConnectionStatus::NotConnected => {
            "Not connected to the server. Create or join a room.".to_string()
        }
        ConnectionStatus::Connecting => "Connecting to the server, please wait".to_string(),
        ConnectionStatus::Connected => "Connected to the server".to_string(),
        ConnectionStatus::ConnectFail => {
            "Could not connect to the server. Reload and create a new room.".to_string()
        }
        ConnectionStatus::ConnectInterrupted => {
            format!("Connection interrupted, reconnection attempt {}", retry)
        }
    }
}
