use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectAttemptFailedReason {
    Error,
    TimedOut,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    Graceful,
    Error,
    TimedOut,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Error => "dropped after an error",
            DisconnectReason::TimedOut => "timed out",
        }
    }
}

/// Connection lifecycle notifications raised by a node.
///
/// `client_index` is the server slot the event concerns. It is `None` for
/// events raised by a client and for datagrams that never reached a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    BadPassphrase {
        client_index: Option<usize>,
        passphrase: String,
    },
    ConnectAttemptFailed {
        client_index: Option<usize>,
        reason: ConnectAttemptFailedReason,
    },
    Connected {
        client_index: Option<usize>,
    },
    Disconnected {
        client_index: Option<usize>,
        reason: DisconnectReason,
        message: String,
    },
}

impl Event {
    pub fn client_index(&self) -> Option<usize> {
        match self {
            Event::BadPassphrase { client_index, .. }
            | Event::ConnectAttemptFailed { client_index, .. }
            | Event::Connected { client_index }
            | Event::Disconnected { client_index, .. } => *client_index,
        }
    }
}
