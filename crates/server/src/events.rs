use rigelnet::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
}

/// Line shown in the dashboard log and written to the headless logger.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            message: message.into(),
        }
    }
}

pub fn describe(event: &Event) -> LogEntry {
    let slot = |index: Option<usize>| index.map_or_else(|| "?".to_owned(), |i| i.to_string());

    match event {
        Event::Connected { client_index } => {
            LogEntry::info(format!("Client {} connected", slot(*client_index)))
        }
        Event::Disconnected {
            client_index,
            reason,
            message,
        } => LogEntry::info(format!(
            "Client {} {} ({})",
            slot(*client_index),
            reason.as_str(),
            message
        )),
        Event::ConnectAttemptFailed {
            client_index,
            reason,
        } => LogEntry::warn(format!(
            "Connect attempt on slot {} failed: {:?}",
            slot(*client_index),
            reason
        )),
        Event::BadPassphrase { passphrase, .. } => {
            LogEntry::warn(format!("Refused passphrase {:?}", passphrase))
        }
    }
}

#[cfg(test)]
mod tests {
    use rigelnet::DisconnectReason;

    use super::*;

    #[test]
    fn test_describe_disconnect() {
        let entry = describe(&Event::Disconnected {
            client_index: Some(2),
            reason: DisconnectReason::TimedOut,
            message: "Connection timed out".to_owned(),
        });
        assert_eq!(entry.severity, Severity::Info);
        assert!(entry.message.starts_with("Client 2 "));
        assert!(entry.message.contains("Connection timed out"));
    }

    #[test]
    fn test_bad_passphrase_is_a_warning() {
        let entry = describe(&Event::BadPassphrase {
            client_index: None,
            passphrase: "guess".to_owned(),
        });
        assert_eq!(entry.severity, Severity::Warn);
    }
}
