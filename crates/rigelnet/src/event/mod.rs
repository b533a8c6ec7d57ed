mod queue;
mod types;

pub use queue::{DEFAULT_EVENT_CAPACITY, EventListener, EventQueue, ListenerId};
pub use types::{ConnectAttemptFailedReason, DisconnectReason, Event};
