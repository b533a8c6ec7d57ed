use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use super::config::NodeConfig;
use super::endpoint::{NetworkEndpoint, SendStatus};
use super::error::NetError;
use super::local::LocalLinkEnd;
use super::protocol::{PacketKind, ProtocolError};
use super::recv_buffer::{RecvBuffer, StoreOutcome};
use super::remote::{LatencySamples, RemoteInfo};
use super::send_buffer::{AckOutcome, RetransmitPredicate, SendBuffer};
use super::stats::Telemetry;
use crate::codec::Packet;
use crate::event::{ConnectAttemptFailedReason, DisconnectReason, Event};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectorStatus {
    #[default]
    Disconnected,
    Connecting,
    Accepting,
    Connected,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorStatus::Disconnected => "disconnected",
            ConnectorStatus::Connecting => "connecting",
            ConnectorStatus::Accepting => "accepting",
            ConnectorStatus::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    BadPassphrase(String),
    /// Not a well-formed HELLO.
    Ignored,
}

/// Passphrase carried by a HELLO datagram, or `None` for anything else.
pub fn hello_passphrase(packet: &Packet) -> Option<String> {
    let mut packet = Packet::from(packet.as_bytes());
    let tag: u32 = packet.extract().ok()?;
    if PacketKind::from_tag(tag) != Some(PacketKind::Hello) {
        return None;
    }
    packet.extract().ok()
}

/// One end of a RigelNet connection.
///
/// The connector never owns a socket; the node lends its endpoint to every
/// call that may transmit.
#[derive(Debug)]
pub struct Connector {
    status: ConnectorStatus,
    remote: RemoteInfo,
    send_buffer: SendBuffer,
    recv_buffer: RecvBuffer,
    latency_samples: LatencySamples,
    passphrase: String,
    timeout_limit: Duration,
    retransmit_predicate: RetransmitPredicate,
    slot_index: Option<usize>,
    client_index: Option<usize>,
    local_link: Option<LocalLinkEnd>,
    events: VecDeque<Event>,
}

impl Connector {
    /// `slot_index` is the server slot this connector occupies, `None` on a client.
    pub fn new(config: &NodeConfig, slot_index: Option<usize>) -> Self {
        Self {
            status: ConnectorStatus::Disconnected,
            remote: RemoteInfo::default(),
            send_buffer: SendBuffer::new(config.max_packet_size),
            recv_buffer: RecvBuffer::new(),
            latency_samples: LatencySamples::default(),
            passphrase: config.passphrase.clone(),
            timeout_limit: config.timeout_limit,
            retransmit_predicate: config.retransmit_predicate,
            slot_index,
            client_index: slot_index,
            local_link: None,
            events: VecDeque::new(),
        }
    }

    pub fn status(&self) -> ConnectorStatus {
        self.status
    }

    pub fn remote_info(&self) -> &RemoteInfo {
        &self.remote
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote.addr
    }

    /// On a server slot, the slot index. On a client, the index the server
    /// assigned once connected.
    pub fn client_index(&self) -> Option<usize> {
        self.client_index
    }

    pub fn is_connected_locally(&self) -> bool {
        self.local_link.is_some()
    }

    pub fn timeout_limit(&self) -> Duration {
        self.timeout_limit
    }

    pub fn set_timeout_limit(&mut self, limit: Duration) {
        self.timeout_limit = limit;
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), NetError> {
        if self.status != ConnectorStatus::Disconnected {
            return Err(NetError::AlreadyConnected);
        }

        self.reset_buffers();
        self.remote = RemoteInfo::new(addr);
        self.status = ConnectorStatus::Connecting;
        log::debug!("Connecting to {}", addr);
        Ok(())
    }

    pub fn try_accept(&mut self, addr: SocketAddr, hello: &Packet) -> AcceptOutcome {
        if self.status != ConnectorStatus::Disconnected {
            return AcceptOutcome::Ignored;
        }
        let Some(passphrase) = hello_passphrase(hello) else {
            return AcceptOutcome::Ignored;
        };
        if passphrase != self.passphrase {
            return AcceptOutcome::BadPassphrase(passphrase);
        }

        self.reset_buffers();
        self.remote = RemoteInfo::new(addr);
        self.status = ConnectorStatus::Accepting;
        log::debug!("Accepting {} into slot {:?}", addr, self.slot_index);
        AcceptOutcome::Accepted
    }

    /// Client side of an in-process connection to server slot `client_index`.
    pub fn connect_local(&mut self, link: LocalLinkEnd, client_index: usize) -> Result<(), NetError> {
        if self.status != ConnectorStatus::Disconnected {
            return Err(NetError::AlreadyConnected);
        }

        self.reset_buffers();
        self.remote = RemoteInfo::default();
        self.local_link = Some(link);
        self.client_index = Some(client_index);
        self.start_session();
        Ok(())
    }

    pub fn accept_local(&mut self, link: LocalLinkEnd) -> Result<(), NetError> {
        if self.status != ConnectorStatus::Disconnected {
            return Err(NetError::AlreadyConnected);
        }

        self.reset_buffers();
        self.remote = RemoteInfo::default();
        self.local_link = Some(link);
        self.start_session();
        Ok(())
    }

    /// Drops the connection immediately. Does nothing when already disconnected.
    pub fn disconnect(&mut self, endpoint: Option<&mut NetworkEndpoint>, notify: bool, message: &str) {
        if self.status == ConnectorStatus::Disconnected {
            return;
        }

        let notifies_remote = matches!(
            self.status,
            ConnectorStatus::Connected | ConnectorStatus::Accepting
        );
        if notify && notifies_remote && self.local_link.is_none() {
            if let (Some(endpoint), Some(addr)) = (endpoint, self.remote.addr) {
                let mut packet = Packet::new();
                packet.append(&PacketKind::Disconnect.tag()).append(message);
                if let Err(e) = endpoint.send_to(packet.as_bytes(), addr) {
                    log::debug!("Failed to notify {} of disconnect: {}", addr, e);
                }
            }
        }

        log::info!("{} {}: {}", self.describe(), DisconnectReason::Graceful.as_str(), message);
        self.reset_all(DisconnectReason::Graceful, message);
        self.events.push_back(Event::Disconnected {
            client_index: self.slot_index,
            reason: DisconnectReason::Graceful,
            message: message.to_owned(),
        });
    }

    /// Resets the connector when the peer went silent for longer than the
    /// timeout limit, or when the local peer ended the link.
    pub fn check_for_timeout(&mut self) {
        if self.status == ConnectorStatus::Disconnected {
            return;
        }

        if let Some(link) = &self.local_link {
            if let Some((reason, message)) = link.ended() {
                log::info!("{} {}: {}", self.describe(), reason.as_str(), message);
                self.reset_all(reason, &message);
                self.events.push_back(Event::Disconnected {
                    client_index: self.slot_index,
                    reason,
                    message,
                });
            }
            return;
        }

        if self.timeout_limit.is_zero() || self.remote.time_since_activity() < self.timeout_limit {
            return;
        }

        log::info!("{} timed out", self.describe());
        let was_connected = self.status == ConnectorStatus::Connected;
        self.reset_all(DisconnectReason::TimedOut, "Connection timed out");
        if was_connected {
            self.events.push_back(Event::Disconnected {
                client_index: self.slot_index,
                reason: DisconnectReason::TimedOut,
                message: "Connection timed out".to_owned(),
            });
        } else {
            self.events.push_back(Event::ConnectAttemptFailed {
                client_index: self.slot_index,
                reason: ConnectAttemptFailedReason::TimedOut,
            });
        }
    }

    pub fn send(&mut self, endpoint: Option<&mut NetworkEndpoint>) -> Telemetry {
        match self.status {
            ConnectorStatus::Disconnected => Telemetry::default(),
            ConnectorStatus::Connecting => {
                let mut packet = Packet::new();
                packet
                    .append(&PacketKind::Hello.tag())
                    .append(self.passphrase.as_str());
                self.send_handshake(endpoint, &packet)
            }
            ConnectorStatus::Accepting => {
                let index = self.slot_index.unwrap_or_default() as u32;
                let mut packet = Packet::new();
                packet
                    .append(&PacketKind::Connect.tag())
                    .append(self.passphrase.as_str())
                    .append(&index);
                self.send_handshake(endpoint, &packet)
            }
            ConnectorStatus::Connected => {
                if let Some(link) = &self.local_link {
                    link.push_to_peer(self.send_buffer.export_packets());
                    Telemetry::default()
                } else {
                    self.upload(endpoint)
                }
            }
        }
    }

    /// Sends the weak acknowledgements gathered since the last call.
    pub fn send_acks(&mut self, endpoint: Option<&mut NetworkEndpoint>) -> Telemetry {
        let mut telemetry = Telemetry::default();
        if self.status != ConnectorStatus::Connected || self.local_link.is_some() {
            return telemetry;
        }
        let (Some(endpoint), Some(addr)) = (endpoint, self.remote.addr) else {
            return telemetry;
        };

        for packet in self.send_buffer.take_weak_ack_packets() {
            // Lost acks are covered by the strong acks in later DATA headers.
            match endpoint.send_to(packet.as_bytes(), addr) {
                Ok(SendStatus::Sent(_)) => telemetry += Telemetry::uploaded(packet.len()),
                Ok(SendStatus::NotReady) => break,
                Err(e) => {
                    self.fail_with_error(&format!("Failed to send acknowledgements: {e}"));
                    break;
                }
            }
        }
        telemetry
    }

    pub fn received_packet(&mut self, packet: Packet) {
        if self.status == ConnectorStatus::Disconnected {
            return;
        }
        if let Err(err) = self.process_packet(packet) {
            log::warn!("{}: {}", self.describe(), err);
            self.fail_with_error(&err.to_string());
        }
    }

    /// Feeds everything the local peer sent since the last call through the
    /// regular data path.
    pub fn pump_local_link(&mut self) {
        let Some(link) = &self.local_link else {
            return;
        };
        for packet in link.take_inbox() {
            self.received_packet(packet);
            if self.status == ConnectorStatus::Disconnected {
                break;
            }
        }
    }

    pub fn finish_receive_pass(&mut self) {
        self.latency_samples.apply_to(&mut self.remote);
    }

    /// Next complete payload in send order.
    pub fn take_next_ready_payload(&mut self) -> Option<Packet> {
        if self.status != ConnectorStatus::Connected {
            return None;
        }
        match self.recv_buffer.take_next_ready() {
            Ok(payload) => payload.map(Packet::from),
            Err(err) => {
                self.fail_with_error(&err.to_string());
                None
            }
        }
    }

    pub fn append_data(&mut self, data: &[u8]) {
        self.send_buffer.append_data(data);
    }

    /// Resets the connector after an unrecoverable error on this connection.
    pub fn fail_with_error(&mut self, message: &str) {
        match self.status {
            ConnectorStatus::Disconnected => return,
            ConnectorStatus::Connected => {
                self.events.push_back(Event::Disconnected {
                    client_index: self.slot_index,
                    reason: DisconnectReason::Error,
                    message: message.to_owned(),
                });
            }
            ConnectorStatus::Connecting | ConnectorStatus::Accepting => {
                self.events.push_back(Event::ConnectAttemptFailed {
                    client_index: self.slot_index,
                    reason: ConnectAttemptFailedReason::Error,
                });
            }
        }
        log::info!("{} {}: {}", self.describe(), DisconnectReason::Error.as_str(), message);
        self.reset_all(DisconnectReason::Error, message);
    }

    fn process_packet(&mut self, mut packet: Packet) -> Result<(), ProtocolError> {
        let tag: u32 = packet.extract()?;
        let kind = PacketKind::from_tag(tag).ok_or(ProtocolError::UnknownKind(tag))?;
        let unexpected = ProtocolError::UnexpectedPacket {
            kind,
            state: self.status.as_str(),
        };

        match (self.status, kind) {
            (ConnectorStatus::Disconnected, _) => Ok(()),

            (ConnectorStatus::Connecting, PacketKind::Connect) => {
                let passphrase: String = packet.extract()?;
                let index: u32 = packet.extract()?;
                if passphrase != self.passphrase {
                    log::warn!("Server at {:?} answered with a different passphrase", self.remote.addr);
                    self.reset_all(DisconnectReason::Error, "Bad passphrase");
                    self.events.push_back(Event::BadPassphrase {
                        client_index: self.slot_index,
                        passphrase,
                    });
                    return Ok(());
                }
                self.client_index = Some(index as usize);
                self.start_session();
                Ok(())
            }
            (ConnectorStatus::Connecting | ConnectorStatus::Accepting, PacketKind::Disconnect) => {
                let message = read_disconnect_message(&mut packet);
                log::info!("{} rejected: {}", self.describe(), message);
                self.reset_all(DisconnectReason::Graceful, &message);
                self.events.push_back(Event::ConnectAttemptFailed {
                    client_index: self.slot_index,
                    reason: ConnectAttemptFailedReason::Rejected,
                });
                Ok(())
            }
            (ConnectorStatus::Connecting, PacketKind::Hello) => Err(unexpected),
            (ConnectorStatus::Connecting, _) => Ok(()),

            (ConnectorStatus::Accepting, kind) if kind.is_data() => {
                self.start_session();
                self.receive_data(kind, &mut packet)
            }
            (ConnectorStatus::Accepting, PacketKind::Connect) => Err(unexpected),
            (ConnectorStatus::Accepting, _) => Ok(()),

            (ConnectorStatus::Connected, kind) if kind.is_data() => {
                self.receive_data(kind, &mut packet)
            }
            (ConnectorStatus::Connected, PacketKind::Acks) => {
                while !packet.end_of_packet() {
                    let ordinal: u32 = packet.extract()?;
                    self.apply_ack(ordinal, false)?;
                }
                Ok(())
            }
            (ConnectorStatus::Connected, PacketKind::Disconnect) => {
                let message = read_disconnect_message(&mut packet);
                log::info!("{} closed by remote: {}", self.describe(), message);
                self.reset_all(DisconnectReason::Graceful, &message);
                self.events.push_back(Event::Disconnected {
                    client_index: self.slot_index,
                    reason: DisconnectReason::Graceful,
                    message,
                });
                Ok(())
            }
            (ConnectorStatus::Connected, _) => Ok(()),
        }
    }

    fn receive_data(&mut self, kind: PacketKind, packet: &mut Packet) -> Result<(), ProtocolError> {
        let ordinal: u32 = packet.extract()?;

        match self.recv_buffer.store(ordinal, kind, packet)? {
            StoreOutcome::OutOfWindow => {
                log::debug!("{}: ordinal {} is outside the receive window", self.describe(), ordinal);
                return Ok(());
            }
            StoreOutcome::Duplicate => {}
            StoreOutcome::Stored(acks) => {
                for ack in acks {
                    self.apply_ack(ack, true)?;
                }
            }
        }

        if self.local_link.is_none() {
            self.send_buffer.push_ack(ordinal);
        }
        Ok(())
    }

    fn apply_ack(&mut self, ordinal: u32, strong: bool) -> Result<(), ProtocolError> {
        match self.send_buffer.ack_received(ordinal, strong)? {
            AckOutcome::Stale => {}
            AckOutcome::Weak => self.remote.touch(),
            AckOutcome::Strong { time_to_ack } => {
                self.latency_samples.record(time_to_ack);
                self.remote.touch();
            }
        }
        Ok(())
    }

    fn upload(&mut self, endpoint: Option<&mut NetworkEndpoint>) -> Telemetry {
        let mut telemetry = Telemetry::default();
        let (Some(endpoint), Some(addr)) = (endpoint, self.remote.addr) else {
            return telemetry;
        };

        let result = self.send_buffer.send(
            self.remote.mean_latency,
            self.retransmit_predicate,
            |packet| {
                let status = endpoint.send_to(packet.as_bytes(), addr)?;
                if let SendStatus::Sent(_) = status {
                    telemetry += Telemetry::uploaded(packet.len());
                }
                Ok(status)
            },
        );

        if let Err(e) = result {
            self.fail_with_error(&format!("Failed to send data: {e}"));
        }
        telemetry
    }

    fn send_handshake(&mut self, endpoint: Option<&mut NetworkEndpoint>, packet: &Packet) -> Telemetry {
        let (Some(endpoint), Some(addr)) = (endpoint, self.remote.addr) else {
            return Telemetry::default();
        };

        // Handshake packets repeat every pass until answered, so a busy socket is harmless.
        match endpoint.send_to(packet.as_bytes(), addr) {
            Ok(SendStatus::Sent(_)) => Telemetry::uploaded(packet.len()),
            Ok(SendStatus::NotReady) => Telemetry::default(),
            Err(e) => {
                self.fail_with_error(&format!("Failed to send handshake: {e}"));
                Telemetry::default()
            }
        }
    }

    fn start_session(&mut self) {
        self.status = ConnectorStatus::Connected;
        self.remote.touch();
        log::info!("{} established", self.describe());
        self.events.push_back(Event::Connected {
            client_index: self.slot_index,
        });
    }

    fn reset_buffers(&mut self) {
        self.send_buffer.reset();
        self.recv_buffer.reset();
        self.latency_samples = LatencySamples::default();
    }

    fn reset_all(&mut self, reason: DisconnectReason, message: &str) {
        if let Some(link) = self.local_link.take() {
            link.close(reason, message);
        }
        self.status = ConnectorStatus::Disconnected;
        self.remote = RemoteInfo::default();
        self.client_index = self.slot_index;
        self.reset_buffers();
    }

    fn describe(&self) -> String {
        let peer = match (&self.local_link, self.remote.addr) {
            (Some(_), _) => "local peer".to_owned(),
            (None, Some(addr)) => addr.to_string(),
            (None, None) => "unknown peer".to_owned(),
        };
        match self.slot_index {
            Some(slot) => format!("Connection to {} (slot {})", peer, slot),
            None => format!("Connection to {}", peer),
        }
    }
}

fn read_disconnect_message(packet: &mut Packet) -> String {
    if packet.end_of_packet() {
        return String::new();
    }
    packet.extract().unwrap_or_default()
}
