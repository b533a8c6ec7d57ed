use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::config::NodeConfig;
use super::connector::{AcceptOutcome, Connector, ConnectorStatus, hello_passphrase};
use super::endpoint::NetworkEndpoint;
use super::error::NetError;
use super::local::LocalLinkEnd;
use super::protocol::PacketKind;
use super::stats::Telemetry;
use crate::codec::{Encode, Packet};
use crate::event::{Event, EventListener, EventQueue, ListenerId};
use crate::rpc::{self, HandlerRegistry, NodeRef, Rpc, RpcError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Receive,
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receivers<'a> {
    All,
    One(usize),
    Many(&'a [usize]),
}

/// Authoritative node with a fixed number of client slots.
pub struct Server {
    config: NodeConfig,
    endpoint: Option<NetworkEndpoint>,
    connectors: Vec<Connector>,
    registry: Arc<HandlerRegistry>,
    events: EventQueue,
    sender_index: Option<usize>,
    rejected_connections: u64,
    user_data: Option<Box<dyn Any>>,
}

impl Server {
    pub fn new(config: NodeConfig, size: usize, registry: Arc<HandlerRegistry>) -> Result<Self, NetError> {
        config.validate()?;

        let connectors = (0..size).map(|i| Connector::new(&config, Some(i))).collect();
        Ok(Self {
            config,
            endpoint: None,
            connectors,
            registry,
            events: EventQueue::default(),
            sender_index: None,
            rejected_connections: 0,
            user_data: None,
        })
    }

    pub fn start(&mut self, port: u16) -> Result<(), NetError> {
        if self.endpoint.is_some() {
            return Err(NetError::AlreadyRunning);
        }

        let mut endpoint = NetworkEndpoint::bind(("0.0.0.0", port))?;
        if let Some(sim) = &self.config.packet_loss {
            endpoint.set_loss_simulation(sim.clone());
        }
        log::info!("Server listening on {}", endpoint.local_addr());
        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Disconnects every client and closes the socket. Does nothing when not running.
    pub fn stop(&mut self) {
        if self.endpoint.is_none() {
            return;
        }

        for connector in &mut self.connectors {
            connector.disconnect(self.endpoint.as_mut(), true, "Server stopped");
        }
        self.flush_events();
        self.endpoint = None;
        log::info!("Server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn update(&mut self, mode: UpdateMode) -> Telemetry {
        if self.endpoint.is_none() {
            return Telemetry::default();
        }

        let telemetry = match mode {
            UpdateMode::Receive => self.receive(),
            UpdateMode::Send => self.send(),
        };
        self.flush_events();
        telemetry
    }

    pub fn size(&self) -> usize {
        self.connectors.len()
    }

    /// Grows with empty slots, or disconnects and drops the trailing slots.
    pub fn resize(&mut self, size: usize) {
        if size >= self.connectors.len() {
            let start = self.connectors.len();
            self.connectors
                .extend((start..size).map(|i| Connector::new(&self.config, Some(i))));
            return;
        }

        for connector in &mut self.connectors[size..] {
            connector.disconnect(self.endpoint.as_mut(), true, "Server resized");
        }
        self.flush_events();
        self.connectors.truncate(size);
    }

    pub fn kick_client(&mut self, index: usize, notify: bool, message: &str) -> Result<(), NetError> {
        let size = self.connectors.len();
        let connector = self
            .connectors
            .get_mut(index)
            .ok_or(NetError::InvalidClientIndex { index, size })?;
        connector.disconnect(self.endpoint.as_mut(), notify, message);
        self.flush_events();
        Ok(())
    }

    /// Server half of an in-process connection. Returns the client's link end
    /// and the slot it occupies.
    pub fn accept_local_connection(&mut self) -> Result<(LocalLinkEnd, usize), NetError> {
        if self.endpoint.is_none() {
            return Err(NetError::NotRunning);
        }
        let index = self.free_slot().ok_or(NetError::NoFreeSlot)?;

        let (server_end, client_end) = LocalLinkEnd::pair();
        self.connectors[index].accept_local(server_end)?;
        self.flush_events();
        Ok((client_end, index))
    }

    pub fn client_connector(&self, index: usize) -> Result<&Connector, NetError> {
        self.connectors.get(index).ok_or(NetError::InvalidClientIndex {
            index,
            size: self.connectors.len(),
        })
    }

    pub fn connected_clients(&self) -> impl Iterator<Item = usize> + '_ {
        self.connectors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status() == ConnectorStatus::Connected)
            .map(|(i, _)| i)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(NetworkEndpoint::local_addr)
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn passphrase(&self) -> &str {
        &self.config.passphrase
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn set_timeout_limit(&mut self, limit: Duration) {
        self.config.timeout_limit = limit;
        for connector in &mut self.connectors {
            connector.set_timeout_limit(limit);
        }
    }

    pub fn rejected_connection_count(&self) -> u64 {
        self.rejected_connections
    }

    /// Slot of the client whose message is being handled. `None` outside handlers.
    pub fn sender_index(&self) -> Option<usize> {
        self.sender_index
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn compose<R: Rpc>(&mut self, receivers: Receivers<'_>, args: &R::Args) -> Result<(), RpcError> {
        self.compose_by_name(R::NAME, receivers, args)
    }

    pub fn compose_by_name<A: Encode + ?Sized>(
        &mut self,
        name: &'static str,
        receivers: Receivers<'_>,
        args: &A,
    ) -> Result<(), RpcError> {
        let id = self.registry.id_of_name(name)?;
        let record = rpc::encode_call(id, args);
        let size = self.connectors.len();

        match receivers {
            Receivers::All => {
                for connector in &mut self.connectors {
                    if connector.status() == ConnectorStatus::Connected {
                        connector.append_data(record.as_bytes());
                    }
                }
            }
            Receivers::One(index) => {
                let connector = self
                    .connectors
                    .get_mut(index)
                    .ok_or(NetError::InvalidClientIndex { index, size })?;
                if connector.status() != ConnectorStatus::Connected {
                    return Err(NetError::NotConnected(index).into());
                }
                connector.append_data(record.as_bytes());
            }
            Receivers::Many(indices) => {
                if let Some(&index) = indices.iter().find(|&&i| i >= size) {
                    return Err(NetError::InvalidClientIndex { index, size }.into());
                }
                for &index in indices {
                    let connector = &mut self.connectors[index];
                    if connector.status() == ConnectorStatus::Connected {
                        connector.append_data(record.as_bytes());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn add_event_listener(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        self.events.add_listener(listener)
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.poll()
    }

    pub fn set_user_data<T: Any>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_ref()?.downcast_ref()
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut()?.downcast_mut()
    }

    pub fn take_user_data(&mut self) -> Option<Box<dyn Any>> {
        self.user_data.take()
    }

    fn receive(&mut self) -> Telemetry {
        let mut telemetry = Telemetry::default();

        while let Some(endpoint) = self.endpoint.as_mut() {
            match endpoint.recv_from() {
                Ok(Some((packet, addr))) => {
                    telemetry += Telemetry::downloaded(packet.len());
                    self.route_datagram(packet, addr);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Server receive failed: {}", e);
                    break;
                }
            }
        }

        let mut index = 0;
        while index < self.connectors.len() {
            if self.connectors[index].status() != ConnectorStatus::Disconnected {
                let connector = &mut self.connectors[index];
                connector.pump_local_link();
                if connector.status() == ConnectorStatus::Connected {
                    telemetry += connector.send_acks(self.endpoint.as_mut());
                }
                connector.finish_receive_pass();
                self.flush_events();

                self.handle_data_messages(index);

                // Handlers may have shrunk the server.
                if let Some(connector) = self.connectors.get_mut(index) {
                    connector.check_for_timeout();
                }
                self.flush_events();
            }
            index += 1;
        }

        telemetry
    }

    fn send(&mut self) -> Telemetry {
        let mut telemetry = Telemetry::default();
        for connector in &mut self.connectors {
            if connector.status() != ConnectorStatus::Disconnected {
                telemetry += connector.send(self.endpoint.as_mut());
            }
        }
        telemetry
    }

    fn route_datagram(&mut self, packet: Packet, addr: SocketAddr) {
        if let Some(connector) = self
            .connectors
            .iter_mut()
            .find(|c| c.status() != ConnectorStatus::Disconnected && c.remote_addr() == Some(addr))
        {
            connector.received_packet(packet);
            return;
        }

        let Some(passphrase) = hello_passphrase(&packet) else {
            log::debug!("Dropping datagram from unknown sender {}", addr);
            return;
        };

        let Some(index) = self.free_slot() else {
            self.rejected_connections += 1;
            log::warn!("Rejected connection from {}: server full", addr);
            if passphrase == self.config.passphrase {
                self.reply_disconnect(addr, "Server full");
            }
            return;
        };

        match self.connectors[index].try_accept(addr, &packet) {
            AcceptOutcome::Accepted => log::info!("Accepting {} into slot {}", addr, index),
            AcceptOutcome::BadPassphrase(passphrase) => {
                log::warn!("Rejected connection from {}: bad passphrase", addr);
                self.events.push(Event::BadPassphrase {
                    client_index: None,
                    passphrase,
                });
                self.reply_disconnect(addr, "Bad passphrase");
            }
            AcceptOutcome::Ignored => {}
        }
    }

    fn reply_disconnect(&mut self, addr: SocketAddr, message: &str) {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };
        let mut packet = Packet::new();
        packet.append(&PacketKind::Disconnect.tag()).append(message);
        if let Err(e) = endpoint.send_to(packet.as_bytes(), addr) {
            log::debug!("Failed to reply to {}: {}", addr, e);
        }
    }

    fn handle_data_messages(&mut self, index: usize) {
        let registry = Arc::clone(&self.registry);

        loop {
            let Some(mut payload) = self
                .connectors
                .get_mut(index)
                .and_then(Connector::take_next_ready_payload)
            else {
                break;
            };

            self.sender_index = Some(index);
            let result = rpc::dispatch(&registry, NodeRef::Server(self), &mut payload);
            self.sender_index = None;

            if let Err(err) = result {
                log::warn!("Dropping client {} after a bad message: {}", index, err);
                if let Some(connector) = self.connectors.get_mut(index) {
                    connector.fail_with_error(&err.to_string());
                }
                break;
            }
        }
    }

    fn free_slot(&self) -> Option<usize> {
        self.connectors
            .iter()
            .position(|c| c.status() == ConnectorStatus::Disconnected)
    }

    fn flush_events(&mut self) {
        for connector in &mut self.connectors {
            self.events.extend(connector.drain_events());
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
