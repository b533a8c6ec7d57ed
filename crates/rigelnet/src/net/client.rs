use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use super::config::NodeConfig;
use super::connector::{Connector, ConnectorStatus};
use super::endpoint::NetworkEndpoint;
use super::error::NetError;
use super::server::{Server, UpdateMode};
use super::stats::Telemetry;
use crate::codec::Encode;
use crate::event::{Event, EventListener, EventQueue, ListenerId};
use crate::rpc::{self, HandlerRegistry, NodeRef, Rpc, RpcError};

pub struct Client {
    config: NodeConfig,
    endpoint: Option<NetworkEndpoint>,
    connector: Connector,
    registry: Arc<HandlerRegistry>,
    events: EventQueue,
    running: bool,
    user_data: Option<Box<dyn Any>>,
}

impl Client {
    pub fn new(config: NodeConfig, registry: Arc<HandlerRegistry>) -> Result<Self, NetError> {
        config.validate()?;

        let connector = Connector::new(&config, None);
        Ok(Self {
            config,
            endpoint: None,
            connector,
            registry,
            events: EventQueue::default(),
            running: false,
            user_data: None,
        })
    }

    /// Binds `local_port` (0 for any) and starts the handshake with `server`.
    pub fn connect(&mut self, local_port: u16, server: SocketAddr) -> Result<(), NetError> {
        self.ensure_idle()?;

        let mut endpoint = NetworkEndpoint::bind(("0.0.0.0", local_port))?;
        if let Some(sim) = &self.config.packet_loss {
            endpoint.set_loss_simulation(sim.clone());
        }
        self.connector.connect(server)?;
        log::info!("Client on {} connecting to {}", endpoint.local_addr(), server);
        self.endpoint = Some(endpoint);
        self.running = true;
        Ok(())
    }

    /// Connects to a server in the same process. Both sides are connected
    /// when this returns.
    pub fn connect_local(&mut self, server: &mut Server) -> Result<(), NetError> {
        self.ensure_idle()?;

        let (link, index) = server.accept_local_connection()?;
        self.connector.connect_local(link, index)?;
        self.endpoint = None;
        self.running = true;
        self.flush_events();
        Ok(())
    }

    /// Does nothing when already disconnected.
    pub fn disconnect(&mut self, notify: bool) {
        self.connector
            .disconnect(self.endpoint.as_mut(), notify, "Client disconnected");
        self.flush_events();
        self.running = false;
        self.endpoint = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn update(&mut self, mode: UpdateMode) -> Telemetry {
        if !self.running {
            return Telemetry::default();
        }

        let telemetry = match mode {
            UpdateMode::Receive => self.receive(),
            UpdateMode::Send => self.connector.send(self.endpoint.as_mut()),
        };
        self.flush_events();

        if self.connector.status() == ConnectorStatus::Disconnected {
            self.running = false;
            self.endpoint = None;
        }
        telemetry
    }

    pub fn compose<R: Rpc>(&mut self, args: &R::Args) -> Result<(), RpcError> {
        self.compose_by_name(R::NAME, args)
    }

    pub fn compose_by_name<A: Encode + ?Sized>(&mut self, name: &'static str, args: &A) -> Result<(), RpcError> {
        let id = self.registry.id_of_name(name)?;
        if self.connector.status() != ConnectorStatus::Connected {
            return Err(NetError::NotConnectedToServer.into());
        }
        self.connector.append_data(rpc::encode_call(id, args).as_bytes());
        Ok(())
    }

    /// Index the server assigned to this client.
    pub fn client_index(&self) -> Option<usize> {
        self.connector.client_index()
    }

    pub fn server_connector(&self) -> &Connector {
        &self.connector
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(NetworkEndpoint::local_addr)
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
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

    fn ensure_idle(&self) -> Result<(), NetError> {
        if self.running && self.connector.status() != ConnectorStatus::Disconnected {
            return Err(NetError::AlreadyConnected);
        }
        Ok(())
    }

    fn receive(&mut self) -> Telemetry {
        let mut telemetry = Telemetry::default();
        let server_addr = self.connector.remote_addr();

        while let Some(endpoint) = self.endpoint.as_mut() {
            match endpoint.recv_from() {
                Ok(Some((packet, addr))) => {
                    telemetry += Telemetry::downloaded(packet.len());
                    if Some(addr) == server_addr {
                        self.connector.received_packet(packet);
                    } else {
                        log::debug!("Dropping datagram from unknown sender {}", addr);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Client receive failed: {}", e);
                    break;
                }
            }
        }

        self.connector.pump_local_link();
        if self.connector.status() == ConnectorStatus::Connected {
            telemetry += self.connector.send_acks(self.endpoint.as_mut());
        }
        self.connector.finish_receive_pass();
        self.flush_events();

        self.handle_data_messages();
        self.connector.check_for_timeout();
        telemetry
    }

    fn handle_data_messages(&mut self) {
        let registry = Arc::clone(&self.registry);

        while let Some(mut payload) = self.connector.take_next_ready_payload() {
            if let Err(err) = rpc::dispatch(&registry, NodeRef::Client(self), &mut payload) {
                log::warn!("Dropping connection after a bad message: {}", err);
                self.connector.fail_with_error(&err.to_string());
                break;
            }
        }
    }

    fn flush_events(&mut self) {
        self.events.extend(self.connector.drain_events());
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect(true);
    }
}
