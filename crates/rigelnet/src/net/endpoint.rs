use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::stats::PacketLossSimulation;
use crate::codec::Packet;

const RECV_BUFFER_SIZE: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent(usize),
    /// The socket could not take the datagram right now; it is retried on a later pass.
    NotReady,
}

/// Non-blocking UDP socket shared by all connectors of one node.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: Box<[u8]>,
    loss_simulation: PacketLossSimulation,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE].into_boxed_slice(),
            loss_simulation: PacketLossSimulation::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn set_loss_simulation(&mut self, sim: PacketLossSimulation) {
        self.loss_simulation = sim;
    }

    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<SendStatus> {
        if self.loss_simulation.should_drop() {
            // Looks sent to the caller, same as a datagram lost in transit.
            return Ok(SendStatus::Sent(data.len()));
        }

        match self.socket.send_to(data, addr) {
            Ok(bytes) => Ok(SendStatus::Sent(bytes)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendStatus::NotReady),
            Err(e) => Err(e),
        }
    }

    /// Returns `None` once there is nothing left to read this pass.
    pub fn recv_from(&mut self) -> io::Result<Option<(Packet, SocketAddr)>> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    return Ok(Some((Packet::from(&self.recv_buffer[..size]), addr)));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP port-unreachable from an earlier send; not related to this read.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
