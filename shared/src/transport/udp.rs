//! UDP implementation of the transport traits
//!
//! Sockets are non-blocking and only touched from `pump` and `send`, so the
//! owning loop decides when network I/O happens.

use crate::error::TransportError;
use crate::transport::link::{Frame, Link, MAX_FRAME_SIZE, PROTOCOL_ID};
use crate::transport::{
    ClientTransport, ConnectionId, ConnectionState, Delivery, ServerTransport, TransportConfig,
    TransportEvent,
};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

fn send_frame(
    socket: &UdpSocket,
    addr: Option<SocketAddr>,
    frame: &Frame,
    config: &TransportConfig,
) -> Result<(), TransportError> {
    if config.loss.should_drop() {
        debug!("Simulated loss of {:?} frame", std::mem::discriminant(frame));
        return Ok(());
    }

    let bytes = frame.encode()?;
    let result = match addr {
        Some(addr) => socket.send_to(&bytes, addr),
        None => socket.send(&bytes),
    };

    match result {
        Ok(_) => Ok(()),
        // a full send buffer loses the datagram like the network would
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            warn!("Send buffer full, dropping datagram");
            Ok(())
        }
        Err(e) => Err(TransportError::Io(e)),
    }
}

/// Reads one datagram. `Ok(None)` means the socket is drained.
fn recv_datagram(
    socket: &UdpSocket,
    buffer: &mut [u8],
) -> Result<Option<(usize, SocketAddr)>, TransportError> {
    loop {
        match socket.recv_from(buffer) {
            Ok(received) => return Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            // ICMP port unreachable from an earlier send, not fatal for UDP
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => continue,
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
}

#[derive(Debug)]
struct ServerConnection {
    addr: SocketAddr,
    link: Link,
}

/// Listening side of the UDP transport.
pub struct UdpServerTransport {
    socket: UdpSocket,
    config: TransportConfig,
    next_connection_id: u64,
    connections: HashMap<ConnectionId, ServerConnection>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    unaccepted: VecDeque<ConnectionId>,
    buffer: Vec<u8>,
    /// Time of the latest pump. Frames sent between pumps are stamped with it.
    clock: Instant,
}

impl UdpServerTransport {
    pub fn bind(addr: SocketAddr, config: TransportConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        socket.set_nonblocking(true)?;

        if config.loss.is_enabled() {
            warn!(
                "Simulating {:.0}% outgoing packet loss",
                config.loss.drop_rate * 100.0
            );
        }

        Ok(Self {
            socket,
            config,
            next_connection_id: 1,
            connections: HashMap::new(),
            by_addr: HashMap::new(),
            unaccepted: VecDeque::new(),
            buffer: vec![0u8; MAX_FRAME_SIZE],
            clock: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn receive_all(&mut self, buffer: &mut [u8], now: Instant) -> Result<(), TransportError> {
        while let Some((len, addr)) = recv_datagram(&self.socket, buffer)? {
            match Frame::decode(&buffer[..len]) {
                Ok(frame) => match self.by_addr.get(&addr).copied() {
                    Some(conn) => self.handle_known(conn, addr, frame, now),
                    None => self.handle_unknown(addr, frame, now),
                },
                Err(e) => debug!("Ignoring datagram from {}: {}", addr, e),
            }
        }
        Ok(())
    }

    fn handle_known(&mut self, conn: ConnectionId, addr: SocketAddr, frame: Frame, now: Instant) {
        let Some(connection) = self.connections.get_mut(&conn) else {
            return;
        };

        let reply = match frame {
            // our accept got lost, say it again
            Frame::ConnectRequest { .. } => Some(Frame::ConnectAccept),
            frame => connection.link.receive(frame, now),
        };

        if connection.link.is_closed() {
            info!("{} at {} disconnected", conn, addr);
            self.by_addr.remove(&addr);
            return;
        }

        if let Some(reply) = reply {
            if let Err(e) = send_frame(&self.socket, Some(addr), &reply, &self.config) {
                warn!("Failed to reply to {}: {}", addr, e);
            }
        }
    }

    fn handle_unknown(&mut self, addr: SocketAddr, frame: Frame, now: Instant) {
        match frame {
            Frame::ConnectRequest { protocol_id } if protocol_id == PROTOCOL_ID => {
                let conn = ConnectionId(self.next_connection_id);
                self.next_connection_id += 1;

                let mut link = Link::new(now);
                link.push_event(TransportEvent::Connect);
                self.connections.insert(conn, ServerConnection { addr, link });
                self.by_addr.insert(addr, conn);
                self.unaccepted.push_back(conn);
                info!("{} connected from {}", conn, addr);

                if let Err(e) = send_frame(&self.socket, Some(addr), &Frame::ConnectAccept, &self.config) {
                    warn!("Failed to accept {}: {}", addr, e);
                }
            }
            Frame::ConnectRequest { protocol_id } => {
                warn!(
                    "Rejecting {} with protocol id {:#x}, expected {:#x}",
                    addr, protocol_id, PROTOCOL_ID
                );
                if let Err(e) = send_frame(&self.socket, Some(addr), &Frame::Disconnect, &self.config) {
                    debug!("Failed to refuse {}: {}", addr, e);
                }
            }
            _ => debug!("Ignoring frame from unconnected {}", addr),
        }
    }
}

impl ServerTransport for UdpServerTransport {
    fn pump(&mut self, now: Instant) -> Result<(), TransportError> {
        self.clock = now;
        let mut buffer = std::mem::take(&mut self.buffer);
        let received = self.receive_all(&mut buffer, now);
        self.buffer = buffer;
        received?;

        for (conn, connection) in self.connections.iter_mut() {
            if connection.link.is_closed() {
                continue;
            }
            if connection
                .link
                .is_timed_out(now, self.config.connection_timeout)
            {
                info!("{} at {} timed out", conn, connection.addr);
                connection.link.close();
                self.by_addr.remove(&connection.addr);
                continue;
            }

            for frame in connection.link.poll(now, &self.config) {
                if let Err(e) = send_frame(&self.socket, Some(connection.addr), &frame, &self.config) {
                    warn!("Failed to send to {}: {}", connection.addr, e);
                }
            }
        }

        Ok(())
    }

    fn accept(&mut self) -> Option<ConnectionId> {
        self.unaccepted.pop_front()
    }

    fn is_alive(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    fn pop_event(&mut self, conn: ConnectionId) -> Option<TransportEvent> {
        let connection = self.connections.get_mut(&conn)?;
        let event = connection.link.pop_event();
        if event == Some(TransportEvent::Disconnect) {
            self.connections.remove(&conn);
        }
        event
    }

    fn send(
        &mut self,
        conn: ConnectionId,
        delivery: Delivery,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let connection = self
            .connections
            .get_mut(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        if connection.link.is_closed() {
            return Err(TransportError::Closed);
        }

        let frame = connection.link.send(delivery, payload, self.clock);
        send_frame(&self.socket, Some(connection.addr), &frame, &self.config)
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        if let Some(connection) = self.connections.remove(&conn) {
            self.by_addr.remove(&connection.addr);
            if let Err(e) = send_frame(&self.socket, Some(connection.addr), &Frame::Disconnect, &self.config) {
                debug!("Failed to notify {} of disconnect: {}", connection.addr, e);
            }
        }
    }
}

/// Connecting side of the UDP transport.
pub struct UdpClientTransport {
    socket: UdpSocket,
    server_addr: SocketAddr,
    config: TransportConfig,
    state: ConnectionState,
    link: Link,
    started_at: Instant,
    last_request: Option<Instant>,
    buffer: Vec<u8>,
    clock: Instant,
}

impl UdpClientTransport {
    /// Opens a socket towards `server_addr`. The handshake runs from `pump`.
    pub fn connect(
        server_addr: SocketAddr,
        config: TransportConfig,
        now: Instant,
    ) -> Result<Self, TransportError> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let connect_error = |source| TransportError::Connect {
            addr: server_addr.to_string(),
            source,
        };

        let socket = UdpSocket::bind(local).map_err(connect_error)?;
        socket.connect(server_addr).map_err(connect_error)?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket,
            server_addr,
            config,
            state: ConnectionState::Connecting,
            link: Link::new(now),
            started_at: now,
            last_request: None,
            buffer: vec![0u8; MAX_FRAME_SIZE],
            clock: now,
        })
    }

    fn mark_connected(&mut self) {
        if self.state == ConnectionState::Connecting {
            info!("Connected to {}", self.server_addr);
            self.state = ConnectionState::Connected;
            self.link.push_event(TransportEvent::Connect);
        }
    }

    fn fail(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.link.close();
    }

    fn receive_all(&mut self, buffer: &mut [u8], now: Instant) -> Result<(), TransportError> {
        while self.state != ConnectionState::Disconnected {
            let Some((len, addr)) = recv_datagram(&self.socket, buffer)? else {
                break;
            };
            if addr != self.server_addr {
                debug!("Ignoring datagram from stranger {}", addr);
                continue;
            }
            match Frame::decode(&buffer[..len]) {
                Ok(frame) => self.handle_frame(frame, now)?,
                Err(e) => debug!("Ignoring datagram from server: {}", e),
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: Frame, now: Instant) -> Result<(), TransportError> {
        match frame {
            Frame::ConnectAccept => {
                self.link.receive(Frame::Keepalive, now);
                self.mark_connected();
            }
            Frame::ConnectRequest { .. } => {}
            Frame::Disconnect if self.state == ConnectionState::Connecting => {
                info!("Server {} refused the connection", self.server_addr);
                self.fail();
            }
            frame => {
                // data before the accept means the accept itself was lost
                self.mark_connected();
                if let Some(reply) = self.link.receive(frame, now) {
                    send_frame(&self.socket, None, &reply, &self.config)?;
                }
                if self.link.is_closed() {
                    info!("Server {} closed the connection", self.server_addr);
                    self.state = ConnectionState::Disconnected;
                }
            }
        }
        Ok(())
    }
}

impl ClientTransport for UdpClientTransport {
    fn pump(&mut self, now: Instant) -> Result<(), TransportError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.clock = now;

        let mut buffer = std::mem::take(&mut self.buffer);
        let received = self.receive_all(&mut buffer, now);
        self.buffer = buffer;
        received?;

        match self.state {
            ConnectionState::Connecting => {
                if now.saturating_duration_since(self.started_at) > self.config.connect_timeout {
                    warn!("No answer from {}, giving up", self.server_addr);
                    self.fail();
                    return Ok(());
                }

                let retry_due = self.last_request.map_or(true, |at| {
                    now.saturating_duration_since(at) >= self.config.connect_retry_interval
                });
                if retry_due {
                    self.last_request = Some(now);
                    let request = Frame::ConnectRequest {
                        protocol_id: PROTOCOL_ID,
                    };
                    send_frame(&self.socket, None, &request, &self.config)?;
                }
            }
            ConnectionState::Connected => {
                if self.link.is_timed_out(now, self.config.connection_timeout) {
                    warn!("Connection to {} timed out", self.server_addr);
                    self.fail();
                    return Ok(());
                }
                for frame in self.link.poll(now, &self.config) {
                    send_frame(&self.socket, None, &frame, &self.config)?;
                }
            }
            ConnectionState::Disconnected => {}
        }

        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn pop_event(&mut self) -> Option<TransportEvent> {
        self.link.pop_event()
    }

    fn send(&mut self, delivery: Delivery, payload: &[u8]) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Connecting => Err(TransportError::NotConnected),
            ConnectionState::Disconnected => Err(TransportError::Closed),
            ConnectionState::Connected => {
                let frame = self.link.send(delivery, payload, self.clock);
                send_frame(&self.socket, None, &frame, &self.config)
            }
        }
    }

    fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            if let Err(e) = send_frame(&self.socket, None, &Frame::Disconnect, &self.config) {
                debug!("Failed to notify server of disconnect: {}", e);
            }
        }
        self.state = ConnectionState::Disconnected;
    }
}
