//! In-memory transport for tests and single-process simulations
//!
//! A [`LocalNetwork`] connects one server transport to any number of client
//! transports without sockets. Delivery is instant and ordered; unreliable
//! payloads can be switched to be dropped and links can be cut from outside.

use crate::error::TransportError;
use crate::transport::{
    ClientTransport, ConnectionId, ConnectionState, Delivery, ServerTransport, TransportEvent,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

#[derive(Debug)]
struct LocalLink {
    to_server: VecDeque<TransportEvent>,
    to_client: VecDeque<TransportEvent>,
    client_state: ConnectionState,
    /// False once the server has stopped hearing from this link.
    server_open: bool,
    /// True once the server has seen the end of this link.
    server_released: bool,
}

#[derive(Debug, Default)]
struct NetworkState {
    next_connection_id: u64,
    unaccepted: VecDeque<ConnectionId>,
    links: HashMap<ConnectionId, LocalLink>,
    drop_unreliable: bool,
}

/// Handle to a shared in-memory network. Clones refer to the same network.
#[derive(Debug, Clone, Default)]
pub struct LocalNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self) -> LocalServerTransport {
        LocalServerTransport {
            network: self.clone(),
        }
    }

    /// Opens a new connection. Both ends see it established right away.
    pub fn connect(&self) -> LocalClientTransport {
        let mut state = self.state.borrow_mut();
        state.next_connection_id += 1;
        let conn = ConnectionId(state.next_connection_id);

        state.links.insert(
            conn,
            LocalLink {
                to_server: VecDeque::from([TransportEvent::Connect]),
                to_client: VecDeque::from([TransportEvent::Connect]),
                client_state: ConnectionState::Connected,
                server_open: true,
                server_released: false,
            },
        );
        state.unaccepted.push_back(conn);

        LocalClientTransport {
            network: self.clone(),
            conn,
        }
    }

    /// Drops every unreliable payload while enabled.
    pub fn set_drop_unreliable(&self, drop: bool) {
        self.state.borrow_mut().drop_unreliable = drop;
    }

    /// Cuts a link without either side asking for it, like a timeout would.
    pub fn sever(&self, conn: ConnectionId) {
        let mut state = self.state.borrow_mut();
        if let Some(link) = state.links.get_mut(&conn) {
            if link.server_open {
                link.server_open = false;
                link.to_server.push_back(TransportEvent::Disconnect);
            }
            if link.client_state != ConnectionState::Disconnected {
                link.client_state = ConnectionState::Disconnected;
                link.to_client.push_back(TransportEvent::Disconnect);
            }
        }
    }

    /// Links the server has not yet released.
    pub fn connection_count(&self) -> usize {
        self.state
            .borrow()
            .links
            .values()
            .filter(|link| !link.server_released)
            .count()
    }

    fn drops(&self, delivery: Delivery) -> bool {
        delivery == Delivery::Unreliable && self.state.borrow().drop_unreliable
    }
}

/// Server end of a [`LocalNetwork`].
#[derive(Debug)]
pub struct LocalServerTransport {
    network: LocalNetwork,
}

impl ServerTransport for LocalServerTransport {
    fn pump(&mut self, _now: Instant) -> Result<(), TransportError> {
        Ok(())
    }

    fn accept(&mut self) -> Option<ConnectionId> {
        self.network.state.borrow_mut().unaccepted.pop_front()
    }

    fn is_alive(&self, conn: ConnectionId) -> bool {
        self.network
            .state
            .borrow()
            .links
            .get(&conn)
            .map_or(false, |link| !link.server_released)
    }

    fn pop_event(&mut self, conn: ConnectionId) -> Option<TransportEvent> {
        let mut state = self.network.state.borrow_mut();
        let link = state.links.get_mut(&conn)?;
        if link.server_released {
            return None;
        }

        let event = link.to_server.pop_front();
        if event == Some(TransportEvent::Disconnect) {
            link.server_released = true;
        }
        event
    }

    fn send(
        &mut self,
        conn: ConnectionId,
        delivery: Delivery,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let dropped = self.network.drops(delivery);
        let mut state = self.network.state.borrow_mut();
        let link = state
            .links
            .get_mut(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        if !link.server_open || link.server_released {
            return Err(TransportError::Closed);
        }

        if !dropped && link.client_state == ConnectionState::Connected {
            link.to_client
                .push_back(TransportEvent::Data(payload.to_vec()));
        }
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        let mut state = self.network.state.borrow_mut();
        if let Some(link) = state.links.get_mut(&conn) {
            if link.client_state != ConnectionState::Disconnected {
                link.client_state = ConnectionState::Disconnected;
                link.to_client.push_back(TransportEvent::Disconnect);
            }
            link.server_open = false;
            link.server_released = true;
            link.to_server.clear();
        }
        state.unaccepted.retain(|c| *c != conn);
    }
}

/// Client end of a [`LocalNetwork`].
#[derive(Debug)]
pub struct LocalClientTransport {
    network: LocalNetwork,
    conn: ConnectionId,
}

impl LocalClientTransport {
    /// The id the server side knows this connection by.
    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }
}

impl ClientTransport for LocalClientTransport {
    fn pump(&mut self, _now: Instant) -> Result<(), TransportError> {
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.network
            .state
            .borrow()
            .links
            .get(&self.conn)
            .map_or(ConnectionState::Disconnected, |link| link.client_state)
    }

    fn pop_event(&mut self) -> Option<TransportEvent> {
        self.network
            .state
            .borrow_mut()
            .links
            .get_mut(&self.conn)?
            .to_client
            .pop_front()
    }

    fn send(&mut self, delivery: Delivery, payload: &[u8]) -> Result<(), TransportError> {
        let dropped = self.network.drops(delivery);
        let mut state = self.network.state.borrow_mut();
        let link = state.links.get_mut(&self.conn).ok_or(TransportError::Closed)?;
        if link.client_state != ConnectionState::Connected {
            return Err(TransportError::Closed);
        }

        if !dropped && link.server_open {
            link.to_server
                .push_back(TransportEvent::Data(payload.to_vec()));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.network.state.borrow_mut();
        if let Some(link) = state.links.get_mut(&self.conn) {
            if link.client_state == ConnectionState::Disconnected {
                return;
            }
            link.client_state = ConnectionState::Disconnected;
            if link.server_open {
                link.server_open = false;
                link.to_server.push_back(TransportEvent::Disconnect);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_exchange() {
        let network = LocalNetwork::new();
        let mut server = network.server();
        let mut client = network.connect();

        let conn = server.accept().unwrap();
        assert_eq!(conn, client.connection_id());
        assert_eq!(server.pop_event(conn), Some(TransportEvent::Connect));
        assert_eq!(client.pop_event(), Some(TransportEvent::Connect));

        client.send(Delivery::Reliable, b"up").unwrap();
        server.send(conn, Delivery::Unreliable, b"down").unwrap();

        assert_eq!(server.pop_event(conn), Some(TransportEvent::Data(b"up".to_vec())));
        assert_eq!(client.pop_event(), Some(TransportEvent::Data(b"down".to_vec())));
    }

    #[test]
    fn test_drop_unreliable_keeps_reliable() {
        let network = LocalNetwork::new();
        let mut server = network.server();
        let mut client = network.connect();
        let conn = server.accept().unwrap();
        server.pop_event(conn);

        network.set_drop_unreliable(true);
        client.send(Delivery::Unreliable, b"lost").unwrap();
        client.send(Delivery::Reliable, b"kept").unwrap();

        assert_eq!(server.pop_event(conn), Some(TransportEvent::Data(b"kept".to_vec())));
        assert_eq!(server.pop_event(conn), None);
    }

    #[test]
    fn test_client_disconnect_seen_once_by_server() {
        let network = LocalNetwork::new();
        let mut server = network.server();
        let mut client = network.connect();
        let conn = server.accept().unwrap();

        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.send(Delivery::Reliable, b"late").is_err());

        assert_eq!(server.pop_event(conn), Some(TransportEvent::Connect));
        assert!(server.is_alive(conn));
        assert_eq!(server.pop_event(conn), Some(TransportEvent::Disconnect));
        assert!(!server.is_alive(conn));
        assert_eq!(server.pop_event(conn), None);
    }

    #[test]
    fn test_sever_notifies_both_sides() {
        let network = LocalNetwork::new();
        let mut server = network.server();
        let mut client = network.connect();
        let conn = server.accept().unwrap();
        server.pop_event(conn);
        client.pop_event();

        network.sever(conn);

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.pop_event(), Some(TransportEvent::Disconnect));
        assert_eq!(server.pop_event(conn), Some(TransportEvent::Disconnect));
        assert!(!server.is_alive(conn));
    }

    #[test]
    fn test_server_disconnect_closes_client() {
        let network = LocalNetwork::new();
        let mut server = network.server();
        let mut client = network.connect();
        let conn = server.accept().unwrap();

        server.disconnect(conn);

        assert!(!server.is_alive(conn));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.pop_event(), Some(TransportEvent::Connect));
        assert_eq!(client.pop_event(), Some(TransportEvent::Disconnect));
    }
}
