//! Client side of the session
//!
//! [`SessionClient::tick`] is called once per frame. It pumps the transport,
//! applies every inbound message to the peer store, publishes the local
//! position at the configured rate, pings the server for a latency estimate
//! and advances remote peers along their interpolation.
//!
//! Anything a presentation layer needs to react to is queued as a
//! [`SessionEvent`] and collected with [`SessionClient::drain_events`].

use crate::chat::{ChatLine, ChatLog};
use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::interpolation::PositionInterpolator;
use crate::latency::LatencyEstimator;
use crate::peers::{PeerStore, Upsert};
use crate::timer::IntervalTimer;
use log::{debug, info, warn};
use shared::transport::{ClientTransport, ConnectionState, TransportEvent};
use shared::{ChatText, ColorSlot, Message, Name, PeerId, Position};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Transport handshake still running.
    Connecting,
    /// Connected, waiting for the server to assign an identity.
    AwaitingIdentity,
    /// Joined and publishing.
    Joined,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Assigned {
        peer_id: PeerId,
        color_slot: ColorSlot,
    },
    PeerJoined {
        peer_id: PeerId,
        name: String,
        color_slot: ColorSlot,
    },
    PeerLeft {
        peer_id: PeerId,
        name: String,
    },
    Chat(ChatLine),
    /// New smoothed one-way latency estimate.
    Latency(Duration),
    Disconnected,
}

pub struct SessionClient<T: ClientTransport> {
    transport: T,
    name: Name,
    identity: Option<(PeerId, ColorSlot)>,
    connected: bool,
    joined: bool,
    stopped: bool,
    local_position: Position,
    peers: PeerStore,
    interpolator: PositionInterpolator,
    latency: LatencyEstimator,
    chat: ChatLog,
    position_timer: IntervalTimer,
    ping_timer: IntervalTimer,
    events: VecDeque<SessionEvent>,
}

impl<T: ClientTransport> SessionClient<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        let sync_period = config.position_sync_period();
        Self {
            transport,
            name: Name::new(&config.name),
            identity: None,
            connected: false,
            joined: false,
            stopped: false,
            local_position: Position::ORIGIN,
            peers: PeerStore::new(),
            interpolator: PositionInterpolator::new(sync_period),
            latency: LatencyEstimator::new(),
            chat: ChatLog::new(config.chat_history),
            position_timer: IntervalTimer::new(sync_period),
            ping_timer: IntervalTimer::new(config.ping_interval),
            events: VecDeque::new(),
        }
    }

    pub fn tick(&mut self, now: Instant) -> SessionStatus {
        if self.stopped {
            return SessionStatus::Disconnected;
        }

        if let Err(e) = self.transport.pump(now) {
            warn!("Transport error: {}", e);
        }

        while let Some(event) = self.transport.pop_event() {
            match event {
                TransportEvent::Connect => self.handle_connect(),
                TransportEvent::Data(bytes) => {
                    if let Err(e) = self.handle_data(&bytes, now) {
                        match e {
                            SessionError::UnknownPeer(_) => debug!("Ignoring message: {}", e),
                            _ => warn!("Dropping message: {}", e),
                        }
                    }
                }
                TransportEvent::Disconnect => self.handle_disconnect(),
            }
        }

        if self.transport.state() != ConnectionState::Connected {
            // a transport can die without ever queueing an event for it
            if self.transport.state() == ConnectionState::Disconnected {
                self.handle_disconnect();
            }
            return self.status();
        }

        if self.joined {
            if let Err(e) = self.publish(now) {
                warn!("Failed to publish: {}", e);
            }
        }

        self.interpolator.advance(&mut self.peers, now);
        self.status()
    }

    fn publish(&mut self, now: Instant) -> Result<(), SessionError> {
        let peer_id = self.peer_id().ok_or(SessionError::NotJoined)?;

        if self.position_timer.poll(now) {
            self.send(&Message::Position {
                peer_id,
                position: self.local_position,
            })?;
        }
        if self.ping_timer.poll(now) {
            self.send(&Message::Ping)?;
            self.latency.ping_sent(now);
        }
        Ok(())
    }

    fn handle_connect(&mut self) {
        if !self.connected {
            info!("Connected, waiting for identity");
            self.connected = true;
            self.events.push_back(SessionEvent::Connected);
        }
    }

    fn handle_disconnect(&mut self) {
        if self.stopped {
            return;
        }
        if self.connected {
            info!("Disconnected from session");
        } else {
            warn!("Could not connect to server");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.connected = false;
        self.joined = false;
        self.stopped = true;
        self.position_timer.stop();
        self.ping_timer.stop();
        self.peers.clear();
        self.latency.reset();
        self.events.push_back(SessionEvent::Disconnected);
    }

    /// Applies one inbound message.
    pub fn handle_data(&mut self, bytes: &[u8], now: Instant) -> Result<(), SessionError> {
        let message = Message::decode(bytes)?;

        match message {
            Message::AssignId {
                peer_id,
                color_slot,
            } => self.handle_assign(peer_id, color_slot, now)?,
            Message::Chat { sender, text } => self.handle_chat(sender, text),
            Message::Join {
                peer_id,
                name,
                color_slot,
            } => {
                if Some(peer_id) == self.peer_id() {
                    debug!("Ignoring own join echo");
                    return Ok(());
                }
                let display = name.to_string();
                if self.peers.upsert(peer_id, name, color_slot) == Upsert::Inserted {
                    info!("{} \"{}\" joined with {}", peer_id, display, color_slot);
                    self.events.push_back(SessionEvent::PeerJoined {
                        peer_id,
                        name: display,
                        color_slot,
                    });
                }
            }
            Message::Position { peer_id, position } => {
                if Some(peer_id) == self.peer_id() {
                    return Ok(());
                }
                let peer = self
                    .peers
                    .get_mut(peer_id)
                    .ok_or(SessionError::UnknownPeer(peer_id))?;
                self.interpolator.set_target(peer, position, now);
            }
            Message::PlayerLeave { peer_id } => {
                let peer = self
                    .peers
                    .remove(peer_id)
                    .ok_or(SessionError::UnknownPeer(peer_id))?;
                info!("{} \"{}\" left", peer_id, peer.name);
                self.events.push_back(SessionEvent::PeerLeft {
                    peer_id,
                    name: peer.name.to_string(),
                });
            }
            Message::Ping => {
                if let Some(latency) = self.latency.pong_received(now) {
                    self.events.push_back(SessionEvent::Latency(latency));
                }
            }
            Message::None => {}
        }

        Ok(())
    }

    fn handle_assign(
        &mut self,
        peer_id: PeerId,
        color_slot: ColorSlot,
        now: Instant,
    ) -> Result<(), SessionError> {
        if let Some((current, _)) = self.identity {
            if current != peer_id {
                return Err(SessionError::Unexpected("second AssignId"));
            }
        }

        info!("Assigned {} with {}, joining as \"{}\"", peer_id, color_slot, self.name);
        self.identity = Some((peer_id, color_slot));
        self.peers.remove(peer_id);
        self.events.push_back(SessionEvent::Assigned {
            peer_id,
            color_slot,
        });

        self.send(&Message::Join {
            peer_id,
            name: self.name.clone(),
            color_slot,
        })?;
        self.joined = true;
        self.position_timer.start(now);
        self.ping_timer.start(now);
        Ok(())
    }

    fn handle_chat(&mut self, sender: PeerId, text: ChatText) {
        let sender_name = if sender.is_server() {
            "Server".to_string()
        } else if Some(sender) == self.peer_id() {
            self.name.to_string()
        } else {
            match self.peers.display_name(sender) {
                Some(name) => name.to_string(),
                None => {
                    debug!("Chat from unknown {}", sender);
                    format!("Peer {}", sender)
                }
            }
        };

        self.record_chat(ChatLine {
            sender,
            sender_name,
            text: text.to_string(),
        });
    }

    fn record_chat(&mut self, line: ChatLine) {
        info!("[{}] {}", line.sender_name, line.text);
        self.chat.push(line.clone());
        self.events.push_back(SessionEvent::Chat(line));
    }

    /// Sends a chat line to everybody else and logs it locally, since the
    /// server does not echo it back.
    pub fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.joined {
            return Err(SessionError::NotJoined);
        }
        let sender = self.peer_id().ok_or(SessionError::NotJoined)?;

        let text = ChatText::new(text);
        self.send(&Message::Chat {
            sender,
            text: text.clone(),
        })?;
        self.record_chat(ChatLine {
            sender,
            sender_name: self.name.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        let bytes = message.encode()?;
        self.transport.send(message.delivery(), &bytes)?;
        Ok(())
    }

    /// Closes the connection and drops all session state.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        info!("Leaving session");
        self.transport.disconnect();
        self.reset();
    }

    pub fn set_local_position(&mut self, position: Position) {
        self.local_position = position;
    }

    pub fn local_position(&self) -> Position {
        self.local_position
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn status(&self) -> SessionStatus {
        if self.stopped {
            SessionStatus::Disconnected
        } else if self.joined {
            SessionStatus::Joined
        } else if self.connected {
            SessionStatus::AwaitingIdentity
        } else {
            SessionStatus::Connecting
        }
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.identity.map(|(peer_id, _)| peer_id)
    }

    pub fn color_slot(&self) -> Option<ColorSlot> {
        self.identity.map(|(_, color_slot)| color_slot)
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn peers(&self) -> &PeerStore {
        &self.peers
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency.latency()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
