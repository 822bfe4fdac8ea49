//! Outgoing messages produced while handling one tick

use shared::transport::ConnectionId;
use shared::Message;

/// A message addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: ConnectionId,
    pub message: Message,
}

/// Queue of messages waiting to be handed to the transport.
///
/// Registry and relay logic only push here, so the order in which messages
/// are queued is the order they are sent in.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ConnectionId, message: Message) {
        self.envelopes.push(Envelope { to, message });
    }

    pub fn send_all<I>(&mut self, recipients: I, message: &Message)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        for to in recipients {
            self.send(to, message.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.envelopes.iter()
    }

    pub fn take(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }
}
