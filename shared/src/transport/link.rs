//! Per-connection framing shared by both ends of the UDP transport
//!
//! Every datagram carries one [`Frame`]. Reliable payloads get a sequence
//! number and are resent until acknowledged; the receiver acks every copy,
//! drops duplicates and releases payloads strictly in sequence order.

use crate::error::TransportError;
use crate::transport::{Delivery, TransportConfig, TransportEvent};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Identifies this protocol in connect requests. Bump on wire changes.
pub const PROTOCOL_ID: u32 = 0x5353_0002;
/// Largest datagram either side will accept.
pub const MAX_FRAME_SIZE: usize = 1200;
/// Reliable payloads received ahead of a gap are buffered up to this many.
const MAX_REORDER_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    ConnectRequest { protocol_id: u32 },
    ConnectAccept,
    Unreliable(Vec<u8>),
    Reliable { seq: u32, payload: Vec<u8> },
    Ack { seq: u32 },
    Keepalive,
    Disconnect,
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        frame_codec()
            .serialize(self)
            .map_err(|e| TransportError::Frame(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        frame_codec()
            .deserialize(bytes)
            .map_err(|e| TransportError::Frame(e.to_string()))
    }
}

fn frame_codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_FRAME_SIZE as u64)
        .reject_trailing_bytes()
}

#[derive(Debug)]
struct PendingFrame {
    payload: Vec<u8>,
    last_sent: Instant,
}

/// State of one established connection.
#[derive(Debug)]
pub struct Link {
    last_received: Instant,
    last_sent: Instant,
    next_send_seq: u32,
    unacked: BTreeMap<u32, PendingFrame>,
    next_recv_seq: u32,
    reordered: BTreeMap<u32, Vec<u8>>,
    inbox: VecDeque<TransportEvent>,
    closed: bool,
}

impl Link {
    pub fn new(now: Instant) -> Self {
        Self {
            last_received: now,
            last_sent: now,
            next_send_seq: 0,
            unacked: BTreeMap::new(),
            next_recv_seq: 0,
            reordered: BTreeMap::new(),
            inbox: VecDeque::new(),
            closed: false,
        }
    }

    /// Wraps an outgoing payload into the frame to put on the wire.
    pub fn send(&mut self, delivery: Delivery, payload: &[u8], now: Instant) -> Frame {
        self.last_sent = now;
        match delivery {
            Delivery::Unreliable => Frame::Unreliable(payload.to_vec()),
            Delivery::Reliable => {
                let seq = self.next_send_seq;
                self.next_send_seq = self.next_send_seq.wrapping_add(1);
                self.unacked.insert(
                    seq,
                    PendingFrame {
                        payload: payload.to_vec(),
                        last_sent: now,
                    },
                );
                Frame::Reliable {
                    seq,
                    payload: payload.to_vec(),
                }
            }
        }
    }

    /// Handles a frame from the remote end and returns the reply to send,
    /// if any. Delivered payloads end up in the inbox.
    pub fn receive(&mut self, frame: Frame, now: Instant) -> Option<Frame> {
        self.last_received = now;

        match frame {
            Frame::Unreliable(payload) => {
                self.inbox.push_back(TransportEvent::Data(payload));
                None
            }
            Frame::Reliable { seq, payload } => self
                .accept_reliable(seq, payload)
                .then_some(Frame::Ack { seq }),
            Frame::Ack { seq } => {
                self.unacked.remove(&seq);
                None
            }
            Frame::Disconnect => {
                self.close();
                None
            }
            Frame::ConnectRequest { .. } | Frame::ConnectAccept | Frame::Keepalive => None,
        }
    }

    /// Returns false when the payload was neither delivered nor buffered and
    /// must not be acknowledged.
    fn accept_reliable(&mut self, seq: u32, payload: Vec<u8>) -> bool {
        if seq == self.next_recv_seq {
            self.inbox.push_back(TransportEvent::Data(payload));
            self.next_recv_seq = self.next_recv_seq.wrapping_add(1);

            while let Some(next) = self.reordered.remove(&self.next_recv_seq) {
                self.inbox.push_back(TransportEvent::Data(next));
                self.next_recv_seq = self.next_recv_seq.wrapping_add(1);
            }
        } else if seq.wrapping_sub(self.next_recv_seq) < u32::MAX / 2 {
            if self.reordered.len() >= MAX_REORDER_BUFFER && !self.reordered.contains_key(&seq) {
                return false;
            }
            self.reordered.entry(seq).or_insert(payload);
        }
        // anything else is a duplicate of an already delivered payload
        true
    }

    /// Frames that are due at `now`: resends of unacknowledged reliable
    /// payloads and, after a quiet period, a keepalive.
    pub fn poll(&mut self, now: Instant, config: &TransportConfig) -> Vec<Frame> {
        let mut frames = Vec::new();

        for (seq, pending) in self.unacked.iter_mut() {
            if now.saturating_duration_since(pending.last_sent) >= config.resend_interval {
                pending.last_sent = now;
                frames.push(Frame::Reliable {
                    seq: *seq,
                    payload: pending.payload.clone(),
                });
            }
        }

        if frames.is_empty()
            && now.saturating_duration_since(self.last_sent) >= config.keepalive_interval
        {
            frames.push(Frame::Keepalive);
        }
        if !frames.is_empty() {
            self.last_sent = now;
        }

        frames
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_received) > timeout
    }

    /// Marks the link dead and queues the `Disconnect` event once.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.unacked.clear();
            self.inbox.push_back(TransportEvent::Disconnect);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn push_event(&mut self, event: TransportEvent) {
        self.inbox.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<TransportEvent> {
        self.inbox.pop_front()
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }
}
