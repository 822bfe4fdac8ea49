//! Performance benchmarks for the hot paths of a session

use client::interpolation::PositionInterpolator;
use client::peers::PeerStore;
use client::{ClientConfig, SessionClient};
use server::{Relay, ServerConfig};
use shared::transport::{ClientTransport, LocalNetwork, TransportEvent};
use shared::{ColorSlot, Message, Name, PeerId, Position};
use std::time::{Duration, Instant};

/// Benchmarks encoding and decoding of position updates
#[test]
fn benchmark_position_codec() {
    let message = Message::Position {
        peer_id: PeerId(7),
        position: Position::new(123.5, 456.25, 0.0),
    };

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = message.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.tag(), 4);
    }

    let duration = start.elapsed();
    println!(
        "Position codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks chat messages, the largest thing on the wire
#[test]
fn benchmark_chat_codec() {
    let message = Message::chat(PeerId(3), &"x".repeat(64));

    // strings go through serde byte by byte, so this is far slower than
    // positions in unoptimized builds
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = message.encode().unwrap();
        let _ = Message::decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Chat codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks advancing a crowded peer store
#[test]
fn benchmark_interpolation_advance() {
    let now = Instant::now();
    let interpolator = PositionInterpolator::new(Duration::from_millis(200));
    let mut peers = PeerStore::new();

    for id in 1..=64 {
        let peer_id = PeerId(id);
        peers.upsert(peer_id, Name::new("peer"), ColorSlot(id % 8));
        if let Some(peer) = peers.get_mut(peer_id) {
            interpolator.set_target(peer, Position::ORIGIN, now);
            interpolator.set_target(peer, Position::new(id as f32, 100.0, 0.0), now);
        }
    }

    let frames = 10_000;
    let start = Instant::now();

    for frame in 0..frames {
        interpolator.advance(&mut peers, now + Duration::from_micros(frame * 20));
    }

    let duration = start.elapsed();
    println!(
        "Interpolation: {} frames of {} peers in {:?} ({:.2} μs/frame)",
        frames,
        peers.len(),
        duration,
        duration.as_micros() as f64 / frames as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks relay fan-out of position updates to a full session
#[test]
fn benchmark_relay_fan_out() {
    let network = LocalNetwork::new();
    let mut relay = Relay::new(network.server(), &ServerConfig::default());
    let start = Instant::now();

    let mut clients: Vec<_> = (0..16)
        .map(|i| {
            let config = ClientConfig {
                name: format!("player{}", i),
                ..ClientConfig::default()
            };
            SessionClient::new(network.connect(), &config)
        })
        .collect();

    for _ in 0..2 {
        relay.tick(start).unwrap();
        for client in &mut clients {
            client.tick(start);
        }
    }
    assert_eq!(relay.registry().len(), 16);

    // raw transports keep the relay busy without client-side processing
    let mut senders: Vec<_> = (0..16).map(|_| network.connect()).collect();
    relay.tick(start).unwrap();
    let mut ids = Vec::new();
    for sender in &mut senders {
        while let Some(event) = sender.pop_event() {
            if let TransportEvent::Data(bytes) = event {
                if let Ok(Message::AssignId {
                    peer_id,
                    color_slot,
                }) = Message::decode(&bytes)
                {
                    ids.push(peer_id);
                    let join = Message::join(peer_id, "sender", color_slot);
                    sender
                        .send(join.delivery(), &join.encode().unwrap())
                        .unwrap();
                }
            }
        }
    }
    relay.tick(start).unwrap();

    let rounds = 500;
    let timer = Instant::now();

    for round in 0..rounds {
        for (sender, peer_id) in senders.iter_mut().zip(&ids) {
            let message = Message::Position {
                peer_id: *peer_id,
                position: Position::new(round as f32, 0.0, 0.0),
            };
            sender
                .send(message.delivery(), &message.encode().unwrap())
                .unwrap();
        }
        relay.tick(start).unwrap();
        for sender in &mut senders {
            while sender.pop_event().is_some() {}
        }
    }

    let duration = timer.elapsed();
    let relayed = rounds * senders.len() * (relay.registry().len() - 1);
    println!(
        "Relay fan-out: {} messages in {:?} ({:.2} ns/message)",
        relayed,
        duration,
        duration.as_nanos() as f64 / relayed as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
