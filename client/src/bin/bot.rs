//! Headless client that walks in a circle, for exercising a server

use clap::Parser;
use client::config::{parse_server_addr, ClientConfig};
use client::{SessionClient, SessionEvent, SessionStatus};
use log::info;
use shared::transport::{LossSimulation, TransportConfig, UdpClientTransport};
use shared::Position;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address, as host or host:port
    #[arg(short = 's', long, default_value = "127.0.0.1:9000")]
    server: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Circle radius in world units
    #[arg(long, default_value = "120.0")]
    radius: f32,

    /// Angular speed in radians per second
    #[arg(long, default_value = "1.0")]
    speed: f32,

    /// Leave after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Drop this fraction of outgoing datagrams (0.0 - 1.0)
    #[arg(long, default_value = "0.0")]
    simulate_loss: f32,
}

const CENTER: Position = Position {
    x: 400.0,
    y: 300.0,
    z: 0.0,
};

fn circle_position(elapsed: Duration, radius: f32, speed: f32) -> Position {
    let angle = elapsed.as_secs_f32() * speed;
    Position::new(
        CENTER.x + radius * angle.cos(),
        CENTER.y + radius * angle.sin(),
        0.0,
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ClientConfig {
        server_addr: parse_server_addr(&args.server)?,
        name: args.name.clone(),
        transport: TransportConfig {
            loss: LossSimulation::new(args.simulate_loss),
            ..TransportConfig::default()
        },
        ..ClientConfig::default()
    };
    info!("Bot \"{}\" connecting to {}", config.name, config.server_addr);

    let started = Instant::now();
    let transport = UdpClientTransport::connect(config.server_addr, config.transport.clone(), started)?;
    let mut session = SessionClient::new(transport, &config);
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));

    let mut ticker = interval(Duration::from_millis(16));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                session.set_local_position(circle_position(
                    now.duration_since(started),
                    args.radius,
                    args.speed,
                ));

                if session.tick(now) == SessionStatus::Disconnected {
                    break;
                }
                for event in session.drain_events() {
                    if let SessionEvent::PeerJoined { name, .. } = event {
                        if let Err(e) = session.send_chat(&format!("hello {}", name)) {
                            info!("Could not greet {}: {}", name, e);
                        }
                    }
                }

                if deadline.map_or(false, |deadline| now >= deadline) {
                    info!("Time is up");
                    break;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    session.stop();
    Ok(())
}
