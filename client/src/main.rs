mod input;
mod rendering;

use clap::Parser;
use client::config::{parse_server_addr, ClientConfig};
use client::{ConfigError, SessionClient, SessionEvent};
use input::InputManager;
use log::{error, info, warn};
use macroquad::input::{is_quit_requested, prevent_quit};
use macroquad::time::get_frame_time;
use macroquad::window::{next_frame, screen_height, screen_width, Conf};
use rendering::{HudState, Renderer};
use shared::transport::{LossSimulation, TransportConfig, UdpClientTransport};
use shared::Position;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address, as host or host:port
    #[arg(short = 's', long, default_value = "127.0.0.1:9000")]
    server: String,

    /// Display name, at most 32 bytes
    #[arg(short = 'n', long, default_value = shared::DEFAULT_PLAYER_NAME)]
    name: String,

    /// Own position updates per second
    #[arg(long, default_value_t = shared::DEFAULT_POSITION_SYNC_HZ)]
    sync_hz: f32,

    /// Seconds between latency pings
    #[arg(long, default_value_t = shared::DEFAULT_PING_INTERVAL_SECS)]
    ping_interval: f32,

    /// Drop this fraction of outgoing datagrams (0.0 - 1.0)
    #[arg(long, default_value = "0.0")]
    simulate_loss: f32,
}

impl Args {
    fn into_config(self) -> Result<ClientConfig, ConfigError> {
        Ok(ClientConfig {
            server_addr: parse_server_addr(&self.server)?,
            name: self.name,
            position_sync_hz: self.sync_hz,
            ping_interval: Duration::from_secs_f32(self.ping_interval.max(0.1)),
            transport: TransportConfig {
                loss: LossSimulation::new(self.simulate_loss),
                ..TransportConfig::default()
            },
            ..ClientConfig::default()
        })
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Session Client".to_owned(),
        window_width: 800,
        window_height: 600,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run().await {
        error!("{}", e);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;
    info!("Connecting to {} as \"{}\"", config.server_addr, config.name);

    let transport =
        UdpClientTransport::connect(config.server_addr, config.transport.clone(), Instant::now())?;
    let mut session = SessionClient::new(transport, &config);

    let (width, height) = (screen_width(), screen_height());
    let mut input = InputManager::new(Position::new(width / 2.0, height / 2.0, 0.0), (width, height));
    let renderer = Renderer::new(width, height);

    prevent_quit();

    loop {
        if is_quit_requested() {
            session.stop();
            break;
        }

        let frame = input.update(get_frame_time());
        session.set_local_position(input.position());
        if let Some(text) = frame.chat_to_send {
            if let Err(e) = session.send_chat(&text) {
                warn!("Chat not sent: {}", e);
            }
        }

        let status = session.tick(Instant::now());
        for event in session.drain_events() {
            if let SessionEvent::Disconnected = event {
                warn!("Session ended, close the window to quit");
            }
        }

        let local = session
            .color_slot()
            .map(|slot| (session.name(), slot, input.position()));
        renderer.render(
            local,
            session.peers(),
            HudState {
                status,
                latency: session.latency(),
                chat: session.chat(),
                draft: input.draft(),
            },
        );

        next_frame().await;
    }

    Ok(())
}
