use clap::Parser;
use log::{error, info};
use server::{Server, ServerConfig};
use shared::transport::{LossSimulation, TransportConfig};
use std::net::{IpAddr, SocketAddr};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Relay ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Number of distinct player colors to hand out
    #[arg(long, default_value_t = shared::PALETTE.len() as u32)]
    palette_size: u32,

    /// Drop this fraction of outgoing datagrams (0.0 - 1.0)
    #[arg(long, default_value = "0.0")]
    simulate_loss: f32,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: SocketAddr::new(args.host, args.port),
            tick_rate: args.tick_rate,
            palette_size: args.palette_size,
            transport: TransportConfig {
                loss: LossSimulation::new(args.simulate_loss),
                ..TransportConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    info!("Starting server on {}", config.bind_addr);

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    server.run().await?;
    Ok(())
}
