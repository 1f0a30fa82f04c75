//! layrz - Layrz protocol device session runner
//!
//! Opens a session as a device, announces it with a `Pi` packet and logs
//! every packet the server pushes until Ctrl-C or disconnect.

use clap::{Parser, Subcommand};
use layrz_client::{Config, Connection, HttpClient};
use layrz_protocol::packet::{FirmwareBranch, PiPacket};
use layrz_protocol::{checksum_hex, ClientPacket, ServerPacket};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "layrz")]
#[command(about = "Layrz protocol device session runner")]
#[command(version)]
struct Cli {
    /// Device identifier (overrides config)
    #[arg(long, env = "LAYRZ_IDENT")]
    ident: Option<String>,

    /// Device password (overrides config)
    #[arg(long, env = "LAYRZ_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Server host (overrides config)
    #[arg(long, env = "LAYRZ_HOST")]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a TCP session and log server packets until Ctrl-C
    Tcp {
        /// Firmware identifier reported in the Pi packet
        #[arg(long, default_value = "layrz.rust.runner")]
        firmware_id: String,

        /// Firmware build reported in the Pi packet
        #[arg(long, default_value_t = 1)]
        firmware_build: i64,
    },

    /// Fetch queued commands over HTTP
    HttpCommands,

    /// Print the checksum of a text
    Checksum {
        /// Text to checksum, as it appears on the wire
        text: String,
    },
}

fn log_packet(packet: &ServerPacket) {
    match serde_json::to_string(packet) {
        Ok(json) => tracing::info!("<{}> {}", packet.tag(), json),
        Err(e) => tracing::warn!("<{}> (unprintable: {})", packet.tag(), e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Command::Checksum { text } = &cli.command {
        println!("{}", checksum_hex(text.as_bytes()));
        return Ok(());
    }

    let mut config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("LAYRZ_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Some(ident) = cli.ident {
        config.device.ident = ident;
    }
    if let Some(password) = cli.password {
        config.device.password = password;
    }
    if let Some(host) = cli.host {
        config.tcp.host = host;
    }

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    match cli.command {
        Command::Tcp {
            firmware_id,
            firmware_build,
        } => {
            let conn = Connection::new(config.connection_config());
            conn.set_handler(|packet: ServerPacket| log_packet(&packet));

            tracing::info!("Connecting to {}:{}", config.tcp.host, config.tcp.port);
            conn.connect().await?;

            let identification = PiPacket {
                ident: config.device.ident.clone(),
                firmware_id,
                firmware_build,
                device_id: 0,
                hardware_id: 0,
                model_id: 0,
                firmware_branch: FirmwareBranch::Stable,
                fota_enabled: false,
            };
            conn.send(&ClientPacket::Pi(identification)).await?;

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal, closing session...");
                    conn.close().await?;
                }
                _ = conn.closed() => {
                    tracing::warn!(
                        "Session ended: {}",
                        conn.disconnect_reason().unwrap_or_else(|| "unknown".to_string())
                    );
                }
            }
        }
        Command::HttpCommands => {
            let client = HttpClient::new(config.http_config())?;
            let packet = client.get_commands().await?;
            println!("{}", serde_json::to_string_pretty(&packet)?);
        }
        Command::Checksum { .. } => {}
    }

    tracing::info!("Stopped");
    Ok(())
}
