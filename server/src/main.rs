use clap::Parser;
use log::info;
use server::config::{LobbyConfig, DEFAULT_HOST_ID, DEFAULT_MAX_PLAYERS, DEFAULT_SCENE};
use server::network::Server;
use shared::{Catalog, ClientId};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of participants in the lobby
    #[arg(short, long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// Options per cosmetic category:
    /// body,body_part,eye,glove,head_part,mouth_and_nose,tail
    #[arg(short, long, default_value_t = Catalog::default())]
    catalog: Catalog,

    /// Identity allowed to start the game
    #[arg(long, default_value_t = DEFAULT_HOST_ID)]
    host_id: ClientId,

    /// Scene loaded once everyone is ready
    #[arg(long, default_value = DEFAULT_SCENE)]
    scene: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = LobbyConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_players: args.max_players,
        catalog: args.catalog,
        host_id: args.host_id,
        scene: args.scene,
    };

    let mut server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    server.shutdown().await;
    Ok(())
}
