use clap::Parser;
use client::network::AuctionClient;
use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Stable session token; reuse it across runs to keep your identity
    #[arg(short = 't', long)]
    session: Option<String>,

    /// Connect without a session token (a fresh identity every time)
    #[arg(long, default_value = "false")]
    anonymous: bool,
}

fn generate_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(char::from)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let session_token = if args.anonymous {
        None
    } else {
        let token = args.session.unwrap_or_else(generate_session_token);
        info!("Session token: {} (pass --session {} to reconnect)", token, token);
        Some(token)
    };

    info!("Connecting to: {}", args.server);
    info!("Commands: bid <lot-id> <amount> | lots | reset | quit");

    let mut client = AuctionClient::new(&args.server, session_token).await?;
    client.run().await?;

    Ok(())
}
