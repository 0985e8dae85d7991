use clap::{Parser, Subcommand};
use matching_engine::utils::shutdown_token;
use matching_engine::{api, state::AppState};
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "matching-engine")]
#[command(
    version = "0.1",
    about = "A continuous-auction limit-order matching engine with REST and WebSocket market data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server
    Server {
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { port } => {
            let state = AppState::new();
            let app = api::router(state);
            let token = shutdown_token();
            let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
            tracing::info!("HTTP/WS server listening on 0.0.0.0:{port}");
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await?;
        }
    }
    Ok(())
}
