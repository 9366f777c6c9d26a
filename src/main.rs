use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slipstream::access_log::AccessLog;
use slipstream::config::{self, FetchBackend};
use slipstream::origin::Origin;
use slipstream::proxy::fetcher::{DirectFetcher, Fetcher, RelayFetcher};
use slipstream::{app, cli, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "slipstream=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Encode { url }) => {
            let origin = Origin::parse(&url)?;
            println!("{}", origin.token());
            Ok(())
        }
        Some(cli::Commands::Decode { token }) => {
            let origin = Origin::from_token(&token)?;
            println!("{}", origin);
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let fetcher: Arc<dyn Fetcher> = match cfg.fetch_backend {
        FetchBackend::Direct => Arc::new(DirectFetcher::new()),
        FetchBackend::Relay => {
            let endpoint = cfg
                .relay_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("relay backend configured without a relay URL"))?;
            tracing::info!("Relaying upstream fetches through {}", endpoint);
            Arc::new(RelayFetcher::new(endpoint))
        }
    };

    let state = Arc::new(AppState {
        config: cfg,
        fetcher,
        access_log: AccessLog::default(),
    });

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Slipstream listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
