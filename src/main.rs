use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use modelgate_config::Config;
use modelgate_proxy::{AppState, make_router};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modelgate", about = "modelgate — AI inference gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Common server arguments.
#[derive(clap::Args, Debug)]
struct ServerArgs {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,
    /// Override the listening address.
    #[arg(long)]
    host: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway (foreground).
    Serve {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("modelgate=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { server } => serve(server).await,
    }
}

async fn serve(args: ServerArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::from_config(config)?;
    let app = make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "modelgate listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let result = match path {
        Some(path) => Config::from_file(path),
        // Defaults merged with MODELGATE_ environment overrides.
        None => Config::from_yaml(""),
    };
    result.map_err(|e| anyhow::anyhow!("loading configuration: {e}"))
}
