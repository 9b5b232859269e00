use anyhow::Context;
use clap::Parser;
use pdfqa::{
    api,
    config::{Config, ConfigError},
    logging,
    session::SessionController,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How often idle sessions are swept.
const REAPER_PERIOD: Duration = Duration::from_secs(60);

/// Ask questions about an uploaded PDF through a small web UI.
#[derive(Parser, Debug)]
#[command(name = "pdfqa", version, about)]
struct Cli {
    /// Secrets file consulted for GEMINI_API_KEY before the environment.
    #[arg(long, env = "PDFQA_SECRETS_FILE", default_value = "secrets.env")]
    secrets_file: PathBuf,

    /// Port to listen on (overrides SERVER_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    let mut config = match Config::load(Some(&cli.secrets_file)) {
        Ok(config) => config,
        Err(error @ ConfigError::MissingCredential) => {
            tracing::error!("{error}");
            return Err(error.into());
        }
        Err(error) => return Err(error).context("Failed to load configuration"),
    };
    if cli.port.is_some() {
        config.server_port = cli.port;
    }
    let config = Arc::new(config);

    let controller = Arc::new(
        SessionController::from_config(config.clone())
            .context("Failed to initialize the question-answering pipeline")?,
    );
    let _reaper = controller.spawn_reaper(REAPER_PERIOD);
    let app = api::create_router(controller, config.upload_limit_bytes);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(requested: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = requested {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
