//! Univapay webhook command-line tool
//!
//! Verify a captured delivery offline, produce test signatures, or run the
//! HTTP receiver.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use univapay_webhooks::webhook::{LoggingHandler, DEFAULT_TOLERANCE_SECS};
use univapay_webhooks::{
    sign_payload, verify_and_parse, webhook_routes, Error, SignatureScheme, WebhookConfig,
    WebhookRouter, WebhookState,
};

/// Header used when `--header-name` is not given
const DEFAULT_HEADER_NAME: &str = "X-Univapay-Signature";

/// Univapay webhook tool
#[derive(Parser, Debug)]
#[command(name = "uvp-webhook")]
#[command(version)]
#[command(about = "Verify, sign and receive Univapay webhooks")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a signature and print the parsed event
    Verify {
        /// Webhook signing secret
        #[arg(long)]
        secret: String,

        /// Signature header value (e.g. `sha256=...`)
        #[arg(long, allow_hyphen_values = true)]
        header: String,

        /// Header name override (default: auto-detect)
        #[arg(long)]
        header_name: Option<String>,

        /// Path to the JSON body
        #[arg(long)]
        file: PathBuf,

        /// Freshness window in seconds, 0 disables
        #[arg(long, default_value_t = DEFAULT_TOLERANCE_SECS, allow_negative_numbers = true)]
        tolerance: i64,
    },

    /// Print a signature header value for a body
    Sign {
        /// Webhook signing secret
        #[arg(long)]
        secret: String,

        /// Path to the JSON body
        #[arg(long)]
        file: PathBuf,

        /// timestamped, sha256, sha1 or raw-hex
        #[arg(long, default_value = "timestamped")]
        scheme: SignatureScheme,

        /// Unix timestamp for the timestamped scheme (default: now)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Run the HTTP receiver, configured from the environment
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Verify {
            secret,
            header,
            header_name,
            file,
            tolerance,
        } => verify(secret, header, header_name, file, tolerance),
        Command::Sign {
            secret,
            file,
            scheme,
            timestamp,
        } => {
            let body = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            println!("{}", sign_payload(&secret, &body, scheme, timestamp));
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { host, port } => {
            serve(&host, port).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn verify(
    secret: String,
    header: String,
    header_name: Option<String>,
    file: PathBuf,
    tolerance: i64,
) -> anyhow::Result<ExitCode> {
    let body =
        std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;

    let mut config = WebhookConfig::new(secret).with_tolerance(tolerance);
    if let Some(name) = &header_name {
        config = config.with_header_name(name.clone());
    }
    let headers = [(
        header_name.as_deref().unwrap_or(DEFAULT_HEADER_NAME),
        header.as_str(),
    )];

    match verify_and_parse(&body, &headers, &config) {
        Ok((info, event)) => {
            println!("{}", serde_json::to_string_pretty(&event)?);
            let matched = info.as_ref().map_or("-", |info| info.header());
            println!("\n[WEBHOOK] OK (header: {matched})");
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Verification(err)) => {
            eprintln!("[WEBHOOK] Verification failed: {err}");
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err.into()),
    }
}

async fn serve(host: &str, port: u16) -> anyhow::Result<()> {
    let config = WebhookConfig::from_env()?;

    let mut router = WebhookRouter::new();
    router.register("*", LoggingHandler)?;

    let path = config.path.clone();
    let app = webhook_routes(Arc::new(WebhookState::new(config, router)));

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Univapay webhook receiver listening on http://{addr}{path}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Webhook receiver stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
