//! # Metrix CLI Entry Point
//!
//! Single binary for the metrix pipeline: runs the server, runs the agent,
//! or generates an RSA key pair.
//!
//! ## Usage
//!
//! ```bash
//! # Start a server with file persistence every 30s
//! metrix server -a 0.0.0.0:8080 -i 30s -f /var/lib/metrix/metrics.json
//!
//! # Start a server backed by SQLite, signing and decrypting
//! metrix server -d sqlite:///var/lib/metrix/metrics.db -k secret --crypto-key private.pem
//!
//! # Start an agent reporting every 10s over JSON-RPC
//! metrix agent --rpc 127.0.0.1:9090 -p 2s -r 10s -l 4 -k secret --crypto-key public.pem
//!
//! # Generate private.pem and public.pem
//! metrix genkeys -o ./keys
//! ```
//!
//! ## Configuration Precedence
//!
//! Flags override the JSON config file (`-c`), and environment variables
//! override flags.

use anyhow::{Context, Result};
use argh::FromArgs;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use metrix_agent::{Agent, AgentConfig, AgentOptions};
use metrix_common::config::EnvSource;
use metrix_common::humanize::parse_duration;
use metrix_common::security::keys;
use metrix_server::{MetricsServer, ServerConfig, ServerOptions};

fn duration_flag(raw: &str) -> std::result::Result<Duration, String> {
    parse_duration(raw).map_err(|e| e.to_string())
}

#[derive(FromArgs)]
/// Metrix - metrics collection and delivery
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Server(ServerArgs),
    Agent(AgentArgs),
    Genkeys(GenkeysArgs),
}

/// Arguments for the metrics server.
///
/// Every flag is optional; unset flags fall back to the config file and the
/// built-in defaults, and are overridden by the environment.
#[derive(FromArgs)]
#[argh(subcommand, name = "server")]
/// start the metrics server
struct ServerArgs {
    /// HTTP listen address (default localhost:8080)
    #[argh(option, short = 'a')]
    address: Option<String>,

    /// JSON-RPC listen address (default localhost:9090)
    #[argh(option, long = "rpc")]
    rpc_address: Option<String>,

    /// snapshot interval, e.g. 300, 30s or 5m; 0 writes on every update
    #[argh(option, short = 'i', from_str_fn(duration_flag))]
    store_interval: Option<Duration>,

    /// snapshot file; an empty value disables file persistence
    #[argh(option, short = 'f')]
    store_file: Option<PathBuf>,

    /// restore the snapshot file at startup (true or false)
    #[argh(option, short = 'r')]
    restore: Option<bool>,

    /// SQLite DSN; selects relational storage
    #[argh(option, short = 'd')]
    database_dsn: Option<String>,

    /// shared secret for HashSHA256 signatures
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// path to the PEM private key used to decrypt payloads
    #[argh(option, long = "crypto-key")]
    crypto_key: Option<PathBuf>,

    /// CIDR of agents allowed to send, e.g. 10.0.0.0/8
    #[argh(option, short = 't')]
    trusted_subnet: Option<String>,

    /// JSON config file
    #[argh(option, short = 'c', long = "config")]
    config: Option<PathBuf>,
}

impl From<ServerArgs> for ServerOptions {
    fn from(args: ServerArgs) -> Self {
        ServerOptions {
            address: args.address,
            rpc_address: args.rpc_address,
            store_interval: args.store_interval,
            store_file: args.store_file,
            restore: args.restore,
            database_dsn: args.database_dsn,
            key: args.key,
            crypto_key: args.crypto_key,
            trusted_subnet: args.trusted_subnet,
            config: args.config,
        }
    }
}

/// Arguments for the metrics agent.
#[derive(FromArgs)]
#[argh(subcommand, name = "agent")]
/// start the metrics agent
struct AgentArgs {
    /// server HTTP address (default localhost:8080)
    #[argh(option, short = 'a')]
    address: Option<String>,

    /// server JSON-RPC address; when set, reports go over JSON-RPC
    #[argh(option, long = "rpc")]
    rpc_address: Option<String>,

    /// sampling interval (default 2s)
    #[argh(option, short = 'p', from_str_fn(duration_flag))]
    poll_interval: Option<Duration>,

    /// reporting interval (default 10s)
    #[argh(option, short = 'r', from_str_fn(duration_flag))]
    report_interval: Option<Duration>,

    /// shared secret for HashSHA256 signatures
    #[argh(option, short = 'k')]
    key: Option<String>,

    /// maximum concurrent requests to the server (default 2)
    #[argh(option, short = 'l')]
    rate_limit: Option<usize>,

    /// path to the server's PEM public key used to encrypt payloads
    #[argh(option, long = "crypto-key")]
    crypto_key: Option<PathBuf>,

    /// JSON config file
    #[argh(option, short = 'c', long = "config")]
    config: Option<PathBuf>,
}

impl From<AgentArgs> for AgentOptions {
    fn from(args: AgentArgs) -> Self {
        AgentOptions {
            address: args.address,
            rpc_address: args.rpc_address,
            poll_interval: args.poll_interval,
            report_interval: args.report_interval,
            key: args.key,
            rate_limit: args.rate_limit,
            crypto_key: args.crypto_key,
            config: args.config,
        }
    }
}

#[derive(FromArgs)]
#[argh(subcommand, name = "genkeys")]
/// write a new RSA key pair as private.pem and public.pem
struct GenkeysArgs {
    /// output directory
    #[argh(option, short = 'o', default = "PathBuf::from(\".\")")]
    out: PathBuf,

    /// key size in bits
    #[argh(option, short = 'b', default = "keys::DEFAULT_KEY_BITS")]
    bits: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // genkeys prints the written paths only
    if !matches!(cli.command, Commands::Genkeys(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        tracing::info!("metrix {}", env!("CARGO_PKG_VERSION"));
    }

    match cli.command {
        Commands::Server(args) => {
            let config = ServerConfig::load(args.into(), &EnvSource::process())
                .context("invalid server configuration")?;
            tracing::info!("Configuration: {:?}", config);

            let server = MetricsServer::new(config).await?;
            server.run(shutdown_token()).await?;
            Ok(())
        }
        Commands::Agent(args) => {
            let config = AgentConfig::load(args.into(), &EnvSource::process())
                .context("invalid agent configuration")?;
            tracing::info!("Configuration: {:?}", config);

            Agent::new(config)?.run(shutdown_token()).await?;
            Ok(())
        }
        Commands::Genkeys(args) => {
            let (private, public) = keys::write_key_pair(&args.out, args.bits)
                .with_context(|| format!("failed to write keys to {}", args.out.display()))?;
            println!("{}", private.display());
            println!("{}", public.display());
            Ok(())
        }
    }
}

/// Token cancelled on Ctrl-C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
