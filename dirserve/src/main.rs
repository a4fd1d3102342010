//! Dirserve - share a directory over the LAN
//!
//! This is the main entry point for the dirserve CLI.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dirserve_api::{AppState, ServerOptions};
use dirserve_core::config::{
    ConfigLoader, DirserveConfig, ListingOrder, LogFormat, LoggingConfig, ServerConfig, TlsConfig,
};
use dirserve_core::Error;
use dirserve_tls::TlsAcceptor;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dirserve")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory
    Serve(ServeArgs),

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file (.json or .toml)
        config: PathBuf,
    },

    /// Show version information
    Version,
}

/// Flags for `serve`. Anything left unset keeps the value from `--config`
/// (or the built-in default).
#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Port to listen on [default: 8000]
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to serve [default: .]
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    bind: Option<String>,

    /// Certificate chain (PEM); enables HTTPS
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Private key (PEM); read from --cert when omitted
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Configuration file (.json or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum requests served at once
    #[arg(long)]
    max_connections: Option<usize>,

    /// Listing order: name or modified
    #[arg(long)]
    order: Option<ListingOrder>,
}

impl ServeArgs {
    /// Load the configuration file, if any, and layer the flags on top.
    fn into_config(self) -> anyhow::Result<DirserveConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => DirserveConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(directory) = self.directory {
            config.server.root = directory;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(cert) = self.cert {
            config.server.tls = Some(TlsConfig {
                cert,
                key: self.key,
            });
        }
        if let Some(limit) = self.max_connections {
            config.server.max_connections = Some(limit);
        }
        if let Some(order) = self.order {
            config.listing.order = order;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config()?;
            init_logging(&config.logging, cli.verbose || config.debug)?;
            if cli.verbose {
                tracing::info!("Verbose mode enabled");
            }
            serve(config).await?;
        }

        Commands::Validate { config } => {
            let result = ConfigLoader::load(&config).and_then(|c| c.validate());
            match result {
                Ok(()) => {
                    println!("✅ Configuration '{}' is valid!", config.display());
                }
                Err(e) => {
                    eprintln!("❌ Configuration Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("dirserve v{}", dirserve_core::VERSION);
            println!("Built with ❤️ in Rust");
        }
    }

    Ok(())
}

async fn serve(config: DirserveConfig) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);

    let tls = load_tls(&config.server)?;
    let scheme = if tls.is_some() { "https" } else { "http" };

    let options = ServerOptions {
        tls,
        max_connections: config.server.max_connections,
    };

    let addr = config.server.listen_addr();
    let listener = dirserve_api::bind(&addr).await?;
    let local = listener.local_addr()?;

    println!("🚀 dirserve running at {}://{}/", scheme, local);
    println!("   Press Ctrl+C to stop");

    dirserve_api::run_server(listener, state, options, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("🛑 Shutdown requested");
    })
    .await?;

    Ok(())
}

fn load_tls(server: &ServerConfig) -> dirserve_core::Result<Option<TlsAcceptor>> {
    let Some(tls) = &server.tls else {
        return Ok(None);
    };
    dirserve_tls::load_acceptor(&tls.cert, tls.key.as_deref())
        .map(Some)
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let file = match &logging.file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?,
        ),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Pretty => registry
            .with(fmt::layer())
            .with(file.map(|f| fmt::layer().with_ansi(false).with_writer(Mutex::new(f))))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json())
            .with(file.map(|f| fmt::layer().json().with_writer(Mutex::new(f))))
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::parse_from(["dirserve", "serve"]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.root, PathBuf::from("."));
        assert!(config.server.tls.is_none());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("dirserve.toml");
        std::fs::write(
            &config_path,
            format!(
                "[server]\nport = 9000\nroot = {:?}\n\n[listing]\norder = \"modified\"\n",
                dir.path()
            ),
        )
        .unwrap();

        let cli = Cli::parse_from([
            "dirserve",
            "serve",
            "-p",
            "9100",
            "--config",
            config_path.to_str().unwrap(),
        ]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.root, dir.path());
        assert_eq!(config.listing.order, ListingOrder::Modified);
    }

    #[test]
    fn test_key_requires_cert() {
        let result = Cli::try_parse_from(["dirserve", "serve", "--key", "key.pem"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tls_failures_are_tls_errors() {
        let mut server = ServerConfig::default();
        assert!(load_tls(&server).unwrap().is_none());

        server.tls = Some(TlsConfig {
            cert: PathBuf::from("/definitely/not/here.pem"),
            key: None,
        });
        assert!(matches!(load_tls(&server), Err(Error::Tls(_))));
    }

    #[test]
    fn test_missing_directory_rejected() {
        let args = ServeArgs {
            directory: Some(PathBuf::from("/definitely/not/a/dir")),
            ..Default::default()
        };
        assert!(args.into_config().is_err());
    }
}
