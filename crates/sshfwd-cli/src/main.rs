//! sshfwd - keep SSH port forwards running

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sshfwd_cli::config::{ConfigManager, DaemonConfig};
use sshfwd_cli::daemon::Daemon;
use sshfwd_store::TunnelStore;

/// sshfwd - Supervise SSH local port forwards
#[derive(Parser, Debug)]
#[command(name = "sshfwd")]
#[command(about = "Keep SSH local port forwards running", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Daemon options when no subcommand is given
    #[command(flatten)]
    serve: ServeArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon (default)
    Serve(ServeArgs),
    /// List stored tunnel definitions
    List {
        /// Config file (default: ~/.sshfwd/config.json)
        #[arg(long, env = "SSHFWD_CONFIG")]
        config: Option<PathBuf>,
        /// Tunnels file
        #[arg(long, env = "SSHFWD_TUNNELS_FILE")]
        tunnels_file: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Config file (default: ~/.sshfwd/config.json)
    #[arg(long, env = "SSHFWD_CONFIG")]
    config: Option<PathBuf>,

    /// API bind address
    #[arg(long, env = "SSHFWD_BIND")]
    bind: Option<SocketAddr>,

    /// Tunnels file
    #[arg(long, env = "SSHFWD_TUNNELS_FILE")]
    tunnels_file: Option<PathBuf>,

    /// ssh executable (default: discovered from PATH)
    #[arg(long, env = "SSHFWD_SSH_PATH")]
    ssh_path: Option<PathBuf>,

    /// Directory with the web frontend
    #[arg(long, env = "SSHFWD_STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn load_config(&self) -> Result<DaemonConfig> {
        let mut config = ConfigManager::load(self.config.as_deref())?;

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(tunnels_file) = &self.tunnels_file {
            config.tunnels_file = tunnels_file.clone();
        }
        if let Some(ssh_path) = &self.ssh_path {
            config.ssh_path = Some(ssh_path.clone());
        }
        if let Some(static_dir) = &self.static_dir {
            config.static_dir = Some(static_dir.clone());
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Serve(args)) => handle_serve(args).await,
        Some(Commands::List {
            config,
            tunnels_file,
        }) => handle_list_tunnels(config, tunnels_file),
        None => handle_serve(cli.serve).await,
    }
}

async fn handle_serve(args: ServeArgs) -> Result<()> {
    let config = args.load_config()?;
    let daemon = Daemon::new(config);

    daemon
        .run(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C");
        })
        .await
}

fn handle_list_tunnels(config: Option<PathBuf>, tunnels_file: Option<PathBuf>) -> Result<()> {
    let path = match tunnels_file {
        Some(path) => path,
        None => ConfigManager::load(config.as_deref())?.tunnels_file,
    };

    let store = TunnelStore::new(path);
    let tunnels = store.load()?;

    if tunnels.is_empty() {
        println!("No tunnels configured in {:?}", store.path());
        return Ok(());
    }

    println!("Configured tunnels ({})", tunnels.len());
    println!();

    for tunnel in tunnels {
        let status = if tunnel.enabled {
            "✅ Enabled"
        } else {
            "⚪ Disabled"
        };
        println!("  {} {} ({})", status, tunnel.name, tunnel.id);
        println!(
            "    Forward: localhost:{} -> {}:{} via {}",
            tunnel.local_port, tunnel.host, tunnel.remote_port, tunnel.conn_addr
        );
        if tunnel.autoreboot {
            println!("    Autoreboot: on");
        }
    }

    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
