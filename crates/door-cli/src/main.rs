mod cmd;
mod emitter;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{cache::CacheSubcommand, config::ConfigSubcommand, key::KeySubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "door",
    about = "Event-entrance QR check-in scanner with an offline asset cache",
    version,
    propagate_version = true
)]
struct Cli {
    /// Scanner root (default: auto-detect from .door/)
    #[arg(long, global = true, env = "DOOR_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .door/config.yaml in the current directory
    Init {
        /// Origin that serves the scanner and the check-in API
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Manage the scanner key sent with every check-in
    Key {
        #[command(subcommand)]
        subcommand: KeySubcommand,
    },

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Verify a single ticket token
    Check {
        /// Decoded ticket payload
        token: String,
    },

    /// Scan tickets continuously until interrupted
    Scan {
        /// Camera device to use (see `door devices`)
        #[arg(long, conflicts_with_all = ["stdin", "after"])]
        device: Option<String>,

        /// Start on the camera following this one
        #[arg(long, conflicts_with = "stdin")]
        after: Option<String>,

        /// Read one decoded payload per line from stdin instead of a camera
        #[arg(long)]
        stdin: bool,
    },

    /// List camera devices
    Devices,

    /// Manage the offline asset cache
    Cache {
        #[command(subcommand)]
        subcommand: CacheSubcommand,
    },

    /// Run the caching proxy in front of the origin
    Serve {
        /// Port to listen on (default: proxy.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Scan { .. } | Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { base_url } => cmd::init::run(&root, base_url.as_deref(), cli.json),
        Commands::Key { subcommand } => cmd::key::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Check { token } => cmd::check::run(&root, &token, cli.json),
        Commands::Scan {
            device,
            after,
            stdin,
        } => cmd::scan::run(&root, cmd::scan::Source::new(device, after, stdin), cli.json),
        Commands::Devices => cmd::devices::run(&root, cli.json),
        Commands::Cache { subcommand } => cmd::cache::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
