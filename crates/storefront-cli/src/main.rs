mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storefront_core::config::{Config, WarnLevel};

#[derive(Parser)]
#[command(
    name = "storefront",
    about = "Storefront admin API and publish tooling",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file (environment variables override it)
    #[arg(long, global = true, env = "STOREFRONT_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the admin content API
    Serve {
        /// Port to listen on (default: config / STOREFRONT_PORT / 8788)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Call the deploy hook and purge the CDN cache now, without debouncing
    Publish,

    /// Export every catalog table to JSON files
    Pull {
        /// Output directory
        #[arg(long, default_value = "data")]
        out: PathBuf,
    },

    /// Show the pending publish deadline and runner lease
    Status,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Serve { port } => cmd::serve::run(&config, port),
        Commands::Publish => cmd::publish::run(&config, cli.json),
        Commands::Pull { out } => cmd::pull::run(&config, &out, cli.json),
        Commands::Status => cmd::status::run(&config, cli.json),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let config = Config::load(path)?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Error => tracing::error!("{}", w.message),
            WarnLevel::Warning => tracing::warn!("{}", w.message),
        }
    }
    Ok(config)
}
