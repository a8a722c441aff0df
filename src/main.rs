use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jcouch::config::{Config, ConfigError};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jcouch")]
#[command(about = "Bucket handle cache and document facade for clustered document databases")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "jcouch team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { output } => generate_config(output),
        Commands::Validate { config } => validate_config(config),
        Commands::Version => {
            show_version();
            Ok(())
        }
    }
}

fn generate_config(output: PathBuf) -> Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output)
        .with_context(|| format!("Failed to generate config at {:?}", output))?;

    println!("Configuration file generated successfully!");
    println!("Edit the cluster section to match your environment and run:");
    println!("  jcouch validate --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            init_logging(&config);
            info!("Configuration loaded from: {:?}", config_path);

            println!("✓ Configuration file is valid");
            println!("  Cluster address: {}", config.cluster.address());
            println!("  Bucket idle timeout: {}s", config.cache.bucket_timeout_sec);
            println!("  Bucket sweep interval: {}s", config.cache.bucket_interval_sec);
            println!("  Log level: {}", config.logging.level);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            Err(e.into())
        }
    }
}

fn show_version() {
    println!("jcouch v{}", env!("CARGO_PKG_VERSION"));
    println!("Bucket handle cache and document facade for clustered document databases");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Logging initialized at level: {}", config.logging.level);
}
