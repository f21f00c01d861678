//! sitepipe CLI - static-site asset pipeline with a live-reload preview server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod pipeline;

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Static-site asset pipeline with a live-reload preview server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root containing src/ and package.json
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, then serve and watch with live reload (the default)
    Dev {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Build the site once
    Build,

    /// Run a single registered task
    Run {
        /// Task name, as listed by `sitepipe tasks`
        task: String,
    },

    /// List registered tasks
    Tasks,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let command = cli.command.unwrap_or(Commands::Dev {
        port: 3000,
        host: "127.0.0.1".to_string(),
        no_open: false,
    });

    // Execute command
    match command {
        Commands::Dev {
            port,
            host,
            no_open,
        } => {
            commands::dev::run(cli.root, host, port, !no_open).await?;
        }
        Commands::Build => {
            commands::build::run(cli.root).await?;
        }
        Commands::Run { task } => {
            commands::run::run(cli.root, &task).await?;
        }
        Commands::Tasks => {
            commands::tasks::run(cli.root)?;
        }
    }

    Ok(())
}
