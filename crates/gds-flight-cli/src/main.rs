//! CLI entry point for the gds-flight tools.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use gds_flight_client::EntityType;
use gds_flight_core::{ClientConfig, Graph};

use gds_flight_cli::commands::{read_ticket, resolve_source, validate_model};

#[derive(Parser)]
#[command(name = "gds-flight")]
#[command(about = "Inspect graph models and GDS Flight read requests")]
struct Cli {
    /// Config file prefix (default: gds-flight).
    #[arg(short, long, default_value = "gds-flight")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a graph model file.
    Validate { model: PathBuf },

    /// Show which model entry a source tag resolves to.
    Resolve {
        model: PathBuf,

        /// Source tag, as stored in batch schema metadata.
        tag: String,

        #[arg(short, long, value_enum, default_value = "node")]
        kind: Kind,
    },

    /// Print the ticket a read would send.
    Ticket {
        #[arg(value_enum)]
        kind: Kind,

        /// Properties to stream (comma separated).
        #[arg(short, long, value_delimiter = ',')]
        properties: Vec<String>,

        /// Labels or relationship types to include (default: all).
        #[arg(short, long, value_delimiter = ',')]
        filter: Option<Vec<String>>,

        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Print the effective client configuration.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Node,
    Edge,
}

impl From<Kind> for EntityType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Node => EntityType::Node,
            Kind::Edge => EntityType::Relationship,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { model } => print_json(&validate_model(&model)?)?,
        Command::Resolve { model, tag, kind } => {
            let model = Graph::from_file(&model)?;
            print_json(&resolve_source(&model, kind.into(), &tag)?)?;
        }
        Command::Ticket {
            kind,
            properties,
            filter,
            concurrency,
        } => {
            let config = ClientConfig::load(&cli.config)?;
            let ticket = read_ticket(
                &config,
                kind.into(),
                &properties,
                filter.as_deref(),
                concurrency,
            )?;
            print_json(&ticket)?;
        }
        Command::Config => {
            let config = ClientConfig::load(&cli.config)?;
            tracing::info!(location = %config.location(), "Configuration loaded");
            println!("{config}");
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
