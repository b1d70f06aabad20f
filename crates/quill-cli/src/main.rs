//! Quill command line interface
//!
//! Renders JSON-encoded queries and closures as SQL.

mod commands;
mod config;
mod logging;

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quill_registry::FunctionRegistry;
use tracing::debug;

use crate::config::{Config, Methods};

/// Quill query compiler
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./quill.yaml when present)
    #[arg(short, long, env = "QUILL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print the IR as JSON before the SQL
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a JSON-encoded query as SQL
    Format {
        /// Query file, or `-` for stdin
        input: String,

        /// Print the query fingerprint
        #[arg(long)]
        fingerprint: bool,
    },

    /// Lower a closure such as `x => x.price > 100` into SQL
    Closure {
        source: String,

        /// Entity to select from; renders a full SELECT
        #[arg(long)]
        from: Option<String>,

        /// Comma-separated fields to select
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,

        /// Method translation
        #[arg(long, value_enum)]
        methods: Option<Methods>,
    },

    /// List the registered SQL functions
    Functions,
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(input).with_context(|| format!("cannot read {}", input))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::discover(cli.config.as_deref())?;
    logging::init(&config.logging)?;
    config.output.json |= cli.json;
    debug!(?config, "configuration loaded");

    let printed = match cli.command {
        Commands::Format { input, fingerprint } => {
            config.output.fingerprint |= fingerprint;
            commands::format_query(&read_input(&input)?, &config.output)?
        }
        Commands::Closure {
            source,
            from,
            select,
            methods,
        } => {
            if let Some(methods) = methods {
                config.output.methods = methods;
            }
            commands::lower_closure(&source, from.as_deref(), &select, &config.output)?
        }
        Commands::Functions => commands::list_functions(&FunctionRegistry::default(), config.output.json)?,
    };

    println!("{}", printed);
    Ok(())
}
