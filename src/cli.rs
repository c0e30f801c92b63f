//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigOverrides, APP_VERSION, DEFAULT_CONFIG_FILE};

/// Enrich news records with named entities from an NER service.
#[derive(Debug, Parser)]
#[command(name = "ner-enricher", version = APP_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase log verbosity (-v, -vv). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON configuration file. Missing file is allowed when flags or
    /// environment variables supply every key.
    #[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the enrichment job over the unprocessed backlog (default).
    Run,
    /// Tag a single text with the NER service and print the entity lists.
    Tag(TagArgs),
}

#[derive(Debug, Args)]
pub struct TagArgs {
    /// Text to tag.
    pub text: String,
}
