//! CLI argument definitions

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "rowprobe")]
#[command(author, version, about = "Find out why a row is missing from a query result")]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to rowprobe.toml in this or a parent directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Where the SELECT text comes from
#[derive(ClapArgs)]
#[group(required = false, multiple = false)]
pub struct QuerySource {
    /// File containing the SELECT statement
    pub file: Option<PathBuf>,

    /// SELECT statement given inline
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Trace where a row drops out of a query
    Analyze {
        #[command(flatten)]
        source: QuerySource,

        /// Column identifying the row (unqualified)
        #[arg(short = 'c', long)]
        key_column: String,

        /// Value of the key column for the missing row
        #[arg(short, long)]
        key: String,

        /// Database connection string
        #[arg(long, env = "ROWPROBE_CONNECTION", hide_env_values = true)]
        connection: Option<String>,

        /// SQL dialect
        #[arg(short, long)]
        dialect: Option<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Show the decomposed structure of a query without running it
    Decompose {
        #[command(flatten)]
        source: QuerySource,

        /// SQL dialect
        #[arg(short, long)]
        dialect: Option<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Also print the raw syntax tree (for debugging)
        #[arg(long)]
        ast: bool,
    },

    /// Show recent connections and the last analyzed query
    History,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output
    Json,
}
