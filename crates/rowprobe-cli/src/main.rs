//! rowprobe CLI - find the clause that drops a row from a query

mod args;
mod config;
mod history;
mod output;
mod pg;

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rowprobe_core::{decompose, parse_select, Analyzer, SqlDialect};

use crate::args::{Args, Command, QuerySource};
use crate::config::Config;
use crate::history::HistoryData;
use crate::output::OutputFormatter;
use crate::pg::PgExecutor;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match (args.quiet, args.verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        (false, _) => tracing::Level::DEBUG,
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match run(args).await {
        Ok(row_missing) => {
            if row_missing {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    // Load configuration
    let config = if let Some(path) = &args.config {
        Config::from_file(path)?
    } else {
        Config::find_and_load()?.unwrap_or_default()
    };

    match args.command {
        Command::Analyze {
            source,
            key_column,
            key,
            connection,
            dialect,
            format,
        } => {
            // Merge CLI args with config (CLI takes precedence)
            let config = config.merge_with_args(&connection, &dialect, &format);
            let dialect = config_dialect(&config)?;
            if dialect != SqlDialect::PostgreSQL {
                miette::bail!(
                    "Live analysis is only available for postgresql databases; use `rowprobe decompose` to inspect {} queries",
                    dialect
                );
            }

            let history_path = config.history_path();
            let mut history = HistoryData::load(&history_path);

            let sql = read_query(&source, &history)?;
            let connection = config
                .connection
                .clone()
                .or_else(|| history.most_recent_connection().map(str::to_string))
                .ok_or_else(|| {
                    miette::miette!(
                        "No connection string specified. Use --connection, ROWPROBE_CONNECTION or configure in rowprobe.toml"
                    )
                })?;

            let result = {
                let executor = PgExecutor::connect(&connection)
                    .await
                    .map_err(|e| miette::miette!("Could not connect to database: {}", e))?;
                Analyzer::new(dialect)
                    .analyze_sql(&executor, &sql, &key_column, &key)
                    .await
            };

            history.remember_connection(&connection);
            history.remember_query(&sql);
            if let Err(e) = history.save(&history_path) {
                tracing::warn!(
                    path = %history_path.display(),
                    error = %e,
                    "could not save history"
                );
            }

            OutputFormatter::new(config.output_format())
                .print_analysis(&result, &key_column, &key)?;

            Ok(!result.is_success)
        }

        Command::Decompose {
            source,
            dialect,
            format,
            ast,
        } => {
            let config = config.merge_with_args(&None, &dialect, &format);
            let dialect = config_dialect(&config)?;
            let history = HistoryData::load(&config.history_path());
            let sql = read_query(&source, &history)?;

            let statement = parse_select(&sql, dialect)?;
            if ast {
                println!("{:#?}", statement);
                println!();
            }

            let parsed = decompose(&statement, dialect)?;
            OutputFormatter::new(config.output_format()).print_structure(&parsed)?;

            Ok(false)
        }

        Command::History => {
            let history = HistoryData::load(&config.history_path());

            println!("Recent connections:");
            println!("===================");
            if history.recent_connection_strings.is_empty() {
                println!("  (none)");
            }
            for (i, connection) in history.recent_connection_strings.iter().enumerate() {
                println!("  {}. {}", i + 1, connection);
            }

            if let Some(query) = &history.last_query {
                println!("\nLast query:");
                println!("{}", query);
            }

            Ok(false)
        }
    }
}

fn config_dialect(config: &Config) -> Result<SqlDialect> {
    match &config.dialect {
        Some(name) => name.parse().map_err(|e: String| miette::miette!(e)),
        None => Ok(SqlDialect::default()),
    }
}

/// Query text from --query, a file, or the last analyzed query
fn read_query(source: &QuerySource, history: &HistoryData) -> Result<String> {
    if let Some(query) = &source.query {
        return Ok(query.clone());
    }
    if let Some(path) = &source.file {
        return fs::read_to_string(path).into_diagnostic();
    }
    history.last_query.clone().ok_or_else(|| {
        miette::miette!("No query specified. Pass a SQL file or use --query")
    })
}
