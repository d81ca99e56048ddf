//! Output formatting

use miette::{IntoDiagnostic, Result};
use rowprobe_core::{AnalysisResult, ParsedQuery, StepResult};

use crate::args::OutputFormat;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Output formatter for traces and decomposed queries
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print an analysis trace in the configured format
    pub fn print_analysis(
        &self,
        result: &AnalysisResult,
        key_column: &str,
        key: &str,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                print!("{}", render_analysis(result, key_column, key));
                Ok(())
            }
            OutputFormat::Json => print_json(result),
        }
    }

    /// Print a decomposed query in the configured format
    pub fn print_structure(&self, parsed: &ParsedQuery) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                print!("{}", render_structure(parsed));
                Ok(())
            }
            OutputFormat::Json => print_json(parsed),
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{}", json);
    Ok(())
}

fn step_marker(step: &StepResult) -> String {
    if step.passed {
        format!("{GREEN}pass{RESET}")
    } else if step.blocking {
        format!("{RED}FAIL{RESET}")
    } else {
        format!("{YELLOW}miss{RESET}")
    }
}

fn render_analysis(result: &AnalysisResult, key_column: &str, key: &str) -> String {
    let mut out = String::new();

    for (i, step) in result.steps.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} {}: {}\n",
            i + 1,
            step_marker(step),
            step.name,
            step.description
        ));
        if !step.generated_query.is_empty() {
            out.push_str(&format!("    query: {}\n", step.generated_query));
            out.push_str(&format!("    rows:  {}\n", step.record_count));
        }
        if let Some(error) = &step.error {
            out.push_str(&format!("    = {}\n", error));
        }
    }

    out.push('\n');
    match result.failed_step() {
        _ if result.is_success => out.push_str(&format!(
            "Row {} = {} passes every clause of the query\n",
            key_column, key
        )),
        Some(step) => out.push_str(&format!(
            "Row {} = {} is dropped at: {}\n",
            key_column, key, step.name
        )),
        None => out.push_str(&format!(
            "Row {} = {} could not be traced\n",
            key_column, key
        )),
    }
    out
}

fn render_structure(parsed: &ParsedQuery) -> String {
    let mut out = String::new();

    out.push_str(&format!("Main table: {}\n", parsed.main_table.source_sql()));

    if !parsed.joins.is_empty() {
        out.push_str("Joins:\n");
        for (i, join) in parsed.joins.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, join.clause_sql()));
        }
    }

    if !parsed.filters.is_empty() {
        out.push_str("Filters:\n");
        for (i, filter) in parsed.filters.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, filter.condition));
        }
    }
    out
}
