//! Configuration file handling

use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::args::OutputFormat;

const CONFIG_FILE: &str = "rowprobe.toml";
const DEFAULT_HISTORY_FILE: &str = ".rowprobe_history.json";

/// Configuration for rowprobe
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database connection string
    #[serde(default)]
    pub connection: Option<String>,

    /// SQL dialect (postgresql, mysql, mssql)
    #[serde(default)]
    pub dialect: Option<String>,

    /// Output format (human, json)
    #[serde(default)]
    pub format: Option<String>,

    /// Where recent connections and the last query are kept
    #[serde(default)]
    pub history_file: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).into_diagnostic()?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).into_diagnostic()
    }

    /// Try to find and load rowprobe.toml in current directory or parent directories
    pub fn find_and_load() -> Result<Option<Self>> {
        let mut current_dir = std::env::current_dir().into_diagnostic()?;

        loop {
            let config_path = current_dir.join(CONFIG_FILE);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "loading configuration");
                return Ok(Some(Self::from_file(&config_path)?));
            }

            // Try parent directory
            if !current_dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Merge CLI arguments into configuration
    /// CLI arguments take precedence over config file values
    pub fn merge_with_args(
        mut self,
        connection: &Option<String>,
        dialect: &Option<String>,
        format: &Option<OutputFormat>,
    ) -> Self {
        if connection.is_some() {
            self.connection = connection.clone();
        }

        if dialect.is_some() {
            self.dialect = dialect.clone();
        }

        if let Some(fmt) = format {
            self.format = Some(format!("{:?}", fmt).to_lowercase());
        }

        self
    }

    pub fn output_format(&self) -> OutputFormat {
        match self.format.as_deref() {
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Human,
        }
    }

    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(
            self.history_file
                .as_deref()
                .unwrap_or(DEFAULT_HISTORY_FILE),
        )
    }
}
