//! Recent connection strings and the last analyzed query

use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MAX_RECENT_CONNECTIONS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryData {
    /// Most recent first, no duplicates
    #[serde(default)]
    pub recent_connection_strings: Vec<String>,
    #[serde(default)]
    pub last_query: Option<String>,
}

impl HistoryData {
    /// Load history, falling back to an empty one when missing or unreadable
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no history loaded");
                return Self::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::debug!(path = %path.display(), error = %e, "ignoring malformed history");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).into_diagnostic()?;
        std::fs::write(path, json).into_diagnostic()
    }

    pub fn remember_connection(&mut self, connection: &str) {
        self.recent_connection_strings.retain(|c| c != connection);
        self.recent_connection_strings
            .insert(0, connection.to_string());
        self.recent_connection_strings
            .truncate(MAX_RECENT_CONNECTIONS);
    }

    pub fn remember_query(&mut self, query: &str) {
        self.last_query = Some(query.to_string());
    }

    pub fn most_recent_connection(&self) -> Option<&str> {
        self.recent_connection_strings.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_most_recent_first_without_duplicates() {
        let mut history = HistoryData::default();
        history.remember_connection("a");
        history.remember_connection("b");
        history.remember_connection("a");

        assert_eq!(history.recent_connection_strings, vec!["a", "b"]);
        assert_eq!(history.most_recent_connection(), Some("a"));
    }

    #[test]
    fn test_keeps_five_connections() {
        let mut history = HistoryData::default();
        for conn in ["1", "2", "3", "4", "5", "6"] {
            history.remember_connection(conn);
        }

        assert_eq!(
            history.recent_connection_strings,
            vec!["6", "5", "4", "3", "2"]
        );
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "rowprobe-history-test-{}.json",
            std::process::id()
        ));
        let mut history = HistoryData::default();
        history.remember_connection("host=db");
        history.remember_query("SELECT * FROM t");

        history.save(&path).unwrap();
        let loaded = HistoryData::load(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, history);
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let loaded = HistoryData::load(Path::new("/nonexistent/rowprobe/history.json"));
        assert_eq!(loaded, HistoryData::default());
    }
}
