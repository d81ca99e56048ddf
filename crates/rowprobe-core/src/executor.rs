//! Database client seam used by the analyzer

use async_trait::async_trait;

use crate::error::ExecutorError;

/// Executes generated SQL with the key value bound as the only parameter
///
/// Implementations must bind `key` through the driver's parameter mechanism
/// in place of [`SqlDialect::key_placeholder`](crate::SqlDialect::key_placeholder),
/// never by splicing it into the text.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a `SELECT COUNT(1) ...` and return the count
    async fn count(&self, sql: &str, key: &str) -> Result<i64, ExecutorError>;

    /// Run a single-column query and return the first value as text
    ///
    /// `None` when the value is NULL or no row came back.
    async fn scalar(&self, sql: &str, key: &str) -> Result<Option<String>, ExecutorError>;
}
