//! Error types

use miette::Diagnostic;
use thiserror::Error;

/// Failure to turn query text into a structural model
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DecomposeError {
    /// The SQL text could not be parsed
    #[error("SQL Parse Error: {0}")]
    #[diagnostic(code(rowprobe::parse))]
    Parse(String),

    /// Nothing but whitespace or comments was supplied
    #[error("No SQL statement found")]
    #[diagnostic(code(rowprobe::empty))]
    Empty,

    /// More than one statement was supplied
    #[error("Expected a single SELECT statement, found {0} statements")]
    #[diagnostic(code(rowprobe::multiple_statements))]
    MultipleStatements(usize),

    /// The statement is not a query
    #[error("Only SELECT statements can be analyzed")]
    #[diagnostic(code(rowprobe::not_a_select))]
    NotASelect,

    /// The query uses a construct that cannot be decomposed
    #[error("Unsupported query construct: {0}")]
    #[diagnostic(
        code(rowprobe::unsupported),
        help("Only a single SELECT ... FROM ... [JOIN ...] [WHERE ...] can be decomposed")
    )]
    Unsupported(String),

    /// A join that cannot be re-synthesised as `<KIND> JOIN ... ON ...`
    #[error("Unsupported join: {0}")]
    #[diagnostic(
        code(rowprobe::unsupported_join),
        help("Rewrite the join as INNER/LEFT/RIGHT/FULL JOIN ... ON <condition>")
    )]
    UnsupportedJoin(String),

    /// The FROM clause has no named table to start from
    #[error("Could not identify main table.")]
    #[diagnostic(code(rowprobe::no_main_table))]
    NoMainTable,
}

/// Failure reported by the database client
///
/// The message is the driver's own text, carried verbatim into the trace.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(rowprobe::driver))]
pub struct ExecutorError {
    pub message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
