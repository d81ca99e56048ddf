//! rowprobe-core: explain why a row is missing from a SELECT result
//!
//! The query is decomposed into its base table, joins and filters, then
//! narrowed COUNT queries are re-run one clause at a time against a live
//! database until the clause that drops the target row is found.

pub mod analyzer;
pub mod decompose;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod model;

pub use analyzer::Analyzer;
pub use decompose::{decompose, decompose_sql, parse_select};
pub use dialect::SqlDialect;
pub use error::{DecomposeError, ExecutorError};
pub use executor::QueryExecutor;
pub use model::{
    AnalysisResult, FilterNode, JoinKind, JoinNode, ParsedQuery, StepKind, StepResult, TableNode,
};
