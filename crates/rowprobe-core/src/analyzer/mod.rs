//! Incremental validator - localizes the clause that drops the target row

mod diagnose;

use tracing::{debug, info};

use crate::decompose::decompose_sql;
use crate::dialect::SqlDialect;
use crate::executor::QueryExecutor;
use crate::model::{AnalysisResult, JoinKind, ParsedQuery, StepKind, StepResult};

pub use diagnose::{diagnose, source_column, source_columns, AliasSet, ColumnRef};

const BASE_MISS: &str = "Record not found in base table.";
const JOIN_MISS: &str = "Join failed. No matching records found.";
const FILTER_MISS: &str = "Filter criteria not met.";

/// The kind of clause a step checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BaseTable,
    Join(JoinKind),
    Filter,
}

/// What a step's query reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// Ran fine, zero rows
    Miss,
    /// The driver failed
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

impl Checkpoint {
    /// Whether the trace goes on after this checkpoint
    ///
    /// Only an outer join can miss without removing the row.
    pub fn flow(self, outcome: Outcome) -> Flow {
        match (self, outcome) {
            (_, Outcome::Passed) => Flow::Continue,
            (_, Outcome::Error) => Flow::Halt,
            (Checkpoint::Join(kind), Outcome::Miss) if kind.is_outer() => Flow::Continue,
            (_, Outcome::Miss) => Flow::Halt,
        }
    }
}

/// Result of one existence count
enum Probe {
    Found(i64),
    Missing,
    Failed(String),
}

impl Probe {
    fn outcome(&self) -> Outcome {
        match self {
            Probe::Found(_) => Outcome::Passed,
            Probe::Missing => Outcome::Miss,
            Probe::Failed(_) => Outcome::Error,
        }
    }
}

impl StepResult {
    fn with_probe(mut self, probe: &Probe, miss_reason: &str) -> Self {
        match probe {
            Probe::Found(count) => {
                self.passed = true;
                self.record_count = *count;
                self
            }
            Probe::Missing => self.fail(miss_reason),
            Probe::Failed(message) => self.fail(message.as_str()),
        }
    }
}

/// Forward-only step accumulator
#[derive(Default)]
struct Trace {
    steps: Vec<StepResult>,
}

impl Trace {
    fn record(&mut self, checkpoint: Checkpoint, mut step: StepResult, outcome: Outcome) -> Flow {
        let flow = checkpoint.flow(outcome);
        step.blocking = !(outcome == Outcome::Miss && flow == Flow::Continue);

        info!(
            step = %step.name,
            passed = step.passed,
            rows = step.record_count,
            "step finished"
        );
        self.steps.push(step);
        flow
    }

    fn finish(self, is_success: bool) -> AnalysisResult {
        AnalysisResult {
            is_success,
            steps: self.steps,
        }
    }
}

/// Re-runs narrowed COUNT queries to find where a row disappears
pub struct Analyzer {
    dialect: SqlDialect,
}

impl Analyzer {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    /// Parse, decompose and analyze query text
    ///
    /// A query that cannot be decomposed yields a single failed `Parse` step.
    pub async fn analyze_sql<E: QueryExecutor + ?Sized>(
        &self,
        executor: &E,
        sql: &str,
        key_column: &str,
        key: &str,
    ) -> AnalysisResult {
        match decompose_sql(sql, self.dialect) {
            Ok(parsed) => self.analyze(executor, &parsed, key_column, key).await,
            Err(e) => {
                info!(error = %e, "query could not be decomposed");
                let step = StepResult::new(StepKind::Parse, "Parse", "Parsing SQL", "")
                    .fail(e.to_string());
                AnalysisResult {
                    is_success: false,
                    steps: vec![step],
                }
            }
        }
    }

    /// Check base table, then each join, then each filter
    pub async fn analyze<E: QueryExecutor + ?Sized>(
        &self,
        executor: &E,
        parsed: &ParsedQuery,
        key_column: &str,
        key: &str,
    ) -> AnalysisResult {
        let mut trace = Trace::default();

        let base = &parsed.main_table;
        let key_predicate = format!(
            "{}.{} = {}",
            base.binding(),
            key_column,
            self.dialect.key_placeholder()
        );
        let mut from = format!("FROM {}", base.source_sql());
        let mut aliases = AliasSet::new();

        let sql = format!("SELECT COUNT(1) {} WHERE {}", from, key_predicate);
        let step = StepResult::new(
            StepKind::BaseTable,
            "Base Table Check",
            format!("Checking existence in {}", base.name),
            sql.as_str(),
        );
        let probe = count_rows(executor, &sql, key).await;
        let step = step.with_probe(&probe, BASE_MISS);
        if trace.record(Checkpoint::BaseTable, step, probe.outcome()) == Flow::Halt {
            return trace.finish(false);
        }
        aliases.insert(base.binding());

        for join in &parsed.joins {
            let clause = join.clause_sql();
            let sql = format!("SELECT COUNT(1) {} {} WHERE {}", from, clause, key_predicate);
            let step = StepResult::new(
                StepKind::Join,
                format!("Join Check: {}", join.table.name),
                format!("Checking join with {}", join.table.name),
                sql.as_str(),
            );

            let probe = count_rows(executor, &sql, key).await;
            let miss_reason = match probe {
                Probe::Missing => {
                    diagnose(executor, &from, &key_predicate, key, &join.condition, &aliases)
                        .await
                        .unwrap_or_else(|| JOIN_MISS.to_string())
                }
                _ => String::new(),
            };
            let step = step.with_probe(&probe, &miss_reason);
            if trace.record(Checkpoint::Join(join.kind), step, probe.outcome()) == Flow::Halt {
                return trace.finish(false);
            }

            from.push(' ');
            from.push_str(&clause);
            aliases.insert(join.table.binding());
        }

        // Each filter is tested alone against the full join chain
        for filter in &parsed.filters {
            let sql = format!(
                "SELECT COUNT(1) {} WHERE {} AND ({})",
                from, key_predicate, filter.condition
            );
            let step = StepResult::new(
                StepKind::Filter,
                "Filter Check",
                format!("Checking filter: {}", filter.condition),
                sql.as_str(),
            );
            let probe = count_rows(executor, &sql, key).await;
            let step = step.with_probe(&probe, FILTER_MISS);
            if trace.record(Checkpoint::Filter, step, probe.outcome()) == Flow::Halt {
                return trace.finish(false);
            }
        }

        trace.finish(true)
    }
}

async fn count_rows<E: QueryExecutor + ?Sized>(executor: &E, sql: &str, key: &str) -> Probe {
    debug!(%sql, "counting");
    match executor.count(sql, key).await {
        Ok(count) if count > 0 => Probe::Found(count),
        Ok(_) => Probe::Missing,
        Err(e) => Probe::Failed(e.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    /// Every count returns the same number
    struct FixedCount(i64);

    #[async_trait]
    impl QueryExecutor for FixedCount {
        async fn count(&self, _sql: &str, _key: &str) -> Result<i64, ExecutorError> {
            Ok(self.0)
        }

        async fn scalar(&self, _sql: &str, _key: &str) -> Result<Option<String>, ExecutorError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_every_clause_is_counted() {
        let analyzer = Analyzer::new(SqlDialect::PostgreSQL);

        let result = analyzer
            .analyze_sql(
                &FixedCount(3),
                "SELECT * FROM a JOIN b ON a.id = b.a_id WHERE a.x = 1",
                "id",
                "1",
            )
            .await;

        assert!(result.is_success);
        let counts: Vec<i64> = result.steps.iter().map(|s| s.record_count).collect();
        assert_eq!(counts, vec![3, 3, 3]);
    }

    #[test]
    fn test_pass_always_continues() {
        for checkpoint in [
            Checkpoint::BaseTable,
            Checkpoint::Join(JoinKind::Inner),
            Checkpoint::Join(JoinKind::Left),
            Checkpoint::Filter,
        ] {
            assert_eq!(checkpoint.flow(Outcome::Passed), Flow::Continue);
            assert_eq!(checkpoint.flow(Outcome::Error), Flow::Halt);
        }
    }

    #[test]
    fn test_miss_halts_except_outer_joins() {
        assert_eq!(Checkpoint::BaseTable.flow(Outcome::Miss), Flow::Halt);
        assert_eq!(Checkpoint::Join(JoinKind::Inner).flow(Outcome::Miss), Flow::Halt);
        assert_eq!(Checkpoint::Filter.flow(Outcome::Miss), Flow::Halt);

        for kind in [JoinKind::Left, JoinKind::Right, JoinKind::Full] {
            assert_eq!(Checkpoint::Join(kind).flow(Outcome::Miss), Flow::Continue);
        }
    }

    #[test]
    fn test_outer_miss_is_recorded_as_non_blocking() {
        let mut trace = Trace::default();
        let step = StepResult::new(StepKind::Join, "Join Check: b", "", "").fail(JOIN_MISS);

        let flow = trace.record(Checkpoint::Join(JoinKind::Left), step, Outcome::Miss);

        assert_eq!(flow, Flow::Continue);
        assert!(!trace.steps[0].blocking);
        assert!(trace.finish(true).failed_step().is_none());
    }
}
