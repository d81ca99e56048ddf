//! Structural model of a decomposed query and the analysis trace

use serde::{Deserialize, Serialize};

/// A table reference from the FROM clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    pub schema: String,
    pub name: String,
    pub alias: Option<String>,
}

impl TableNode {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name the table is bound to in generated SQL
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// `schema.table`, or just `table` when the schema is empty
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    /// `schema.table AS alias`
    pub fn source_sql(&self) -> String {
        format!("{} AS {}", self.qualified_name(), self.binding())
    }
}

/// Join kinds that can be re-synthesised incrementally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }

    /// Outer joins keep the row even when no partner matches
    pub fn is_outer(&self) -> bool {
        !matches!(self, JoinKind::Inner)
    }
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One join of the FROM chain, in left-to-right order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNode {
    pub table: TableNode,
    pub kind: JoinKind,
    /// Canonical text of the ON predicate
    pub condition: String,
}

impl JoinNode {
    /// `<KIND> JOIN schema.table AS alias ON <condition>`
    pub fn clause_sql(&self) -> String {
        format!(
            "{} JOIN {} ON {}",
            self.kind,
            self.table.source_sql(),
            self.condition
        )
    }
}

/// One top-level AND conjunct of the WHERE clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterNode {
    pub condition: String,
}

/// Decomposed SELECT: main table, ordered joins, ordered filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub main_table: TableNode,
    pub joins: Vec<JoinNode>,
    pub filters: Vec<FilterNode>,
}

/// Which part of the query a step checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Parse,
    BaseTable,
    Join,
    Filter,
}

/// One entry of the diagnostic trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub kind: StepKind,
    pub name: String,
    pub description: String,
    pub passed: bool,
    pub error: Option<String>,
    /// Exact SQL executed for this step, empty when nothing ran
    pub generated_query: String,
    pub record_count: i64,
    /// False for misses that do not remove the row (outer joins)
    #[serde(default = "default_blocking")]
    pub blocking: bool,
}

fn default_blocking() -> bool {
    true
}

impl StepResult {
    pub(crate) fn new(
        kind: StepKind,
        name: impl Into<String>,
        description: impl Into<String>,
        generated_query: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            passed: false,
            error: None,
            generated_query: generated_query.into(),
            record_count: 0,
            blocking: true,
        }
    }

    pub(crate) fn fail(mut self, error: impl Into<String>) -> Self {
        self.passed = false;
        self.error = Some(error.into());
        self
    }
}

/// Ordered trace of an analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_success: bool,
    pub steps: Vec<StepResult>,
}

impl AnalysisResult {
    /// First step that removed the row, if any
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.passed && s.blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_falls_back_to_name() {
        let table = TableNode::new("dbo", "Orders");
        assert_eq!(table.binding(), "Orders");
        assert_eq!(table.source_sql(), "dbo.Orders AS Orders");

        let aliased = TableNode::new("dbo", "Orders").with_alias("o");
        assert_eq!(aliased.binding(), "o");
    }

    #[test]
    fn test_empty_schema_is_not_rendered() {
        let table = TableNode::new("", "orders").with_alias("o");
        assert_eq!(table.source_sql(), "orders AS o");
    }

    #[test]
    fn test_join_clause() {
        let join = JoinNode {
            table: TableNode::new("public", "orders").with_alias("o"),
            kind: JoinKind::Left,
            condition: "u.id = o.user_id".to_string(),
        };
        assert_eq!(
            join.clause_sql(),
            "LEFT JOIN public.orders AS o ON u.id = o.user_id"
        );
    }
}
