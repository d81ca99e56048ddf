//! Query decomposer - turns a SELECT syntax tree into a [`ParsedQuery`]

use sqlparser::ast::{
    BinaryOperator, Expr, Join, JoinConstraint, JoinOperator, ObjectName, Query, Select, SetExpr,
    Statement, TableAlias, TableFactor, TableWithJoins,
};
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use crate::dialect::SqlDialect;
use crate::error::DecomposeError;
use crate::model::{FilterNode, JoinKind, JoinNode, ParsedQuery, TableNode};

/// Parse SQL text that must contain exactly one SELECT statement
pub fn parse_select(sql: &str, dialect: SqlDialect) -> Result<Statement, DecomposeError> {
    let parser_dialect = dialect.parser_dialect();
    let mut statements = Parser::parse_sql(parser_dialect.as_ref(), sql)
        .map_err(|e| DecomposeError::Parse(e.to_string()))?;

    match statements.len() {
        0 => Err(DecomposeError::Empty),
        1 => Ok(statements.remove(0)),
        n => Err(DecomposeError::MultipleStatements(n)),
    }
}

/// Parse and decompose in one go
pub fn decompose_sql(sql: &str, dialect: SqlDialect) -> Result<ParsedQuery, DecomposeError> {
    let statement = parse_select(sql, dialect)?;
    decompose(&statement, dialect)
}

/// Decompose a parsed statement into main table, joins and filters
pub fn decompose(stmt: &Statement, dialect: SqlDialect) -> Result<ParsedQuery, DecomposeError> {
    let Statement::Query(query) = stmt else {
        return Err(DecomposeError::NotASelect);
    };

    let mut decomposer = Decomposer::new(dialect.default_schema());
    decomposer.visit_query(query)?;
    decomposer.finish()
}

/// Accumulates the structural model while walking the tree
struct Decomposer {
    default_schema: &'static str,
    main_table: Option<TableNode>,
    joins: Vec<JoinNode>,
    filters: Vec<FilterNode>,
}

impl Decomposer {
    fn new(default_schema: &'static str) -> Self {
        Self {
            default_schema,
            main_table: None,
            joins: Vec::new(),
            filters: Vec::new(),
        }
    }

    fn finish(self) -> Result<ParsedQuery, DecomposeError> {
        let main_table = self.main_table.ok_or(DecomposeError::NoMainTable)?;
        debug!(
            main_table = %main_table.qualified_name(),
            joins = self.joins.len(),
            filters = self.filters.len(),
            "decomposed query"
        );
        Ok(ParsedQuery {
            main_table,
            joins: self.joins,
            filters: self.filters,
        })
    }

    fn visit_query(&mut self, query: &Query) -> Result<(), DecomposeError> {
        if query.with.is_some() {
            return Err(DecomposeError::Unsupported("WITH clause".to_string()));
        }
        self.visit_set_expr(&query.body)
    }

    fn visit_set_expr(&mut self, set_expr: &SetExpr) -> Result<(), DecomposeError> {
        match set_expr {
            SetExpr::Select(select) => self.visit_select(select),
            // Parenthesised query: (SELECT ...)
            SetExpr::Query(query) => self.visit_query(query),
            SetExpr::SetOperation { op, .. } => Err(DecomposeError::Unsupported(format!(
                "{} of several queries",
                op
            ))),
            _ => Err(DecomposeError::NotASelect),
        }
    }

    fn visit_select(&mut self, select: &Select) -> Result<(), DecomposeError> {
        if select.from.len() > 1 {
            warn!(
                items = select.from.len(),
                "comma-separated FROM items are not joined; the first named table is the main table"
            );
        }
        for table in &select.from {
            self.visit_table_with_joins(table)?;
        }

        if let Some(selection) = &select.selection {
            self.visit_condition(selection);
        }
        Ok(())
    }

    /// Left operand first, then each join in textual order
    fn visit_table_with_joins(&mut self, table: &TableWithJoins) -> Result<(), DecomposeError> {
        self.visit_relation(&table.relation)?;

        for join in &table.joins {
            self.visit_join(join)?;
        }
        Ok(())
    }

    fn visit_relation(&mut self, factor: &TableFactor) -> Result<(), DecomposeError> {
        match factor {
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins),
            _ => {
                match self.named_table(factor) {
                    Some(table) if self.main_table.is_none() => self.main_table = Some(table),
                    Some(table) => {
                        warn!(table = %table.qualified_name(), "ignoring extra FROM table")
                    }
                    None => {
                        warn!(relation = %factor, "ignoring FROM item that is not a named table")
                    }
                }
                Ok(())
            }
        }
    }

    fn visit_join(&mut self, join: &Join) -> Result<(), DecomposeError> {
        let Some(table) = self.named_table(&join.relation) else {
            warn!(relation = %join.relation, "skipping join whose right side is not a named table");
            return Ok(());
        };

        let (kind, constraint) = match &join.join_operator {
            JoinOperator::Inner(c) => (JoinKind::Inner, c),
            JoinOperator::LeftOuter(c) => (JoinKind::Left, c),
            JoinOperator::RightOuter(c) => (JoinKind::Right, c),
            JoinOperator::FullOuter(c) => (JoinKind::Full, c),
            _ => return Err(DecomposeError::UnsupportedJoin(join.to_string())),
        };

        let JoinConstraint::On(on) = constraint else {
            return Err(DecomposeError::UnsupportedJoin(join.to_string()));
        };

        self.joins.push(JoinNode {
            table,
            kind,
            condition: on.to_string(),
        });
        Ok(())
    }

    /// Split top-level ANDs, left first; everything else is one leaf
    fn visit_condition(&mut self, expr: &Expr) {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                self.visit_condition(left);
                self.visit_condition(right);
            }
            _ => self.filters.push(FilterNode {
                condition: expr.to_string(),
            }),
        }
    }

    fn named_table(&self, factor: &TableFactor) -> Option<TableNode> {
        match factor {
            // Table-valued function calls carry args
            TableFactor::Table {
                name,
                alias,
                args: None,
                ..
            } => Some(self.table_node(name, alias.as_ref())),
            _ => None,
        }
    }

    fn table_node(&self, name: &ObjectName, alias: Option<&TableAlias>) -> TableNode {
        let parts = &name.0;
        // Display keeps quotes: "Order Items", [Order]
        let table = parts.last().map(|id| id.to_string()).unwrap_or_default();
        let schema = match parts.len() {
            n if n >= 2 => parts[n - 2].to_string(),
            _ => self.default_schema.to_string(),
        };

        TableNode {
            schema,
            name: table,
            alias: alias.map(|a| a.name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn conditions(parsed: &ParsedQuery) -> Vec<&str> {
        parsed.filters.iter().map(|f| f.condition.as_str()).collect()
    }

    #[test]
    fn test_main_table_only() {
        let parsed = decompose_sql("SELECT * FROM users", SqlDialect::PostgreSQL).unwrap();
        assert_eq!(parsed.main_table, TableNode::new("public", "users"));
        assert!(parsed.joins.is_empty());
        assert!(parsed.filters.is_empty());
    }

    #[test]
    fn test_schema_and_alias() {
        let parsed =
            decompose_sql("SELECT * FROM sales.orders AS o", SqlDialect::PostgreSQL).unwrap();
        assert_eq!(
            parsed.main_table,
            TableNode::new("sales", "orders").with_alias("o")
        );
    }

    #[test]
    fn test_mssql_default_schema_is_dbo() {
        let parsed = decompose_sql("SELECT * FROM TableAs A", SqlDialect::MsSql).unwrap();
        assert_eq!(parsed.main_table.schema, "dbo");
        assert_eq!(parsed.main_table.binding(), "A");
    }

    #[test]
    fn test_and_chain_splits_in_order() {
        let parsed = decompose_sql(
            "SELECT * FROM t WHERE a = 1 AND b = 2 AND c = 3",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        assert_eq!(conditions(&parsed), vec!["a = 1", "b = 2", "c = 3"]);
    }

    #[test]
    fn test_or_is_single_leaf() {
        let parsed =
            decompose_sql("SELECT * FROM t WHERE a = 1 OR b = 2", SqlDialect::PostgreSQL).unwrap();
        assert_eq!(conditions(&parsed), vec!["a = 1 OR b = 2"]);
    }

    #[test]
    fn test_or_inside_and_stays_whole() {
        let parsed = decompose_sql(
            "SELECT * FROM t WHERE a = 1 AND (b = 2 OR c = 3)",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        assert_eq!(conditions(&parsed), vec!["a = 1", "(b = 2 OR c = 3)"]);
    }

    #[test]
    fn test_join_order_follows_from_clause() {
        let parsed = decompose_sql(
            "SELECT * FROM t1 JOIN t2 ON t1.id = t2.t1_id LEFT JOIN t3 ON t2.id = t3.t2_id",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        let names: Vec<_> = parsed.joins.iter().map(|j| j.table.name.as_str()).collect();
        assert_eq!(names, vec!["t2", "t3"]);
        assert_eq!(parsed.joins[0].kind, JoinKind::Inner);
        assert_eq!(parsed.joins[1].kind, JoinKind::Left);
        assert_eq!(parsed.joins[0].condition, "t1.id = t2.t1_id");
    }

    #[test]
    fn test_nested_join_unwinds_left_first() {
        let parsed = decompose_sql(
            "SELECT * FROM (a JOIN b ON a.id = b.a_id) JOIN c ON a.id = c.a_id",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        assert_eq!(parsed.main_table.name, "a");
        let names: Vec<_> = parsed.joins.iter().map(|j| j.table.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_right_and_full_joins() {
        let parsed = decompose_sql(
            "SELECT * FROM a RIGHT JOIN b ON a.id = b.id FULL OUTER JOIN c ON a.id = c.id",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        let kinds: Vec<_> = parsed.joins.iter().map(|j| j.kind).collect();
        assert_eq!(kinds, vec![JoinKind::Right, JoinKind::Full]);
    }

    #[test]
    fn test_subquery_filter_is_opaque() {
        let parsed = decompose_sql(
            "SELECT * FROM users u WHERE u.id IN (SELECT user_id FROM orders WHERE total > 5 AND paid)",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        assert_eq!(parsed.filters.len(), 1);
        assert!(parsed.filters[0].condition.starts_with("u.id IN (SELECT"));
    }

    #[test]
    fn test_derived_join_is_skipped() {
        let parsed = decompose_sql(
            "SELECT * FROM a JOIN (SELECT id FROM b) AS sub ON a.id = sub.id JOIN c ON a.id = c.id",
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        let names: Vec<_> = parsed.joins.iter().map(|j| j.table.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[test]
    fn test_canonical_text_is_deterministic() {
        let sql = "select * from t where   a=1   and b   in (1,2)";
        let first = decompose_sql(sql, SqlDialect::PostgreSQL).unwrap();
        let second = decompose_sql(sql, SqlDialect::PostgreSQL).unwrap();
        assert_eq!(first, second);
        assert_eq!(conditions(&first), vec!["a = 1", "b IN (1, 2)"]);
    }

    #[test]
    fn test_parse_error() {
        let err = decompose_sql("SELECT FROM WHERE", SqlDialect::PostgreSQL).unwrap_err();
        assert!(matches!(err, DecomposeError::Parse(_)));
    }

    #[test]
    fn test_empty_input() {
        let err = decompose_sql("  ", SqlDialect::PostgreSQL).unwrap_err();
        assert_eq!(err, DecomposeError::Empty);
    }

    #[test]
    fn test_multiple_statements() {
        let err = decompose_sql("SELECT 1 FROM a; SELECT 2 FROM b", SqlDialect::PostgreSQL)
            .unwrap_err();
        assert_eq!(err, DecomposeError::MultipleStatements(2));
    }

    #[test]
    fn test_not_a_select() {
        let err =
            decompose_sql("DELETE FROM users WHERE id = 1", SqlDialect::PostgreSQL).unwrap_err();
        assert_eq!(err, DecomposeError::NotASelect);
    }

    #[test]
    fn test_no_from_clause() {
        let err = decompose_sql("SELECT 1", SqlDialect::PostgreSQL).unwrap_err();
        assert_eq!(err, DecomposeError::NoMainTable);
    }

    #[test]
    fn test_union_is_unsupported() {
        let err = decompose_sql("SELECT id FROM a UNION SELECT id FROM b", SqlDialect::PostgreSQL)
            .unwrap_err();
        assert!(matches!(err, DecomposeError::Unsupported(_)));
    }

    #[test]
    fn test_cte_is_unsupported() {
        let err = decompose_sql(
            "WITH x AS (SELECT id FROM a) SELECT * FROM x",
            SqlDialect::PostgreSQL,
        )
        .unwrap_err();
        assert!(matches!(err, DecomposeError::Unsupported(_)));
    }

    #[test]
    fn test_using_join_is_unsupported() {
        let err = decompose_sql("SELECT * FROM a JOIN b USING (id)", SqlDialect::PostgreSQL)
            .unwrap_err();
        assert!(matches!(err, DecomposeError::UnsupportedJoin(_)));
    }

    #[test]
    fn test_cross_join_is_unsupported() {
        let err =
            decompose_sql("SELECT * FROM a CROSS JOIN b", SqlDialect::PostgreSQL).unwrap_err();
        assert!(matches!(err, DecomposeError::UnsupportedJoin(_)));
    }

    #[test]
    fn test_comma_join_takes_first_table() {
        let parsed = decompose_sql("SELECT * FROM a, b WHERE a.id = b.id", SqlDialect::PostgreSQL)
            .unwrap();
        assert_eq!(parsed.main_table, TableNode::new("public", "a"));
        assert!(parsed.joins.is_empty());
        assert_eq!(conditions(&parsed), vec!["a.id = b.id"]);
    }

    #[test]
    fn test_quoted_names_keep_quotes() {
        let parsed = decompose_sql(
            r#"SELECT * FROM "Order Items" oi JOIN "User" u ON u.id = oi.user_id"#,
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        assert_eq!(parsed.main_table.source_sql(), r#"public."Order Items" AS oi"#);
        assert_eq!(
            parsed.joins[0].clause_sql(),
            r#"INNER JOIN public."User" AS u ON u.id = oi.user_id"#
        );
    }

    #[test]
    fn test_bracketed_names_keep_brackets() {
        let parsed = decompose_sql(
            "SELECT * FROM [Order] o JOIN [Order Lines] l ON o.Id = l.OrderId",
            SqlDialect::MsSql,
        )
        .unwrap();
        assert_eq!(parsed.main_table.source_sql(), "dbo.[Order] AS o");
        assert_eq!(
            parsed.joins[0].clause_sql(),
            "INNER JOIN dbo.[Order Lines] AS l ON o.Id = l.OrderId"
        );
    }

    #[test]
    fn test_quoted_schema_and_alias() {
        let parsed = decompose_sql(
            r#"SELECT * FROM "Sales"."Orders" AS "O""#,
            SqlDialect::PostgreSQL,
        )
        .unwrap();
        assert_eq!(parsed.main_table.qualified_name(), r#""Sales"."Orders""#);
        assert_eq!(parsed.main_table.binding(), r#""O""#);
    }
}
