//! Join failure diagnoser
//!
//! Best-effort heuristic over the canonical join condition text: find the
//! first `alias.column` reference whose alias is already proven present for
//! the target row and report that column's actual value. Conditions built
//! from function calls or several columns can be mis-attributed.

use indexmap::IndexSet;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::executor::QueryExecutor;

/// Matches `alias.column`
/// Captures: (1) alias, (2) column
static QUALIFIED_COLUMN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z0-9_]+)\.([a-zA-Z0-9_]+)").unwrap());

/// Aliases of tables already joined for the target row (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct AliasSet {
    aliases: IndexSet<String>,
}

impl AliasSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: &str) {
        self.aliases.insert(alias.to_lowercase());
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains(&alias.to_lowercase())
    }
}

impl<'a> FromIterator<&'a str> for AliasSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = AliasSet::new();
        for alias in iter {
            set.insert(alias);
        }
        set
    }
}

/// An `alias.column` reference found in a join condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

/// All references on the already-joined side, in textual order
pub fn source_columns<'a>(
    condition: &'a str,
    aliases: &'a AliasSet,
) -> impl Iterator<Item = ColumnRef> + 'a {
    QUALIFIED_COLUMN_PATTERN
        .captures_iter(condition)
        .filter(|caps| aliases.contains(&caps[1]))
        .map(|caps| ColumnRef {
            alias: caps[1].to_string(),
            column: caps[2].to_string(),
        })
}

/// First reference on the already-joined side
pub fn source_column(condition: &str, aliases: &AliasSet) -> Option<ColumnRef> {
    source_columns(condition, aliases).next()
}

/// Explain a join miss by looking at the source column's value
///
/// `pre_join_from` is the FROM chain before the failing join and
/// `key_predicate` the `<base>.<key> = <placeholder>` test. Returns `None`
/// when no candidate column could be inspected.
pub async fn diagnose<E: QueryExecutor + ?Sized>(
    executor: &E,
    pre_join_from: &str,
    key_predicate: &str,
    key: &str,
    condition: &str,
    aliases: &AliasSet,
) -> Option<String> {
    let candidates: Vec<ColumnRef> = source_columns(condition, aliases).collect();

    for column in candidates {
        let sql = format!("SELECT {} {} WHERE {}", column, pre_join_from, key_predicate);
        debug!(%sql, "inspecting join source column");

        match executor.scalar(&sql, key).await {
            Ok(None) => {
                return Some(format!(
                    "Join failed because source column '{}' is NULL.",
                    column
                ))
            }
            Ok(Some(value)) => {
                return Some(format!(
                    "Join failed. Source value for '{}' is '{}', but no match found in target table.",
                    column, value
                ))
            }
            Err(e) => debug!(%column, error = %e, "source column lookup failed, trying next"),
        }
    }
    None
}
