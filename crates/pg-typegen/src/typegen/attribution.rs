//! Best-effort mapping of output columns back to source tables.
//!
//! The oracle reports labels and types but not where a column came from;
//! this pass parses the normalized SQL to recover that attribution for
//! plain column references (including RETURNING clauses), to identify the
//! set of source tables for name derivation, and to spot expressions that
//! are provably non-null. Anything the parser cannot see through simply
//! stays unattributed; the oracle's answer is always sufficient on its own.

use std::collections::{BTreeSet, HashMap, HashSet};

use sqlparser::{
  ast::{
    Delete, Expr, FromTable, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Insert, ObjectName, Query,
    Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins, Value,
  },
  dialect::PostgreSqlDialect,
  parser::Parser,
};

/// Where one output label points, before catalog resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHint {
  pub column: String,
  /// Table name or alias written in the qualifier, when present.
  pub qualifier: Option<String>,
}

#[derive(Debug, Default)]
pub struct QueryAnalysis {
  /// True when every FROM item is a plain table reference and the query has
  /// no CTEs or set operations; only then is table attribution trustworthy.
  pub simple_source: bool,
  /// Distinct table names in scope, as written (possibly schema-qualified).
  pub tables: BTreeSet<String>,
  pub aliases: HashMap<String, String>,
  /// `select *` style projection over the source table.
  pub has_wildcard: bool,
  /// Output label -> column reference hint.
  pub hints: HashMap<String, ColumnHint>,
  /// Labels whose defining expression is provably non-null.
  pub not_null_labels: HashSet<String>,
}

impl QueryAnalysis {
  /// The single source table, when attribution is unambiguous.
  pub fn single_table(&self) -> Option<&str> {
    if self.simple_source && self.tables.len() == 1 {
      self.tables.iter().next().map(String::as_str)
    } else {
      None
    }
  }

  /// Resolves a label to (table, column), or None when the label is
  /// unattributed or the owning table is ambiguous.
  pub fn attributed_column(&self, label: &str) -> Option<(String, String)> {
    let hint = self.hints.get(label)?;
    let table = match &hint.qualifier {
      Some(q) => self.aliases.get(q).cloned().or_else(|| {
        self.tables.contains(q).then(|| q.clone())
      })?,
      None => self.single_table()?.to_string(),
    };
    Some((table, hint.column.clone()))
  }
}

/// Analyzes one normalized single-statement query. Parser failures yield an
/// empty analysis; the oracle remains the authority on validity.
pub fn analyze(sql: &str) -> QueryAnalysis {
  let statements = match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
    Ok(statements) => statements,
    Err(_) => return QueryAnalysis::default(),
  };
  let [statement] = statements.as_slice() else {
    return QueryAnalysis::default();
  };

  let mut analysis = QueryAnalysis::default();
  match statement {
    Statement::Query(query) => analyze_query(query, &mut analysis),
    Statement::Insert(Insert { table_name, table_alias, returning, .. }) => {
      analysis.simple_source = true;
      add_table(&mut analysis, table_name, table_alias.as_ref().map(|a| a.value.clone()));
      if let Some(items) = returning {
        analyze_projection(items, &mut analysis);
      }
    }
    Statement::Update { table, returning, .. } => {
      collect_from(std::slice::from_ref(table), &mut analysis);
      if let Some(items) = returning {
        analyze_projection(items, &mut analysis);
      }
    }
    Statement::Delete(Delete { from, returning, .. }) => {
      let tables = match from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
      };
      collect_from(tables, &mut analysis);
      if let Some(items) = returning {
        analyze_projection(items, &mut analysis);
      }
    }
    _ => {}
  }
  analysis
}

fn analyze_query(query: &Query, analysis: &mut QueryAnalysis) {
  if query.with.is_some() {
    // CTE scoping is out of reach for this pass.
    return;
  }
  if let SetExpr::Select(select) = query.body.as_ref() {
    analyze_select(select, analysis);
  }
}

fn analyze_select(select: &Select, analysis: &mut QueryAnalysis) {
  collect_from(&select.from, analysis);
  analyze_projection(&select.projection, analysis);
}

fn collect_from(from: &[TableWithJoins], analysis: &mut QueryAnalysis) {
  analysis.simple_source = true;
  for item in from {
    collect_factor(&item.relation, analysis);
    for join in &item.joins {
      collect_factor(&join.relation, analysis);
    }
  }
}

fn collect_factor(factor: &TableFactor, analysis: &mut QueryAnalysis) {
  match factor {
    TableFactor::Table { name, alias, .. } => {
      add_table(analysis, name, alias.as_ref().map(|a| a.name.value.clone()));
    }
    _ => {
      // Derived tables, VALUES, functions: no attribution through these.
      analysis.simple_source = false;
    }
  }
}

fn add_table(analysis: &mut QueryAnalysis, name: &ObjectName, alias: Option<String>) {
  let table = object_name(name);
  if let Some(alias) = alias {
    analysis.aliases.insert(alias, table.clone());
  }
  analysis.tables.insert(table);
}

fn analyze_projection(items: &[SelectItem], analysis: &mut QueryAnalysis) {
  for item in items {
    match item {
      SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => analysis.has_wildcard = true,
      SelectItem::UnnamedExpr(expr) => record_item(expr, None, analysis),
      SelectItem::ExprWithAlias { expr, alias } => record_item(expr, Some(alias.value.clone()), analysis),
    }
  }
}

fn record_item(expr: &Expr, alias: Option<String>, analysis: &mut QueryAnalysis) {
  let label = alias.or_else(|| default_label(expr));
  let Some(label) = label else { return };

  if expr_not_null(expr) {
    analysis.not_null_labels.insert(label.clone());
  }
  if let Some(hint) = column_hint(expr) {
    analysis.hints.insert(label, hint);
  }
}

/// The label PostgreSQL itself would assign to an unaliased expression, for
/// the cases this pass can attribute or prove non-null. Everything else
/// (operators and the like) gets `?column?` labels we never need to match.
fn default_label(expr: &Expr) -> Option<String> {
  match expr {
    Expr::Identifier(ident) => Some(ident.value.clone()),
    Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.clone()),
    Expr::Function(function) => function.name.0.last().map(|i| i.value.to_lowercase()),
    Expr::Cast { expr, .. } | Expr::Nested(expr) => default_label(expr),
    _ => None,
  }
}

fn column_hint(expr: &Expr) -> Option<ColumnHint> {
  match expr {
    Expr::Identifier(ident) => Some(ColumnHint { column: ident.value.clone(), qualifier: None }),
    Expr::CompoundIdentifier(parts) => {
      let column = parts.last()?.value.clone();
      let qualifier = (parts.len() > 1).then(|| parts[parts.len() - 2].value.clone());
      Some(ColumnHint { column, qualifier })
    }
    _ => None,
  }
}

/// `count(*)` never returns null; `coalesce` with a non-null literal
/// argument cannot return null either.
fn expr_not_null(expr: &Expr) -> bool {
  match expr {
    Expr::Function(function) => {
      let name = function.name.0.last().map(|i| i.value.to_lowercase());
      match name.as_deref() {
        Some("count") => true,
        Some("coalesce") => function_args(function).iter().any(|arg| matches!(
          arg,
          Expr::Value(value) if !matches!(value, Value::Null)
        )),
        _ => false,
      }
    }
    Expr::Cast { expr, .. } | Expr::Nested(expr) => expr_not_null(expr),
    _ => false,
  }
}

fn function_args(function: &Function) -> Vec<&Expr> {
  match &function.args {
    FunctionArguments::List(list) => list
      .args
      .iter()
      .filter_map(|arg| match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Some(expr),
        _ => None,
      })
      .collect(),
    _ => Vec::new(),
  }
}

fn object_name(name: &ObjectName) -> String {
  name.0.iter().map(|i| i.value.clone()).collect::<Vec<_>>().join(".")
}
