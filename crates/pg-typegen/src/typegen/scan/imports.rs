//! Import-binding resolution.
//!
//! Tag detection is binding-based, not textual: a template tagged `sql` only
//! counts when `sql` is actually imported from the configured module. This
//! pass builds the lookup table the scanner consults, and also hands the
//! patcher and the migration transform enough structure to rewrite import
//! lines without disturbing anything else.

use std::sync::LazyLock;

use regex::Regex;

use crate::typegen::model::Span;

/// Matches a whole import statement on masked text. String contents are
/// blanked by the lexer, so the quoted module is read back from the original
/// text via the capture span.
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?m)^[ \t]*import\b(?P<clause>[^;'"]*?)['"](?P<module>[^'"]*)['"][ \t]*;?"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBinding {
  pub imported: String,
  /// Local name, accounting for `as` renames.
  pub local: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportClause {
  /// `import type { ... }` / `import type * as ns`.
  pub type_only: bool,
  pub default: Option<String>,
  pub namespace: Option<String>,
  pub named: Vec<NamedBinding>,
}

#[derive(Debug, Clone)]
pub struct ImportStatement {
  /// Whole statement, without trailing newline.
  pub span: Span,
  pub line: usize,
  pub module: String,
  pub clause: ImportClause,
}

impl ImportStatement {
  pub fn local_for(&self, imported: &str) -> Option<&str> {
    self
      .clause
      .named
      .iter()
      .find(|b| b.imported == imported)
      .map(|b| b.local.as_str())
  }
}

fn parse_clause(clause: &str) -> ImportClause {
  let mut out = ImportClause::default();
  let mut rest = clause.trim();

  // Trailing `from` belongs to the statement grammar, not the clause.
  rest = rest.strip_suffix("from").unwrap_or(rest).trim_end();
  if rest.is_empty() {
    return out;
  }
  if let Some(stripped) = rest.strip_prefix("type") {
    if stripped.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '*') {
      out.type_only = true;
      rest = stripped.trim_start();
    }
  }

  for piece in split_clause_pieces(rest) {
    let piece = piece.trim();
    if piece.is_empty() {
      continue;
    }
    if let Some(ns) = piece.strip_prefix('*') {
      let ns = ns.trim().strip_prefix("as").map(str::trim).unwrap_or_default();
      if !ns.is_empty() {
        out.namespace = Some(ns.to_string());
      }
    } else if piece.starts_with('{') {
      let inner = piece.trim_start_matches('{').trim_end_matches('}');
      for entry in inner.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
          continue;
        }
        let mut split = entry.splitn(2, " as ");
        let imported = split.next().unwrap_or_default().trim().to_string();
        let local = split.next().map_or_else(|| imported.clone(), |l| l.trim().to_string());
        out.named.push(NamedBinding { imported, local });
      }
    } else {
      out.default = Some(piece.to_string());
    }
  }
  out
}

/// Splits `d, {a, b}, * as ns` at top-level commas only.
fn split_clause_pieces(clause: &str) -> Vec<&str> {
  let mut pieces = Vec::new();
  let mut depth = 0usize;
  let mut start = 0usize;
  for (i, ch) in clause.char_indices() {
    match ch {
      '{' => depth += 1,
      '}' => depth = depth.saturating_sub(1),
      ',' if depth == 0 => {
        pieces.push(&clause[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  pieces.push(&clause[start..]);
  pieces
}

/// Finds every import statement. `masked` and `text` must be the same length.
pub fn find_imports(text: &str, masked: &str) -> Vec<ImportStatement> {
  IMPORT_RE
    .captures_iter(masked)
    .filter_map(|caps| {
      let whole = caps.get(0)?;
      let module_span = caps.name("module")?;
      let clause_span = caps.name("clause")?;
      let clause_text = &text[clause_span.start()..clause_span.end()];
      // `import(...)` expressions and `import.meta` have no from-clause
      // shape; the regex requires a quoted module so they cannot match, but
      // a clause containing `(` means a dynamic import on one line.
      if clause_text.contains('(') {
        return None;
      }
      Some(ImportStatement {
        span: Span::new(whole.start(), whole.end()),
        line: text[..whole.start()].matches('\n').count() + 1,
        module: text[module_span.start()..module_span.end()].to_string(),
        clause: parse_clause(clause_text),
      })
    })
    .collect()
}

/// Local binding names under which the designated tag is reachable in this
/// file, via direct or renamed named imports of `tag_name` from `tag_module`.
pub fn tag_bindings(imports: &[ImportStatement], tag_module: &str, tag_name: &str) -> Vec<String> {
  imports
    .iter()
    .filter(|import| import.module == tag_module && !import.clause.type_only)
    .filter_map(|import| import.local_for(tag_name))
    .map(String::from)
    .collect()
}
