use std::{collections::BTreeSet, path::PathBuf};

/// Byte range into a source file's text. Replacements never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
  pub start: usize,
  pub end: usize,
}

impl Span {
  pub const fn new(start: usize, end: usize) -> Self {
    Self { start, end }
  }

  pub const fn len(&self) -> usize {
    self.end - self.start
  }

  pub const fn is_empty(&self) -> bool {
    self.start == self.end
  }
}

/// How the tag was reached at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagForm {
  /// ``sql`...` ``: the binding itself (possibly renamed at import).
  Plain,
  /// ``sql.Foo`...` ``: member access on the binding (legacy style).
  Member(String),
}

/// One tagged SQL literal discovered in a source file.
///
/// Immutable after the scan; everything downstream only reads it.
#[derive(Debug, Clone)]
pub struct QueryUsage {
  pub file: PathBuf,
  /// 1-indexed line of the tag identifier.
  pub line: usize,
  pub form: TagForm,
  /// Range holding the current type annotation (`<queries.X>`), empty when
  /// the usage is bare. Sits between the tag expression and the backtick.
  pub annotation_span: Span,
  /// Template text fragments. Always `holes.len() + 1` entries.
  pub parts: Vec<String>,
  /// Interpolation expression texts, in order of appearance.
  pub holes: Vec<String>,
}

/// Interpolations replaced by positional placeholders, whitespace collapsed.
#[derive(Debug, Clone)]
pub struct NormalizedQuery {
  pub text: String,
  /// Number of nonempty statements found by the top-level split.
  pub statements: usize,
}

impl NormalizedQuery {
  pub fn is_multi_statement(&self) -> bool {
    self.statements > 1
  }
}

/// An output column mapped back to its defining table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
  /// Schema-qualified table, e.g. `options_test.test_table`.
  pub table: String,
  pub column: String,
}

/// One column of a query result, as reported by the oracle and optionally
/// enriched by the catalog. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
  pub label: String,
  /// Raw database type name, e.g. `character varying(1)`.
  pub regtype: String,
  /// Resolved TypeScript-facing type, e.g. `number` or `'aa' | 'bb'`.
  pub ts_type: String,
  pub not_null: bool,
  pub attribution: Option<ColumnRef>,
  pub comment: Option<String>,
}

impl ColumnDescriptor {
  /// The type as written in a declaration field, folding in nullability.
  /// `unknown` and `void` absorb null rather than unioning with it.
  pub fn rendered_type(&self) -> String {
    render_nullable(&self.ts_type, self.not_null)
  }
}

pub fn render_nullable(ts_type: &str, not_null: bool) -> String {
  if not_null || ts_type == "unknown" || ts_type == "void" {
    return ts_type.to_string();
  }
  if ts_type.contains(" | ") {
    format!("({ts_type}) | null")
  } else {
    format!("{ts_type} | null")
  }
}

/// A declaration field. Usually one candidate; duplicate output labels in a
/// single query merge into one field with several candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
  pub label: String,
  pub candidates: Vec<ColumnDescriptor>,
}

impl FieldDescriptor {
  pub fn single(column: ColumnDescriptor) -> Self {
    Self { label: column.label.clone(), candidates: vec![column] }
  }

  /// Union of every candidate's rendered type, each parenthesized when
  /// compound: `(number | null) | (string | null)`.
  pub fn rendered_type(&self) -> String {
    if self.candidates.len() == 1 {
      return self.candidates[0].rendered_type();
    }
    let parts: Vec<String> = self
      .candidates
      .iter()
      .map(|c| {
        let rendered = c.rendered_type();
        if rendered.contains(' ') { format!("({rendered})") } else { rendered }
      })
      .collect();
    parts.join(" | ")
  }
}

/// Shape of one generated type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
  Fields(Vec<FieldDescriptor>),
  /// Statement with no result set (DML without RETURNING, DDL).
  Void,
  /// Oracle failure; the usage stays unannotated.
  Unresolved,
}

/// Structural identity used to deduplicate generated types within one file.
/// Two queries with equal ordered (label, type, nullability) tuples share a
/// single generated type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeKey {
  Void,
  Fields(Vec<(String, String, bool)>),
}

impl ShapeKey {
  pub fn of(shape: &TypeShape) -> Option<Self> {
    match shape {
      TypeShape::Void => Some(Self::Void),
      TypeShape::Fields(fields) => Some(Self::Fields(
        fields
          .iter()
          .map(|f| {
            let not_null = f.candidates.iter().all(|c| c.not_null);
            (f.label.clone(), f.rendered_type(), not_null)
          })
          .collect(),
      )),
      TypeShape::Unresolved => None,
    }
  }
}

/// A deduplicated generated type plus the queries it documents.
#[derive(Debug, Clone)]
pub struct GeneratedType {
  pub name: String,
  pub shape: TypeShape,
  /// Sorted for byte-stable documentation regardless of query order.
  pub queries: BTreeSet<String>,
  pub warnings: Vec<String>,
}

/// All generated types for one file, in first-appearance order of the type.
/// Regenerated wholesale each run; never incrementally patched.
#[derive(Debug, Default)]
pub struct DeclarationBlock {
  pub types: Vec<GeneratedType>,
}

impl DeclarationBlock {
  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn nullable_rendering() {
    let cases = [
      ("number", false, "number | null"),
      ("number", true, "number"),
      ("unknown", false, "unknown"),
      ("void", false, "void"),
      ("'aa' | 'bb'", false, "('aa' | 'bb') | null"),
      ("'aa' | 'bb'", true, "'aa' | 'bb'"),
    ];
    for (ts, not_null, expected) in cases {
      assert_eq!(render_nullable(ts, not_null), expected, "failed for {ts:?}");
    }
  }

  #[test]
  fn duplicate_label_union_parenthesizes_compound_members() {
    let field = FieldDescriptor {
      label: "a".into(),
      candidates: vec![
        ColumnDescriptor {
          label: "a".into(),
          regtype: "integer".into(),
          ts_type: "number".into(),
          not_null: false,
          attribution: None,
          comment: None,
        },
        ColumnDescriptor {
          label: "a".into(),
          regtype: "text".into(),
          ts_type: "string".into(),
          not_null: false,
          attribution: None,
          comment: None,
        },
      ],
    };
    assert_eq!(field.rendered_type(), "(number | null) | (string | null)");
  }

  #[test]
  fn shape_key_equality_ignores_attribution_and_comments() {
    let mk = |comment: Option<&str>| {
      TypeShape::Fields(vec![FieldDescriptor::single(ColumnDescriptor {
        label: "id".into(),
        regtype: "integer".into(),
        ts_type: "number".into(),
        not_null: true,
        attribution: None,
        comment: comment.map(String::from),
      })])
    };
    assert_eq!(ShapeKey::of(&mk(None)), ShapeKey::of(&mk(Some("doc"))));
    assert_eq!(ShapeKey::of(&TypeShape::Unresolved), None);
  }
}
