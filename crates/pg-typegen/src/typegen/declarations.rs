//! Renders declaration blocks: the `export declare namespace` appended to a
//! source file, or the standalone module written next to it.

use itertools::Itertools;

use crate::typegen::{
  model::{ColumnDescriptor, DeclarationBlock, FieldDescriptor, GeneratedType, TypeShape},
  naming, report,
};

/// First line inside every generated block or file. Its presence is the only
/// thing that marks a block as machine-owned and safe to replace.
pub const MARKER_COMMENT: &str = "// Generated by pg-typegen";

/// Queries longer than this are truncated in documentation.
const MAX_QUERY_DOC_LEN: usize = 100;

/// The inline form, appended to the scanned source file.
pub fn render_namespace_block(block: &DeclarationBlock, namespace: &str) -> String {
  let mut out = String::new();
  out.push_str(&format!("export declare namespace {namespace} {{\n"));
  out.push_str(&format!("  {MARKER_COMMENT}\n"));
  for generated in &block.types {
    out.push('\n');
    render_type(&mut out, generated, 1);
  }
  out.push('}');
  out
}

/// The standalone form, written as its own module file.
pub fn render_module(block: &DeclarationBlock) -> String {
  let mut out = String::new();
  out.push_str(MARKER_COMMENT);
  out.push('\n');
  for generated in &block.types {
    out.push('\n');
    render_type(&mut out, generated, 0);
  }
  out
}

fn render_type(out: &mut String, generated: &GeneratedType, depth: usize) {
  let pad = "  ".repeat(depth);
  render_query_docs(out, generated, &pad);

  match &generated.shape {
    TypeShape::Void => out.push_str(&format!("{pad}export type {} = void\n", generated.name)),
    TypeShape::Fields(fields) if fields.is_empty() => {
      out.push_str(&format!("{pad}export interface {} {{}}\n", generated.name));
    }
    TypeShape::Fields(fields) => {
      out.push_str(&format!("{pad}export interface {} {{\n", generated.name));
      for (i, field) in fields.iter().enumerate() {
        if i > 0 {
          out.push('\n');
        }
        render_field(out, field, depth + 1);
      }
      out.push_str(&format!("{pad}}}\n"));
    }
    TypeShape::Unresolved => {}
  }
}

/// `/** - query: `…` */` for a single query; a sorted bullet list otherwise.
fn render_query_docs(out: &mut String, generated: &GeneratedType, pad: &str) {
  let queries: Vec<String> = generated
    .queries
    .iter()
    .map(|q| report::truncate_query(q, MAX_QUERY_DOC_LEN))
    .collect();
  match queries.as_slice() {
    [] => {}
    [query] => out.push_str(&format!("{pad}/** - query: `{query}` */\n")),
    many => {
      out.push_str(&format!("{pad}/**\n{pad} * queries:\n"));
      for query in many {
        out.push_str(&format!("{pad} * - `{query}`\n"));
      }
      out.push_str(&format!("{pad} */\n"));
    }
  }
}

fn render_field(out: &mut String, field: &FieldDescriptor, depth: usize) {
  let pad = "  ".repeat(depth);
  let doc_lines = field_doc_lines(field);
  match doc_lines.as_slice() {
    [] => {}
    [line] => out.push_str(&format!("{pad}/** {line} */\n")),
    many => {
      out.push_str(&format!("{pad}/**\n"));
      for line in many {
        if line.is_empty() {
          out.push_str(&format!("{pad} *\n"));
        } else {
          out.push_str(&format!("{pad} * {line}\n"));
        }
      }
      out.push_str(&format!("{pad} */\n"));
    }
  }
  out.push_str(&format!("{pad}{}: {}\n", field_label(&field.label), field.rendered_type()));
}

fn field_label(label: &str) -> String {
  if naming::is_identifier(label) {
    label.to_string()
  } else {
    format!("'{}'", label.replace('\'', "\\'"))
  }
}

/// Doc lines with empty strings marking paragraph breaks.
fn field_doc_lines(field: &FieldDescriptor) -> Vec<String> {
  match field.candidates.as_slice() {
    [candidate] => {
      let info = info_line(candidate);
      match &candidate.comment {
        None => vec![info],
        Some(comment) => {
          let mut lines: Vec<String> = comment.lines().map(sanitize_doc_line).collect();
          lines.push(String::new());
          lines.push(info);
          lines
        }
      }
    }
    candidates => {
      let mut lines =
        vec![format!("Warning: {} columns detected for field {}!", candidates.len(), field.label)];
      for candidate in candidates {
        lines.push(String::new());
        lines.push(info_line(candidate));
      }
      lines
    }
  }
}

/// `column: `schema.table.col`, not null: `true`, regtype: `integer``, with
/// absent pieces omitted.
fn info_line(column: &ColumnDescriptor) -> String {
  let mut pieces = Vec::new();
  if let Some(attribution) = &column.attribution {
    pieces.push(format!("column: `{}.{}`", attribution.table, attribution.column));
  }
  if column.not_null {
    pieces.push("not null: `true`".to_string());
  }
  pieces.push(format!("regtype: `{}`", column.regtype));
  pieces.iter().join(", ")
}

/// Comments come straight from the database; keep them from breaking out of
/// the doc comment.
fn sanitize_doc_line(line: &str) -> String {
  line.replace("*/", "*\\/")
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use super::*;
  use crate::typegen::model::ColumnRef;

  fn column(label: &str, regtype: &str, ts_type: &str, not_null: bool) -> ColumnDescriptor {
    ColumnDescriptor {
      label: label.to_string(),
      regtype: regtype.to_string(),
      ts_type: ts_type.to_string(),
      not_null,
      attribution: None,
      comment: None,
    }
  }

  fn generated(name: &str, shape: TypeShape, queries: &[&str]) -> GeneratedType {
    GeneratedType {
      name: name.to_string(),
      shape,
      queries: queries.iter().map(|q| q.to_string()).collect::<BTreeSet<_>>(),
      warnings: Vec::new(),
    }
  }

  #[test]
  fn renders_an_attributed_interface() {
    let mut id = column("id", "integer", "number", true);
    id.attribution = Some(ColumnRef { table: "options_test.test_table".into(), column: "id".into() });
    let n = column("n", "integer", "number", false);
    let block = DeclarationBlock {
      types: vec![generated(
        "TestTable",
        TypeShape::Fields(vec![FieldDescriptor::single(id), FieldDescriptor::single(n)]),
        &["select * from test_table"],
      )],
    };

    let expected = "\
export declare namespace queries {
  // Generated by pg-typegen

  /** - query: `select * from test_table` */
  export interface TestTable {
    /** column: `options_test.test_table.id`, not null: `true`, regtype: `integer` */
    id: number

    /** regtype: `integer` */
    n: number | null
  }
}";
    assert_eq!(render_namespace_block(&block, "queries"), expected);
  }

  #[test]
  fn multi_query_docs_list_sorted_queries() {
    let block = DeclarationBlock {
      types: vec![generated(
        "_void",
        TypeShape::Void,
        &["update test_table set n = 0", "create table x (y int)"],
      )],
    };

    let expected = "\
export declare namespace queries {
  // Generated by pg-typegen

  /**
   * queries:
   * - `create table x (y int)`
   * - `update test_table set n = 0`
   */
  export type _void = void
}";
    assert_eq!(render_namespace_block(&block, "queries"), expected);
  }

  #[test]
  fn custom_comments_become_a_leading_paragraph() {
    let mut t = column("t", "text", "string", false);
    t.attribution = Some(ColumnRef { table: "options_test.test_table".into(), column: "t".into() });
    t.comment = Some("Some custom comment on \"t\"".to_string());
    let block = DeclarationBlock {
      types: vec![generated(
        "TestTable_t",
        TypeShape::Fields(vec![FieldDescriptor::single(t)]),
        &["select t from test_table"],
      )],
    };

    let expected = "\
export declare namespace queries {
  // Generated by pg-typegen

  /** - query: `select t from test_table` */
  export interface TestTable_t {
    /**
     * Some custom comment on \"t\"
     *
     * column: `options_test.test_table.t`, regtype: `text`
     */
    t: string | null
  }
}";
    assert_eq!(render_namespace_block(&block, "queries"), expected);
  }

  #[test]
  fn duplicate_labels_document_each_candidate() {
    let field = FieldDescriptor {
      label: "a".to_string(),
      candidates: vec![column("a", "integer", "number", false), column("a", "text", "string", false)],
    };
    let block = DeclarationBlock {
      types: vec![generated("A_a", TypeShape::Fields(vec![field]), &["select 1 as a, 'two' as a"])],
    };

    let expected = "\
export declare namespace queries {
  // Generated by pg-typegen

  /** - query: `select 1 as a, 'two' as a` */
  export interface A_a {
    /**
     * Warning: 2 columns detected for field a!
     *
     * regtype: `integer`
     *
     * regtype: `text`
     */
    a: (number | null) | (string | null)
  }
}";
    assert_eq!(render_namespace_block(&block, "queries"), expected);
  }

  #[test]
  fn non_identifier_labels_are_quoted() {
    let block = DeclarationBlock {
      types: vec![generated(
        "Column",
        TypeShape::Fields(vec![FieldDescriptor::single(column("?column?", "text", "string", false))]),
        &["select jb->'foo'->>'bar' from test_table"],
      )],
    };
    let rendered = render_namespace_block(&block, "queries");
    assert!(rendered.contains("'?column?': string | null"));
  }

  #[test]
  fn standalone_module_has_no_namespace_wrapper() {
    let block = DeclarationBlock {
      types: vec![generated(
        "A",
        TypeShape::Fields(vec![FieldDescriptor::single(column("a", "integer", "number", false))]),
        &["select 1 as a"],
      )],
    };

    let expected = "\
// Generated by pg-typegen

/** - query: `select 1 as a` */
export interface A {
  /** regtype: `integer` */
  a: number | null
}
";
    assert_eq!(render_module(&block), expected);
  }

  #[test]
  fn empty_interfaces_render_inline_braces() {
    let block = DeclarationBlock {
      types: vec![generated("Anonymous123abc", TypeShape::Fields(Vec::new()), &["create function foo()"])],
    };
    let rendered = render_namespace_block(&block, "queries");
    assert!(rendered.contains("export interface Anonymous123abc {}"));
  }
}
