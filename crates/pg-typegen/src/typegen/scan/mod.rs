//! Query Scanner: finds tagged SQL literals whose tag traces back to the
//! designated import binding, and extracts template text plus interpolation
//! positions for the normalizer.

pub mod imports;
pub mod lexer;

use std::path::Path;

use regex::Regex;
use thiserror::Error;

pub use imports::{ImportStatement, find_imports, tag_bindings};
pub use lexer::{LexError, mask_source};

use crate::typegen::model::{QueryUsage, Span, TagForm};

#[derive(Debug, Error)]
pub enum ScanError {
  #[error(transparent)]
  Lex(#[from] LexError),
  #[error("unterminated template literal at line {line}")]
  UnterminatedTemplate { line: usize },
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
  pub tag_module: String,
  pub tag_name: String,
}

/// Everything the rest of the pipeline needs to know about one file's text.
#[derive(Debug)]
pub struct ScanOutput {
  /// Same length as the source; comments and literal text blanked.
  pub masked: String,
  pub imports: Vec<ImportStatement>,
  pub usages: Vec<QueryUsage>,
}

/// Scans one file. Fails only when the file cannot be lexed; a file without
/// tag imports simply yields no usages.
pub fn scan_source(path: &Path, text: &str, config: &ScanConfig) -> Result<ScanOutput, ScanError> {
  let masked = mask_source(text)?;
  let imports = find_imports(text, &masked);
  let bindings = tag_bindings(&imports, &config.tag_module, &config.tag_name);

  let mut usages = Vec::new();
  if !bindings.is_empty() {
    let pattern = format!(
      r"\b(?P<tag>{})\b(?:\s*\.\s*(?P<member>[A-Za-z_$][A-Za-z0-9_$]*))?(?:(?P<ann><[^<>`]*>))?\s*`",
      bindings.iter().map(|b| regex::escape(b)).collect::<Vec<_>>().join("|"),
    );
    // Bindings are identifiers, so the pattern is always valid.
    let re = Regex::new(&pattern).unwrap_or_else(|_| unreachable!());

    for caps in re.captures_iter(&masked) {
      let whole = caps.get(0).unwrap_or_else(|| unreachable!());
      let tag = caps.name("tag").unwrap_or_else(|| unreachable!());

      // `\b` does not reject property access or `$`-prefixed lookalikes.
      if tag.start() > 0 {
        let prev = text.as_bytes()[tag.start() - 1];
        if prev == b'.' || prev == b'$' {
          continue;
        }
      }

      let form = caps
        .name("member")
        .map_or(TagForm::Plain, |m| TagForm::Member(text[m.start()..m.end()].to_string()));
      let annotation_span = match caps.name("ann") {
        Some(ann) => Span::new(ann.start(), ann.end()),
        None => {
          let tag_end = caps.name("member").map_or(tag.end(), |m| m.end());
          Span::new(tag_end, tag_end)
        }
      };

      let backtick = whole.end() - 1;
      let (parts, holes, _end) = parse_template(text, &masked, backtick).map_err(|line| {
        ScanError::UnterminatedTemplate { line }
      })?;

      usages.push(QueryUsage {
        file: path.to_path_buf(),
        line: text[..tag.start()].matches('\n').count() + 1,
        form,
        annotation_span,
        parts,
        holes,
      });
    }
  }

  Ok(ScanOutput { masked, imports, usages })
}

/// Parses a template literal starting at the opening backtick. Returns the
/// cooked text parts, the interpolation expression texts and the offset just
/// past the closing backtick. The masked text drives brace matching inside
/// interpolations so string contents cannot confuse it.
fn parse_template(text: &str, masked: &str, backtick: usize) -> Result<(Vec<String>, Vec<String>, usize), usize> {
  let line = || text[..backtick].matches('\n').count() + 1;
  let bytes = text.as_bytes();
  let masked_bytes = masked.as_bytes();
  let mut parts = Vec::new();
  let mut holes = Vec::new();
  let mut part = String::new();
  let mut i = backtick + 1;

  while i < bytes.len() {
    match bytes[i] {
      b'\\' => {
        if i + 1 >= bytes.len() {
          return Err(line());
        }
        part.push(cooked_escape(bytes[i + 1] as char));
        i += 2;
      }
      b'`' => {
        parts.push(std::mem::take(&mut part));
        return Ok((parts, holes, i + 1));
      }
      b'$' if i + 1 < bytes.len() && bytes[i + 1] == b'{' => {
        parts.push(std::mem::take(&mut part));
        let hole_start = i + 2;
        let mut depth = 1usize;
        let mut j = hole_start;
        while j < masked_bytes.len() && depth > 0 {
          match masked_bytes[j] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
          }
          j += 1;
        }
        if depth > 0 {
          return Err(line());
        }
        holes.push(text[hole_start..j - 1].trim().to_string());
        i = j;
      }
      _ => {
        let ch_len = utf8_len(bytes[i]);
        part.push_str(&text[i..i + ch_len]);
        i += ch_len;
      }
    }
  }
  Err(line())
}

fn cooked_escape(ch: char) -> char {
  match ch {
    'n' => '\n',
    't' => '\t',
    'r' => '\r',
    other => other,
  }
}

const fn utf8_len(first: u8) -> usize {
  match first {
    b if b >= 0xF0 => 4,
    b if b >= 0xE0 => 3,
    b if b >= 0xC0 => 2,
    _ => 1,
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  fn scan(src: &str) -> ScanOutput {
    let config = ScanConfig { tag_module: "slonik".into(), tag_name: "sql".into() };
    scan_source(&PathBuf::from("index.ts"), src, &config).unwrap()
  }

  #[test]
  fn finds_plain_tag_usages() {
    let out = scan("import {sql} from 'slonik'\n\nexport default sql`select 1 as a`\n");
    assert_eq!(out.usages.len(), 1);
    assert_eq!(out.usages[0].parts, ["select 1 as a"]);
    assert!(out.usages[0].holes.is_empty());
    assert_eq!(out.usages[0].line, 3);
    assert_eq!(out.usages[0].form, TagForm::Plain);
  }

  #[test]
  fn renamed_imports_are_traced() {
    let out = scan("import {sql as db} from 'slonik'\n\nexport default db`select 1`\n");
    assert_eq!(out.usages.len(), 1);
  }

  #[test]
  fn member_access_tags_are_found() {
    let out = scan("import {sql} from 'slonik'\n\nexport const q = sql.Foo`select 1 as a`\n");
    assert_eq!(out.usages[0].form, TagForm::Member("Foo".into()));
  }

  #[test]
  fn lookalike_tags_are_ignored() {
    let src = concat!(
      "import {sql} from 'slonik'\n",
      "declare const otherTag: any\n",
      "export const a = otherTag`foo`\n",
      "export const b = otherTag.foo`bar`\n",
      "export const c = sql`select 1`\n",
    );
    let out = scan(src);
    assert_eq!(out.usages.len(), 1);
    assert_eq!(out.usages[0].parts, ["select 1"]);
  }

  #[test]
  fn unrelated_modules_do_not_bind_the_tag() {
    let out = scan("import {sql} from 'sequelize'\n\nexport default sql`select 1`\n");
    assert!(out.usages.is_empty());
  }

  #[test]
  fn property_access_on_other_objects_is_ignored() {
    let out = scan("import {sql} from 'slonik'\nconst q = helpers.sql`select 1`\n");
    assert!(out.usages.is_empty());
  }

  #[test]
  fn existing_annotations_expose_their_span() {
    let src = "import {sql} from 'slonik'\nexport default sql<queries.A>`select 1 as a`\n";
    let out = scan(src);
    let span = out.usages[0].annotation_span;
    assert_eq!(&src[span.start..span.end], "<queries.A>");
  }

  #[test]
  fn holes_capture_expression_text() {
    let src = "import {sql} from 'slonik'\nexport default sql`select id from t where id = ${a} and n = ${b(1, '}')}`\n";
    let out = scan(src);
    assert_eq!(out.usages[0].holes, ["a", "b(1, '}')"]);
    assert_eq!(out.usages[0].parts.len(), 3);
  }

  #[test]
  fn tags_inside_comments_are_skipped() {
    let out = scan("import {sql} from 'slonik'\n// sql`select 1`\nconst x = 1\n");
    assert!(out.usages.is_empty());
  }
}
