//! Query Normalizer: interpolations become positional placeholders, the body
//! is collapsed to a single line for the oracle, and multi-statement bodies
//! are short-circuited before they ever reach it.

use std::collections::HashMap;

use crate::typegen::model::{NormalizedQuery, QueryUsage};

/// Replaces each interpolation hole with `$n`. Numbering is 1-indexed in
/// first-appearance order of the interpolation's expression text, so a
/// textually repeated expression reuses its number while distinct
/// expressions always get fresh ones.
pub fn normalize(usage: &QueryUsage) -> NormalizedQuery {
  let mut numbered: HashMap<&str, usize> = HashMap::new();
  let mut raw = String::new();

  for (i, part) in usage.parts.iter().enumerate() {
    raw.push_str(part);
    if let Some(hole) = usage.holes.get(i) {
      let next = numbered.len() + 1;
      let n = *numbered.entry(hole.as_str()).or_insert(next);
      raw.push_str(&format!("${n}"));
    }
  }

  // Statement counting must happen before whitespace collapsing: collapsing
  // folds line comments over whatever follows them, which is exactly the
  // breakage the oracle reports on its own.
  let statements = count_statements(&raw);
  NormalizedQuery { text: collapse_whitespace(&raw), statements }
}

pub fn collapse_whitespace(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Counts statements separated by top-level `;`, ignoring separators inside
/// single/double quotes, dollar-quoted strings, and comments.
fn count_statements(sql: &str) -> usize {
  let mut count = 0usize;
  let mut current_nonempty = false;
  let bytes = sql.as_bytes();
  let mut i = 0usize;

  while i < bytes.len() {
    match bytes[i] {
      b';' => {
        if current_nonempty {
          count += 1;
          current_nonempty = false;
        }
        i += 1;
      }
      b'-' if bytes.get(i + 1) == Some(&b'-') => {
        while i < bytes.len() && bytes[i] != b'\n' {
          i += 1;
        }
      }
      b'/' if bytes.get(i + 1) == Some(&b'*') => {
        let mut depth = 1usize;
        i += 2;
        while i < bytes.len() && depth > 0 {
          if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
          } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
          } else {
            i += 1;
          }
        }
      }
      b'\'' | b'"' => {
        let quote = bytes[i];
        current_nonempty = true;
        i += 1;
        while i < bytes.len() {
          if bytes[i] == quote {
            // `''` escapes a quote inside the literal.
            if quote == b'\'' && bytes.get(i + 1) == Some(&b'\'') {
              i += 2;
              continue;
            }
            i += 1;
            break;
          }
          i += 1;
        }
      }
      b'$' => {
        if let Some(tag_end) = dollar_quote_tag(bytes, i) {
          current_nonempty = true;
          let tag = &sql[i..tag_end];
          let body_end = sql[tag_end..].find(tag).map(|p| tag_end + p + tag.len());
          i = body_end.unwrap_or(bytes.len());
        } else {
          current_nonempty = true;
          i += 1;
        }
      }
      b if b.is_ascii_whitespace() => i += 1,
      _ => {
        current_nonempty = true;
        i += 1;
      }
    }
  }

  count + usize::from(current_nonempty)
}

/// Recognizes a dollar-quote opener (`$$` or `$tag$`) at `start`, returning
/// the offset just past it. Positional placeholders (`$1`) do not qualify.
fn dollar_quote_tag(bytes: &[u8], start: usize) -> Option<usize> {
  let mut i = start + 1;
  while i < bytes.len() {
    match bytes[i] {
      b'$' => return Some(i + 1),
      b if b.is_ascii_alphanumeric() || b == b'_' => {
        if i == start + 1 && b.is_ascii_digit() {
          return None;
        }
        i += 1;
      }
      _ => return None,
    }
  }
  None
}
