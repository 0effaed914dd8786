use std::{collections::BTreeSet, sync::LazyLock};

use inflections::Inflect;
use regex::Regex;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());
static INVALID_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").unwrap());
static MULTI_UNDERSCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// True when `label` can appear unquoted both as a declaration field and as
/// part of a generated type name. Oracle pseudo-labels like `?column?` fail.
pub fn is_identifier(label: &str) -> bool {
  IDENTIFIER_RE.is_match(label)
}

/// Strips everything that cannot appear in a declaration identifier and
/// collapses the leftovers: `?column?` -> `column`.
pub fn sanitize(input: &str) -> String {
  let replaced = INVALID_CHARS_RE.replace_all(input, "_");
  let collapsed = MULTI_UNDERSCORE_RE.replace_all(&replaced, "_");
  collapsed.trim_matches('_').to_string()
}

/// Type-name part derived from a table name: `test_table` -> `TestTable`.
pub fn table_part(table: &str) -> String {
  let base = sanitize(table);
  if base.is_empty() { "Table".to_string() } else { base.to_pascal_case() }
}

/// Type-name part derived from an output label: `t_aliased1` -> `tAliased1`.
pub fn label_part(label: &str) -> String {
  let base = sanitize(label);
  if base.is_empty() { "column".to_string() } else { base.to_camel_case() }
}

/// Uppercases the first character, leaving the rest alone: `a_b` -> `A_b`.
pub fn capitalize(name: &str) -> String {
  let mut chars = name.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    None => String::new(),
  }
}

/// Ensures a candidate name is unused, appending a numeric suffix when a
/// different shape already claimed it. First appearance keeps the bare name.
pub fn ensure_unique(base_name: &str, used_names: &BTreeSet<String>) -> String {
  if !used_names.contains(base_name) {
    return base_name.to_string();
  }
  let mut i = 2;
  loop {
    let candidate = format!("{base_name}{i}");
    if !used_names.contains(&candidate) {
      return candidate;
    }
    i += 1;
  }
}

/// Short content hash for statements with no usable labels.
pub fn anonymous_name(content: &str) -> String {
  let hash = blake3::hash(content.as_bytes());
  let hex = hash.to_hex();
  format!("Anonymous{}", &hex.as_str()[..6])
}
