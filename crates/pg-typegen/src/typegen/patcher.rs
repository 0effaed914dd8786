//! In-place source rewriting: type-parameter spans, declaration blocks and
//! namespace imports, applied as ordered non-overlapping byte replacements.
//!
//! The patcher only ever touches spans it was handed plus blocks bearing the
//! generated marker; everything else in the file is preserved byte for byte,
//! which is what makes reruns idempotent.

use std::sync::LazyLock;

use regex::Regex;

use crate::typegen::{declarations::MARKER_COMMENT, model::Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
  pub span: Span,
  pub replacement: String,
}

impl Patch {
  pub fn new(span: Span, replacement: impl Into<String>) -> Self {
    Self { span, replacement: replacement.into() }
  }
}

/// Applies replacements in span order. Spans must not overlap; they are in
/// coordinates of the original text.
pub fn apply_patches(source: &str, mut patches: Vec<Patch>) -> String {
  patches.sort_by_key(|p| p.span);
  let mut out = String::with_capacity(source.len());
  let mut cursor = 0;
  for patch in patches {
    debug_assert!(patch.span.start >= cursor, "overlapping patches");
    out.push_str(&source[cursor..patch.span.start]);
    out.push_str(&patch.replacement);
    cursor = patch.span.end;
  }
  out.push_str(&source[cursor..]);
  out
}

/// The patch for one tag's type parameter. `type_name` of None clears any
/// existing annotation (the query became untypeable). Returns None when the
/// file already carries the right text.
pub fn annotation_patch(
  source: &str,
  annotation_span: Span,
  namespace: &str,
  type_name: Option<&str>,
) -> Option<Patch> {
  let desired = match type_name {
    Some(name) => format!("<{namespace}.{name}>"),
    None => String::new(),
  };
  if &source[annotation_span.start..annotation_span.end] == desired {
    return None;
  }
  Some(Patch::new(annotation_span, desired))
}

/// Prepends `import * as <ns> from '<specifier>'` as the first line of the file.
pub fn import_patch(namespace: &str, specifier: &str) -> Patch {
  Patch::new(Span::new(0, 0), format!("import * as {namespace} from '{specifier}'\n"))
}

static NAMESPACE_OPEN_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"export\s+declare\s+namespace\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*\{").unwrap());

/// Finds machine-owned declaration blocks: `export declare namespace <ns>`
/// whose first content line is the marker comment. Matching runs over the
/// masked text so strings and comments cannot fake a block; the marker is
/// checked in the original text since masking blanks comments out.
///
/// Spans cover `export` through the closing brace. Hand-written blocks that
/// merely share the namespace name are not returned.
pub fn find_marked_blocks(source: &str, masked: &str, namespace: &str) -> Vec<Span> {
  debug_assert_eq!(source.len(), masked.len());
  let mut blocks = Vec::new();
  for captures in NAMESPACE_OPEN_RE.captures_iter(masked) {
    if &captures[1] != namespace {
      continue;
    }
    let whole = captures.get(0).unwrap();
    let open = whole.end() - 1;
    let Some(close) = matching_brace(masked, open) else { continue };
    let body = &source[open + 1..close];
    if body.lines().map(str::trim).find(|l| !l.is_empty()) == Some(MARKER_COMMENT) {
      blocks.push(Span::new(whole.start(), close + 1));
    }
  }
  blocks
}

/// Widens a block span to swallow the blank lines around it, for clean
/// removal. The replacement keeps one separator unless the block sat at EOF.
pub fn removal_patch(source: &str, block: Span) -> Patch {
  let bytes = source.as_bytes();
  let mut start = block.start;
  while start > 0 && bytes[start - 1].is_ascii_whitespace() {
    start -= 1;
  }
  let mut end = block.end;
  while end < bytes.len() && bytes[end].is_ascii_whitespace() {
    end += 1;
  }
  let replacement = if end == bytes.len() {
    if start == 0 { "" } else { "\n" }
  } else {
    "\n\n"
  };
  Patch::new(Span::new(start, end), replacement)
}

/// Appends a declaration block after the last code in the file, separated by
/// one blank line and ending with a newline.
pub fn append_block(source: &str, rendered_block: &str) -> String {
  let trimmed = source.trim_end();
  if trimmed.is_empty() {
    format!("{rendered_block}\n")
  } else {
    format!("{trimmed}\n\n{rendered_block}\n")
  }
}

fn matching_brace(masked: &str, open: usize) -> Option<usize> {
  let bytes = masked.as_bytes();
  let mut depth = 0usize;
  for (i, &b) in bytes.iter().enumerate().skip(open) {
    match b {
      b'{' => depth += 1,
      b'}' => {
        depth -= 1;
        if depth == 0 {
          return Some(i);
        }
      }
      _ => {}
    }
  }
  None
}
