//! Surface lexer for TypeScript sources.
//!
//! Produces a masked copy of the input in which comments, string contents
//! and template-literal text are blanked out (newlines and delimiters kept,
//! byte offsets preserved). Downstream passes can then search for imports,
//! tag usages and namespace blocks with plain regexes without tripping over
//! lookalike syntax inside strings or comments.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexError {
  #[error("unterminated template literal starting at line {line}")]
  UnterminatedTemplate { line: usize },
  #[error("unterminated block comment starting at line {line}")]
  UnterminatedComment { line: usize },
  #[error("unbalanced braces in template interpolation at line {line}")]
  UnbalancedInterpolation { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
  /// Top-level code.
  Code,
  /// Inside `${ ... }` of a template; tracks brace depth.
  Interp(usize),
  /// Inside a template literal's text.
  Template,
}

fn line_at(text: &str, offset: usize) -> usize {
  text[..offset].matches('\n').count() + 1
}

/// Pushes `ch` to `out` as spaces of the same byte width, keeping newlines.
fn mask_char(out: &mut Vec<u8>, ch: char) {
  if ch == '\n' {
    out.push(b'\n');
  } else {
    out.extend(std::iter::repeat_n(b' ', ch.len_utf8()));
  }
}

fn push_char(out: &mut Vec<u8>, ch: char) {
  let mut buf = [0u8; 4];
  out.extend(ch.encode_utf8(&mut buf).as_bytes());
}

/// True when a `/` at this point starts a regex literal rather than a
/// division. Heuristic on the previous significant character; misjudging is
/// harmless for scanning because queries never hide inside regex bodies.
fn slash_starts_regex(masked_so_far: &[u8]) -> bool {
  for &b in masked_so_far.iter().rev() {
    if b == b' ' || b == b'\n' || b == b'\t' {
      continue;
    }
    return !(b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b')' || b == b']' || b == b'\'' || b == b'"' || b == b'`');
  }
  true
}

/// Masks one source file. Returns a same-length string in which only code
/// remains significant.
pub fn mask_source(text: &str) -> Result<String, LexError> {
  let mut out: Vec<u8> = Vec::with_capacity(text.len());
  let mut frames = vec![Frame::Code];
  let mut chars = text.char_indices().peekable();

  while let Some((offset, ch)) = chars.next() {
    let frame = *frames.last().unwrap_or(&Frame::Code);

    match frame {
      Frame::Template => match ch {
        '\\' => {
          mask_char(&mut out, ch);
          if let Some((_, esc)) = chars.next() {
            mask_char(&mut out, esc);
          }
        }
        '`' => {
          push_char(&mut out, ch);
          frames.pop();
        }
        '$' if chars.peek().is_some_and(|&(_, c)| c == '{') => {
          push_char(&mut out, '$');
          chars.next();
          push_char(&mut out, '{');
          frames.push(Frame::Interp(1));
        }
        other => mask_char(&mut out, other),
      },

      Frame::Code | Frame::Interp(_) => match ch {
        '/' if chars.peek().is_some_and(|&(_, c)| c == '/') => {
          mask_char(&mut out, '/');
          for (_, c) in chars.by_ref() {
            mask_char(&mut out, c);
            if c == '\n' {
              break;
            }
          }
        }
        '/' if chars.peek().is_some_and(|&(_, c)| c == '*') => {
          let start = offset;
          mask_char(&mut out, '/');
          let mut closed = false;
          while let Some((_, c)) = chars.next() {
            mask_char(&mut out, c);
            if c == '*' && chars.peek().is_some_and(|&(_, n)| n == '/') {
              let (_, slash) = chars.next().unwrap_or((0, '/'));
              mask_char(&mut out, slash);
              closed = true;
              break;
            }
          }
          if !closed {
            return Err(LexError::UnterminatedComment { line: line_at(text, start) });
          }
        }
        '/' if slash_starts_regex(&out) => {
          push_char(&mut out, '/');
          let mut in_class = false;
          while let Some(&(_, c)) = chars.peek() {
            if c == '\n' {
              break;
            }
            chars.next();
            match c {
              '\\' => {
                mask_char(&mut out, c);
                if let Some((_, esc)) = chars.next() {
                  mask_char(&mut out, esc);
                }
              }
              '[' => {
                in_class = true;
                mask_char(&mut out, c);
              }
              ']' => {
                in_class = false;
                mask_char(&mut out, c);
              }
              '/' if !in_class => {
                push_char(&mut out, '/');
                break;
              }
              other => mask_char(&mut out, other),
            }
          }
        }
        quote @ ('\'' | '"') => {
          push_char(&mut out, quote);
          while let Some(&(_, c)) = chars.peek() {
            if c == '\n' {
              break;
            }
            chars.next();
            if c == '\\' {
              mask_char(&mut out, c);
              if let Some((_, esc)) = chars.next() {
                mask_char(&mut out, esc);
              }
            } else if c == quote {
              push_char(&mut out, c);
              break;
            } else {
              mask_char(&mut out, c);
            }
          }
        }
        '`' => {
          push_char(&mut out, '`');
          frames.push(Frame::Template);
        }
        '{' => {
          push_char(&mut out, '{');
          if let Some(Frame::Interp(depth)) = frames.last_mut() {
            *depth += 1;
          }
        }
        '}' => {
          push_char(&mut out, '}');
          if let Some(Frame::Interp(depth)) = frames.last_mut() {
            *depth -= 1;
            if *depth == 0 {
              frames.pop();
              if frames.last() != Some(&Frame::Template) {
                return Err(LexError::UnbalancedInterpolation { line: line_at(text, offset) });
              }
            }
          }
        }
        other => push_char(&mut out, other),
      },
    }
  }

  if frames.len() > 1 {
    return Err(LexError::UnterminatedTemplate { line: line_at(text, text.len().saturating_sub(1)) });
  }

  // Masking only ever replaces bytes with spaces, so the output stays UTF-8.
  Ok(String::from_utf8(out).unwrap_or_default())
}
