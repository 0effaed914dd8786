use std::{fmt, path::PathBuf};

/// Severity of a run finding. Nothing here aborts a run; fatal conditions
/// are errors returned by the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
  Debug,
  Warn,
  Error,
}

/// One finding, keyed by file and line so it is actionable as-is.
#[derive(Debug, Clone)]
pub struct Diagnostic {
  pub level: Level,
  pub file: PathBuf,
  /// 1-indexed; 0 when the finding applies to the whole file.
  pub line: usize,
  pub message: String,
}

impl Diagnostic {
  pub fn new(level: Level, file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
    Self { level, file: file.into(), line, message: message.into() }
  }

  pub fn warn(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
    Self::new(Level::Warn, file, line, message)
  }

  pub fn debug(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
    Self::new(Level::Debug, file, line, message)
  }

  pub fn error(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
    Self::new(Level::Error, file, line, message)
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.line > 0 {
      write!(f, "{}:{} {}", self.file.display(), self.line, self.message)
    } else {
      write!(f, "{} {}", self.file.display(), self.message)
    }
  }
}

/// Aggregate outcome of a generate run.
#[derive(Debug, Default)]
pub struct RunStats {
  pub files_scanned: usize,
  pub files_changed: usize,
  pub files_skipped: usize,
  pub queries_typed: usize,
  pub queries_untypeable: usize,
  pub diagnostics: Vec<Diagnostic>,
}

impl RunStats {
  pub fn merge(&mut self, other: RunStats) {
    self.files_scanned += other.files_scanned;
    self.files_changed += other.files_changed;
    self.files_skipped += other.files_skipped;
    self.queries_typed += other.queries_typed;
    self.queries_untypeable += other.queries_untypeable;
    self.diagnostics.extend(other.diagnostics);
  }

  pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
    self.diagnostics.iter().filter(|d| d.level >= Level::Warn)
  }
}

/// Shortens a query for human-facing messages and documentation. Long bodies
/// keep their head and tail around a truncation marker.
pub fn truncate_query(query: &str, max: usize) -> String {
  if query.chars().count() <= max {
    return query.to_string();
  }
  let head: String = query.chars().take(40).collect();
  let tail_len = query.chars().count();
  let tail: String = query.chars().skip(tail_len - 40).collect();
  format!("{head}... [truncated] ...{tail}")
}
