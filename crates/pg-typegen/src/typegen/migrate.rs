//! One-shot migration away from the legacy `setupTypeGen` codegen layout.
//!
//! The legacy layout wired tags through a runtime helper: a generated
//! `knownTypes` module, a `setupTypeGen({knownTypes, ...})` call producing
//! the `sql` tag and a `poolConfig`, and per-query member tags like
//! ``sql.Foo`…` ``. The migration rewrites sources to plain slonik imports,
//! tombstones the helper call, deletes the generated modules it recognizes,
//! and leaves everything else for the regular generate pass to annotate.

use std::{
  collections::BTreeSet,
  path::{Component, Path, PathBuf},
  sync::LazyLock,
};

use regex::Regex;
use thiserror::Error;
use tokio::fs;

use crate::typegen::{
  model::Span,
  patcher::{Patch, apply_patches},
  report::{Diagnostic, Level},
  scan::{LexError, find_imports, mask_source},
};

pub const CLEAN_TREE_MESSAGE: &str =
  "git status should be clean - stage or commit your changes before re-running.";

/// Replaces the destructuring statement so leftover references fail loudly
/// at the next compile rather than silently at runtime.
const TOMBSTONE: &str = "/* setupTypeGen call removed. There may be remaining references to poolConfig \
                         which should be deleted manually */";

const LEGACY_HEADER: [&str; 3] =
  ["/* eslint-disable */", "// tslint:disable", "// this file is generated by a tool; don't change it manually."];

#[derive(Debug, Error)]
pub enum MigrateError {
  #[error("Failure: {CLEAN_TREE_MESSAGE}: {0}")]
  DirtyTree(String),
  #[error(transparent)]
  Vcs(#[from] crate::typegen::vcs::VcsError),
}

#[derive(Debug, Clone)]
pub struct MigrateOptions {
  /// Module the legacy helper was imported from.
  pub legacy_module: String,
  pub tag_module: String,
  pub tag_name: String,
}

impl Default for MigrateOptions {
  fn default() -> Self {
    Self {
      legacy_module: "@slonik/typegen".to_string(),
      tag_module: "slonik".to_string(),
      tag_name: "sql".to_string(),
    }
  }
}

/// Planned rewrite of one file. `new_source` of None means untouched.
#[derive(Debug, Default)]
pub struct FileMigration {
  pub new_source: Option<String>,
  pub diagnostics: Vec<Diagnostic>,
}

/// Whole-run plan computed over in-memory sources; nothing touches disk
/// until [`apply_plan`].
#[derive(Debug, Default)]
pub struct MigrationPlan {
  pub rewrites: Vec<(PathBuf, FileMigration)>,
  pub deletions: Vec<PathBuf>,
}

/// Outcome of applying a plan to disk, with every file accounted for.
#[derive(Debug, Default)]
pub struct MigrationReport {
  pub transformed: Vec<PathBuf>,
  /// Scanned files the plan left untouched.
  pub skipped: Vec<PathBuf>,
  /// Files whose write or delete failed.
  pub failed: Vec<PathBuf>,
  pub deleted: Vec<PathBuf>,
  pub diagnostics: Vec<Diagnostic>,
}

/// Writes the planned rewrites and removes the recognized legacy modules.
/// Every file is attempted: a failed write or delete becomes an error
/// diagnostic against that file and the rest of the plan still applies.
pub async fn apply_plan(plan: &MigrationPlan) -> MigrationReport {
  let mut report = MigrationReport::default();

  for (path, migration) in &plan.rewrites {
    report.diagnostics.extend(migration.diagnostics.iter().cloned());
    match &migration.new_source {
      None => report.skipped.push(path.clone()),
      Some(new_source) => match fs::write(path, new_source).await {
        Ok(()) => report.transformed.push(path.clone()),
        Err(error) => {
          report.failed.push(path.clone());
          report
            .diagnostics
            .push(Diagnostic::error(path, 0, format!("could not write file: {error}")));
        }
      },
    }
  }

  for path in &plan.deletions {
    match fs::remove_file(path).await {
      Ok(()) => report.deleted.push(path.clone()),
      Err(error) => {
        report.failed.push(path.clone());
        report
          .diagnostics
          .push(Diagnostic::error(path, 0, format!("could not delete legacy module: {error}")));
      }
    }
  }

  report
}

/// Computes the full migration over the scanned file set.
///
/// Pass one rewrites the files that call `setupTypeGen` and records them as
/// legacy tag sources; pass two splits `sql` out of imports that point at
/// those files; the deletion list covers generated modules recognized by
/// their header and legacy signature.
pub fn plan_migration(files: &[(PathBuf, String)], options: &MigrateOptions) -> MigrationPlan {
  let mut plan = MigrationPlan::default();
  let mut legacy_sources: BTreeSet<PathBuf> = BTreeSet::new();

  let mut setups = Vec::with_capacity(files.len());
  for (path, source) in files {
    if is_legacy_generated_file(source) {
      plan.deletions.push(path.clone());
      setups.push(None);
      continue;
    }
    let migration = migrate_setup_file(path, source, options);
    if migration.as_ref().is_some_and(|m| m.new_source.is_some()) {
      legacy_sources.insert(normalize(path));
    }
    setups.push(migration);
  }

  let mut setups = setups.into_iter();
  for (path, source) in files {
    let setup = setups.next().flatten();
    if plan.deletions.contains(path) {
      continue;
    }
    let migration = match setup {
      Some(migration) => migration,
      None => migrate_importer_file(path, source, &legacy_sources, options).unwrap_or_default(),
    };
    plan.rewrites.push((path.clone(), migration));
  }
  plan
}

/// True for files produced by the legacy codegen: the exact three-line
/// header plus one of its structural signatures. Header-only files written
/// by other tools are left alone.
pub fn is_legacy_generated_file(source: &str) -> bool {
  let mut lines = source.lines().map(str::trim).filter(|l| !l.is_empty());
  for expected in LEGACY_HEADER {
    if lines.next() != Some(expected) {
      return false;
    }
  }
  ["_meta_v0", "_pg_types", "KnownTypes"].iter().any(|signature| source.contains(signature))
}

static SETUP_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?const[ \t]*\{(?P<names>[^}]*)\}[ \t]*=[ \t]*setupTypeGen[ \t]*\(")
    .unwrap()
});

/// Rewrites a file that calls `setupTypeGen`: the helper import becomes a
/// plain tag import, the `knownTypes` import goes away, the destructuring
/// statement becomes a tombstone comment, and member tags lose their member.
/// Returns None when the file does not use the helper.
fn migrate_setup_file(path: &Path, source: &str, options: &MigrateOptions) -> Option<FileMigration> {
  let masked = match mask_source(source) {
    Ok(masked) => masked,
    Err(error) => return Some(lex_failure(path, error)),
  };
  let imports = find_imports(source, &masked);

  let setup_import = imports
    .iter()
    .find(|i| i.module == options.legacy_module && i.local_for("setupTypeGen").is_some())?;
  let call = SETUP_CALL_RE.captures(&masked)?;

  let mut migration = FileMigration::default();
  let mut patches = vec![Patch::new(setup_import.span, tag_import_line(options))];

  for import in &imports {
    if import.local_for("knownTypes").is_some() && import.module.starts_with('.') {
      patches.push(remove_line_patch(source, import.span));
    }
  }

  let names_span = call.name("names").unwrap();
  let names = &source[names_span.start()..names_span.end()];
  let open_paren = call.get(0).unwrap().end() - 1;
  let close_paren = matching_paren(&masked, open_paren)?;
  let mut end = close_paren + 1;
  if source.as_bytes().get(end) == Some(&b';') {
    end += 1;
  }
  patches.push(Patch::new(Span::new(call.get(0).unwrap().start(), end), TOMBSTONE));

  let mut tag_local = None;
  for entry in names.split(',') {
    let local = entry.split(':').next_back().unwrap_or_default().trim();
    if local == options.tag_name {
      tag_local = Some(local.to_string());
    }
    if local == "poolConfig" {
      migration.diagnostics.push(Diagnostic {
        level: Level::Warn,
        file: path.to_path_buf(),
        line: line_of(source, names_span.start()),
        message: "WARNING: \"poolConfig\" should be removed manually".to_string(),
      });
    }
  }

  if let Some(local) = tag_local {
    patches.extend(member_tag_patches(&masked, &local));
  }

  migration.new_source = Some(apply_patches(source, patches));
  Some(migration)
}

/// Splits the tag binding out of imports that point at a migrated setup
/// file: `import {sql, queryB} from './db'` becomes a slonik import plus the
/// residual named import (dropped entirely when `sql` was alone).
fn migrate_importer_file(
  path: &Path,
  source: &str,
  legacy_sources: &BTreeSet<PathBuf>,
  options: &MigrateOptions,
) -> Option<FileMigration> {
  let masked = match mask_source(source) {
    Ok(masked) => masked,
    Err(error) => return Some(lex_failure(path, error)),
  };
  let imports = find_imports(source, &masked);

  let mut patches = Vec::new();
  for import in &imports {
    if import.local_for(&options.tag_name).is_none() {
      continue;
    }
    let Some(resolved) = resolve_relative(path, &import.module) else { continue };
    if !legacy_sources.contains(&resolved) {
      continue;
    }

    let rest: Vec<String> = import
      .clause
      .named
      .iter()
      .filter(|b| b.imported != options.tag_name)
      .map(|b| {
        if b.imported == b.local { b.imported.clone() } else { format!("{} as {}", b.imported, b.local) }
      })
      .collect();

    let replacement = if rest.is_empty() {
      tag_import_line(options)
    } else {
      format!("{}\nimport {{{}}} from '{}'", tag_import_line(options), rest.join(", "), import.module)
    };
    patches.push(Patch::new(import.span, replacement));
  }

  if patches.is_empty() {
    return None;
  }
  Some(FileMigration { new_source: Some(apply_patches(source, patches)), diagnostics: Vec::new() })
}

fn tag_import_line(options: &MigrateOptions) -> String {
  format!("import {{{}}} from '{}'", options.tag_name, options.tag_module)
}

fn lex_failure(path: &Path, error: LexError) -> FileMigration {
  FileMigration {
    new_source: None,
    diagnostics: vec![Diagnostic {
      level: Level::Error,
      file: path.to_path_buf(),
      line: 0,
      message: format!("file could not be lexed: {error}"),
    }],
  }
}

/// Strips `.Member` off legacy member tags for the given binding, leaving a
/// plain tag for the generate pass to annotate.
fn member_tag_patches(masked: &str, binding: &str) -> Vec<Patch> {
  let re = Regex::new(&format!(
    r"\b{}(?P<member>[ \t]*\.[ \t]*[A-Za-z_$][A-Za-z0-9_$]*)[ \t]*`",
    regex::escape(binding)
  ))
  .unwrap();
  re.captures_iter(masked)
    .map(|c| {
      let member = c.name("member").unwrap();
      Patch::new(Span::new(member.start(), member.end()), "")
    })
    .collect()
}

/// Widens an import span to remove its whole line.
fn remove_line_patch(source: &str, span: Span) -> Patch {
  let mut end = span.end;
  let bytes = source.as_bytes();
  while end < bytes.len() && bytes[end] != b'\n' {
    end += 1;
  }
  if end < bytes.len() {
    end += 1;
  }
  Patch::new(Span::new(span.start, end), "")
}

fn matching_paren(masked: &str, open: usize) -> Option<usize> {
  let mut depth = 0usize;
  for (i, &b) in masked.as_bytes().iter().enumerate().skip(open) {
    match b {
      b'(' => depth += 1,
      b')' => {
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

/// Resolves `./a` / `../a` against the importer's directory, appending `.ts`
/// when the specifier has no extension. Non-relative specifiers resolve to
/// nothing: package imports never point at migratable files.
fn resolve_relative(importer: &Path, specifier: &str) -> Option<PathBuf> {
  if !specifier.starts_with("./") && !specifier.starts_with("../") {
    return None;
  }
  let mut joined = importer.parent().unwrap_or_else(|| Path::new("")).join(specifier);
  if joined.extension().is_none() {
    joined.set_extension("ts");
  }
  Some(normalize(&joined))
}

/// Lexically folds `.` and `..` components; no filesystem access.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

fn line_of(source: &str, offset: usize) -> usize {
  source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}
