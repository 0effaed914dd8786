//! Per-file pipeline wiring and the concurrent run loop.
//!
//! Each file is processed in complete isolation: scan, describe, resolve,
//! render, patch, write. Failures are reported as diagnostics against the
//! file and never stop other files. The only shared state is the oracle and
//! catalog handles, both safe to use concurrently.

use std::path::{Path, PathBuf};

use futures::{StreamExt, stream};
use tokio::fs;

use crate::typegen::{
  attribution,
  catalog::{CatalogError, SchemaCatalog},
  config::{Config, WritePlacement},
  declarations::{self, MARKER_COMMENT},
  model::{ColumnDescriptor, ColumnRef, DeclarationBlock, TagForm, TypeShape},
  normalize::normalize,
  oracle::{DescribeOutcome, SchemaOracle},
  patcher,
  pgtypes,
  report::{self, Diagnostic, RunStats},
  resolver::{TableNaming, TypeRegistry, merge_fields},
  scan::{ScanConfig, scan_source},
  walk::collect_files,
};

pub struct Orchestrator<O, C> {
  config: Config,
  oracle: O,
  catalog: C,
}

impl<O: SchemaOracle, C: SchemaCatalog> Orchestrator<O, C> {
  pub fn new(config: Config, oracle: O, catalog: C) -> Self {
    Self { config, oracle, catalog }
  }

  pub async fn run(&self) -> anyhow::Result<RunStats> {
    let files = collect_files(&self.config.root, &self.config.include, &self.config.exclude)?;
    let outcomes: Vec<RunStats> = stream::iter(files)
      .map(|path| self.process_file(path))
      .buffer_unordered(self.config.concurrency.max(1))
      .collect()
      .await;

    let mut stats = RunStats::default();
    for outcome in outcomes {
      stats.merge(outcome);
    }
    Ok(stats)
  }

  /// Runs the whole pipeline for one file. Never returns an error: every
  /// failure becomes a diagnostic so the rest of the run is unaffected.
  pub async fn process_file(&self, path: PathBuf) -> RunStats {
    let mut stats = RunStats { files_scanned: 1, ..RunStats::default() };

    let text = match fs::read_to_string(&path).await {
      Ok(text) => text,
      Err(error) => {
        stats.files_skipped = 1;
        stats.diagnostics.push(Diagnostic::error(&path, 0, format!("could not read file: {error}")));
        return stats;
      }
    };

    let scan_config =
      ScanConfig { tag_module: self.config.tag_module.clone(), tag_name: self.config.tag_name.clone() };
    let scan = match scan_source(&path, &text, &scan_config) {
      Ok(scan) => scan,
      Err(error) => {
        stats.files_skipped = 1;
        stats.diagnostics.push(Diagnostic::error(&path, 0, format!("file could not be parsed: {error}")));
        return stats;
      }
    };

    let mut registry = TypeRegistry::new();
    let mut patches = Vec::new();

    for usage in &scan.usages {
      if let TagForm::Member(member) = &usage.form {
        stats.diagnostics.push(Diagnostic::debug(
          &path,
          usage.line,
          format!("member tag `.{member}` is a legacy form; run the migrate command first"),
        ));
        continue;
      }

      let normalized = normalize(usage);
      let resolved = if normalized.is_multi_statement() {
        Err("query contains multiple statements".to_string())
      } else {
        self.resolve_query(&normalized.text).await
      };

      match resolved {
        Ok((shape, table)) => {
          let name = registry.register(shape, table.as_ref(), &normalized.text);
          match &name {
            Some(_) => stats.queries_typed += 1,
            None => stats.queries_untypeable += 1,
          }
          if let Some(patch) =
            patcher::annotation_patch(&text, usage.annotation_span, &self.config.namespace, name.as_deref())
          {
            patches.push(patch);
          }
        }
        Err(message) => {
          stats.queries_untypeable += 1;
          stats.diagnostics.push(Diagnostic::debug(
            &path,
            usage.line,
            format!("Query `{}` is not typeable", report::truncate_query(&normalized.text, 100)),
          ));
          stats.diagnostics.push(Diagnostic::warn(
            &path,
            usage.line,
            format!("Extracting types from query failed: {message}"),
          ));
          if let Some(patch) =
            patcher::annotation_patch(&text, usage.annotation_span, &self.config.namespace, None)
          {
            patches.push(patch);
          }
        }
      }
    }

    for warning in registry_warnings(&registry) {
      stats.diagnostics.push(Diagnostic::warn(&path, 0, warning));
    }

    let marked = patcher::find_marked_blocks(&text, &scan.masked, &self.config.namespace);
    let block = registry.into_block();

    let new_text = match &self.config.placement {
      WritePlacement::Inline => {
        if block.is_empty() {
          for span in marked {
            patches.push(patcher::removal_patch(&text, span));
          }
          patcher::apply_patches(&text, patches)
        } else {
          let rendered = declarations::render_namespace_block(&block, &self.config.namespace);
          match marked.split_first() {
            Some((first, rest)) => {
              patches.push(patcher::Patch::new(*first, rendered));
              for span in rest {
                patches.push(patcher::removal_patch(&text, *span));
              }
              patcher::apply_patches(&text, patches)
            }
            None => patcher::append_block(&patcher::apply_patches(&text, patches), &rendered),
          }
        }
      }
      WritePlacement::SiblingDir(dir) => {
        // Inline blocks from a previous inline run must not survive a switch
        // to separate files.
        for span in marked {
          patches.push(patcher::removal_patch(&text, span));
        }
        if !block.is_empty() {
          let has_namespace_import =
            scan.imports.iter().any(|i| i.clause.namespace.as_deref() == Some(self.config.namespace.as_str()));
          if !has_namespace_import {
            let specifier = module_specifier(dir, &path);
            patches.push(patcher::import_patch(&self.config.namespace, &specifier));
          }
        }

        // The source must not gain an import or annotations pointing at a
        // module that was never written.
        match self.write_sibling_module(dir, &path, &block).await {
          Ok(changed) => {
            if changed {
              stats.files_changed += 1;
            }
          }
          Err(error) => {
            stats.files_skipped = 1;
            stats.diagnostics.push(Diagnostic::error(&path, 0, format!("could not write queries module: {error}")));
            return stats;
          }
        }
        patcher::apply_patches(&text, patches)
      }
    };

    if new_text != text {
      match fs::write(&path, &new_text).await {
        Ok(()) => stats.files_changed += 1,
        Err(error) => {
          stats.files_skipped = 1;
          stats.diagnostics.push(Diagnostic::error(&path, 0, format!("could not write file: {error}")));
        }
      }
    }
    stats
  }

  /// Oracle plus catalog resolution for one normalized query. The error
  /// string is the user-facing reason the query stays untyped.
  async fn resolve_query(
    &self,
    normalized: &str,
  ) -> Result<(TypeShape, Option<TableNaming>), String> {
    let outcome = self.oracle.describe(normalized).await.map_err(|e| e.to_string())?;
    let described = match outcome {
      DescribeOutcome::Void => return Ok((TypeShape::Void, None)),
      DescribeOutcome::Columns(columns) => columns,
    };

    let analysis = attribution::analyze(normalized);
    let (table_naming, resolved_table) = match analysis.single_table() {
      None => (None, None),
      Some(written) => {
        let resolved = self.catalog.resolve_table(written).await.map_err(catalog_failure)?;
        let short_name = written.rsplit('.').next().unwrap_or(written).to_string();
        let columns = resolved.as_ref().map(|t| t.columns.clone()).unwrap_or_default();
        (Some(TableNaming { short_name, columns }), resolved)
      }
    };

    let mut descriptors = Vec::with_capacity(described.len());
    for column in described {
      let enum_labels = self.catalog.enum_labels(&column.regtype).await.map_err(catalog_failure)?;
      let ts_type = pgtypes::ts_type(&column.regtype, enum_labels.as_deref());

      let mut attribution_ref = None;
      let mut not_null = analysis.not_null_labels.contains(&column.name);
      let mut comment = None;

      if let Some((written_table, source_column)) = analysis.attributed_column(&column.name) {
        let identity = match &resolved_table {
          Some(identity) => Some(identity.clone()),
          None => self.catalog.resolve_table(&written_table).await.map_err(catalog_failure)?,
        };
        if let Some(identity) = identity {
          if let Some(meta) =
            self.catalog.column_meta(&identity.qualified, &source_column).await.map_err(catalog_failure)?
          {
            not_null = not_null || meta.not_null;
            comment = meta.comment;
            attribution_ref = Some(ColumnRef { table: identity.qualified, column: source_column });
          }
        }
      }

      descriptors.push(ColumnDescriptor {
        label: column.name,
        regtype: column.regtype,
        ts_type,
        not_null,
        attribution: attribution_ref,
        comment,
      });
    }

    Ok((TypeShape::Fields(merge_fields(descriptors)), table_naming))
  }

  /// Writes (or removes) the standalone queries module for one source file.
  /// Returns whether anything on disk changed.
  async fn write_sibling_module(
    &self,
    dir: &str,
    source_path: &Path,
    block: &DeclarationBlock,
  ) -> std::io::Result<bool> {
    let module_path = sibling_module_path(dir, source_path);

    if block.is_empty() {
      match fs::read_to_string(&module_path).await {
        Ok(existing) if existing.starts_with(MARKER_COMMENT) => {
          fs::remove_file(&module_path).await?;
          return Ok(true);
        }
        _ => return Ok(false),
      }
    }

    let rendered = declarations::render_module(block);
    if let Ok(existing) = fs::read_to_string(&module_path).await {
      if existing == rendered {
        return Ok(false);
      }
    }
    if let Some(parent) = module_path.parent() {
      fs::create_dir_all(parent).await?;
    }
    fs::write(&module_path, rendered).await?;
    Ok(true)
  }
}

fn catalog_failure(error: CatalogError) -> String {
  error.to_string()
}

fn registry_warnings(registry: &TypeRegistry) -> Vec<String> {
  registry.warnings().map(str::to_string).collect()
}

/// `<parent>/<dir>/<stem>.ts` next to the source file.
pub fn sibling_module_path(dir: &str, source_path: &Path) -> PathBuf {
  let parent = source_path.parent().unwrap_or_else(|| Path::new(""));
  let file_name = source_path.file_name().unwrap_or_default();
  parent.join(dir).join(file_name)
}

/// Extensionless relative specifier for the namespace import.
pub fn module_specifier(dir: &str, source_path: &Path) -> String {
  let stem = source_path.file_stem().unwrap_or_default().to_string_lossy();
  format!("./{dir}/{stem}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sibling_paths_and_specifiers() {
    let source = Path::new("src/queries/a.ts");
    assert_eq!(sibling_module_path("__sql__", source), PathBuf::from("src/queries/__sql__/a.ts"));
    assert_eq!(module_specifier("__sql__", source), "./__sql__/a");
  }
}
