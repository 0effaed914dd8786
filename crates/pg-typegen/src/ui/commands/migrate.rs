use tokio::fs;

use crate::{
  typegen::{
    migrate::{MigrateError, MigrateOptions, apply_plan, plan_migration},
    report::Level,
    vcs::{GitStatus, TreeState, VcsStatus},
    walk::collect_files,
  },
  ui::{Colors, MigrateCommand},
};

use super::generate::{RunLogger, RunOptions, generate_types};

/// Rewrites the project from the legacy setupTypeGen layout and then runs a
/// normal generate pass over the result.
pub async fn migrate_project(command: MigrateCommand, colors: &Colors) -> anyhow::Result<()> {
  let skip_clean_check = command.skip_clean_check;
  let options = RunOptions::from_command(command.generate)?;
  let config = &options.config;
  let logger = RunLogger::new(&options, colors);

  if config.check_clean && !skip_clean_check {
    match GitStatus.tree_state(&config.root).await.map_err(MigrateError::Vcs)? {
      TreeState::Clean => {}
      TreeState::Dirty(detail) => return Err(MigrateError::DirtyTree(detail).into()),
    }
  }

  let files = collect_files(&config.root, &config.include, &config.exclude)?;
  let mut sources = Vec::with_capacity(files.len());
  for path in files {
    match fs::read_to_string(&path).await {
      Ok(text) => sources.push((path, text)),
      Err(error) => eprintln!("{}: could not read file: {error}", path.display()),
    }
  }

  let migrate_options = MigrateOptions {
    legacy_module: config.legacy_module.clone(),
    tag_module: config.tag_module.clone(),
    tag_name: config.tag_name.clone(),
  };
  let plan = plan_migration(&sources, &migrate_options);
  let report = apply_plan(&plan).await;

  for diagnostic in &report.diagnostics {
    match diagnostic.level {
      Level::Debug => {
        if options.verbose {
          logger.info(&diagnostic.to_string());
        }
      }
      Level::Warn | Level::Error => eprintln!("{diagnostic}"),
    }
  }

  for path in &report.transformed {
    logger.info(&format!("Rewrote {}", path.display()));
  }
  for path in &report.deleted {
    logger.info(&format!("Deleted legacy generated module {}", path.display()));
  }
  for path in &report.failed {
    logger.info(&format!("Failed to apply {}", path.display()));
  }
  for path in &report.skipped {
    logger.info(&format!("Skipped {} (nothing legacy to rewrite)", path.display()));
  }

  logger.info("Migration rewrites complete");
  logger.stat("Files rewritten", report.transformed.len().to_string());
  logger.stat("Files skipped", report.skipped.len().to_string());
  logger.stat("Modules deleted", report.deleted.len().to_string());
  if !report.failed.is_empty() {
    logger.stat("Files failed", report.failed.len().to_string());
  }

  generate_types(&options, colors).await?;
  Ok(())
}
