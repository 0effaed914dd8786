use chrono::{Local, Timelike};
use crossterm::style::Stylize;
use sqlx::postgres::PgPoolOptions;

use crate::{
  typegen::{
    Config, Orchestrator, RunStats,
    catalog::PgCatalog,
    config::FileConfig,
    oracle::PsqlOracle,
    report::Level,
  },
  ui::{Colors, GenerateCommand},
};

fn format_timestamp() -> String {
  let now = Local::now();
  format!("[{:02}:{:02}:{:02}]", now.hour(), now.minute(), now.second())
}

/// Fully merged run options: defaults, then `pg-typegen.toml`, then flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub config: Config,
  pub verbose: bool,
  pub quiet: bool,
}

impl RunOptions {
  pub fn from_command(command: GenerateCommand) -> anyhow::Result<Self> {
    let mut config = Config { root: command.root.clone(), ..Config::default() };
    if let Some(file_config) = FileConfig::load(&command.root)? {
      file_config.apply_to(&mut config);
    }

    if let Some(include) = command.include {
      config.include = include;
    }
    if let Some(exclude) = command.exclude {
      config.exclude = exclude;
    }
    if let Some(connection) = command.connection {
      config.connection = connection;
    }
    if let Some(psql) = command.psql {
      config.psql = psql;
    }
    if let Some(dir) = command.queries_dir {
      config.placement = crate::typegen::WritePlacement::SiblingDir(dir);
    }
    if let Some(concurrency) = command.concurrency {
      config.concurrency = concurrency.max(1);
    }

    Ok(Self { config, verbose: command.verbose, quiet: command.quiet })
  }
}

pub async fn generate_types(options: &RunOptions, colors: &Colors) -> anyhow::Result<RunStats> {
  let logger = RunLogger::new(options, colors);
  logger.info(&format!("Scanning {} for tagged SQL queries", options.config.root.display()));

  let pool = PgPoolOptions::new()
    .max_connections(options.config.concurrency as u32)
    .connect_lazy(&options.config.connection)?;
  let oracle = PsqlOracle::new(&options.config.psql, &options.config.connection);
  let catalog = PgCatalog::new(pool);

  let orchestrator = Orchestrator::new(options.config.clone(), oracle, catalog);
  let stats = orchestrator.run().await?;

  for diagnostic in &stats.diagnostics {
    match diagnostic.level {
      Level::Debug => {
        if options.verbose {
          logger.info(&diagnostic.to_string());
        }
      }
      Level::Warn | Level::Error => eprintln!("{diagnostic}"),
    }
  }

  logger.info("Generation complete");
  logger.stat("Files scanned", stats.files_scanned.to_string());
  logger.stat("Files changed", stats.files_changed.to_string());
  logger.stat("Queries typed", stats.queries_typed.to_string());
  if stats.queries_untypeable > 0 {
    logger.stat("Queries untypeable", stats.queries_untypeable.to_string());
  }
  if stats.files_skipped > 0 {
    logger.stat("Files skipped", stats.files_skipped.to_string());
  }

  Ok(stats)
}

pub(super) struct RunLogger<'a> {
  options: &'a RunOptions,
  colors: &'a Colors,
}

impl<'a> RunLogger<'a> {
  pub(super) fn new(options: &'a RunOptions, colors: &'a Colors) -> Self {
    Self { options, colors }
  }

  pub(super) fn info(&self, message: &str) {
    if !self.options.quiet {
      println!("{} {message}", format_timestamp().with(self.colors.timestamp()));
    }
  }

  pub(super) fn stat(&self, label: &str, value: String) {
    if !self.options.quiet {
      println!(
        "            {:<25} {}",
        label.with(self.colors.label()),
        value.with(self.colors.value())
      );
    }
  }
}
