use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::colors::{ColorMode, Colors, ThemeMode};

#[derive(Parser, Debug)]
#[command(name = "pg-typegen")]
#[command(author, version, about = "Generates TypeScript types for tagged SQL queries from a live PostgreSQL database")]
#[command(styles = Colors::clap_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  /// Control color output
  #[arg(long, value_enum, default_value = "auto", global = true)]
  pub color: ColorMode,

  /// Terminal theme (dark or light background)
  #[arg(long, value_enum, default_value = "auto", global = true)]
  pub theme: ThemeMode,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
  /// Scan sources, describe queries against the database, and rewrite the
  /// sources with generated types
  Generate(GenerateCommand),
  /// Rewrite a project off the legacy setupTypeGen layout, then generate
  Migrate(MigrateCommand),
}

#[derive(Args, Debug)]
pub struct GenerateCommand {
  /// Project root to scan (also where pg-typegen.toml is looked up)
  #[arg(short, long, value_name = "DIR", default_value = ".")]
  pub root: PathBuf,

  /// Glob patterns of files to scan (default **/*.ts)
  #[arg(long, value_name = "GLOB")]
  pub include: Option<Vec<String>>,

  /// Glob patterns of files to skip (default **/node_modules/**)
  #[arg(long, value_name = "GLOB")]
  pub exclude: Option<Vec<String>>,

  /// PostgreSQL connection URI
  #[arg(short, long, value_name = "URI")]
  pub connection: Option<String>,

  /// psql executable used to describe queries
  #[arg(long, value_name = "CMD")]
  pub psql: Option<String>,

  /// Write declarations to standalone modules under this sibling directory
  /// instead of inline namespace blocks
  #[arg(long, value_name = "DIR")]
  pub queries_dir: Option<String>,

  /// Number of files processed concurrently
  #[arg(long, value_name = "N")]
  pub concurrency: Option<usize>,

  /// Enable verbose output with per-query detail
  #[arg(short, long, default_value_t = false)]
  pub verbose: bool,

  /// Suppress non-essential output (errors only)
  #[arg(short, long, default_value_t = false)]
  pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct MigrateCommand {
  #[command(flatten)]
  pub generate: GenerateCommand,

  /// Skip the clean-working-tree check before rewriting files
  #[arg(long, default_value_t = false)]
  pub skip_clean_check: bool,
}
