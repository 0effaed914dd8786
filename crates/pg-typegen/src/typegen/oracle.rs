//! Query description via psql's `\gdesc` metacommand.
//!
//! `\gdesc` answers "what columns would this return" for any statement the
//! server can plan, without executing it. That covers DDL and utility
//! statements the extended protocol's prepare path refuses to describe,
//! which is why this goes through a psql subprocess instead of the pool.

use std::process::Stdio;

use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

/// Verbatim psql output when a statement produces no result set.
const NO_RESULT_MESSAGE: &str = "The command has no result, or its result has no columns to display.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedColumn {
  pub name: String,
  /// Type name as psql prints it, e.g. `integer`, `text[]`, `character varying(10)`.
  pub regtype: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeOutcome {
  Columns(Vec<DescribedColumn>),
  /// Statement runs but returns nothing (DDL, `set`, void-returning calls).
  Void,
}

#[derive(Debug, Error)]
pub enum OracleError {
  #[error("failed to spawn {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },
  #[error("{0}")]
  Describe(String),
}

pub trait SchemaOracle {
  fn describe(&self, sql: &str) -> impl Future<Output = Result<DescribeOutcome, OracleError>>;
}

/// Describes queries by piping `<query> \gdesc` into a psql subprocess.
#[derive(Debug, Clone)]
pub struct PsqlOracle {
  psql: String,
  connection: String,
}

impl PsqlOracle {
  pub fn new(psql: impl Into<String>, connection: impl Into<String>) -> Self {
    Self { psql: psql.into(), connection: connection.into() }
  }
}

impl SchemaOracle for PsqlOracle {
  async fn describe(&self, sql: &str) -> Result<DescribeOutcome, OracleError> {
    let mut child = Command::new(&self.psql)
      .arg(&self.connection)
      .args(["-X", "-A", "-t", "-v", "ON_ERROR_STOP=1"])
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| OracleError::Spawn { command: self.psql.clone(), source })?;

    if let Some(mut stdin) = child.stdin.take() {
      let script = format!("{sql} \\gdesc\n");
      stdin
        .write_all(script.as_bytes())
        .await
        .map_err(|source| OracleError::Spawn { command: self.psql.clone(), source })?;
    }

    let output = child
      .wait_with_output()
      .await
      .map_err(|source| OracleError::Spawn { command: self.psql.clone(), source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_describe_output(sql, &stdout, &stderr)
  }
}

/// Parses unaligned tuples-only `\gdesc` output. Lines are `name|type`;
/// a void statement is reported as a fixed message instead of rows.
pub fn parse_describe_output(sql: &str, stdout: &str, stderr: &str) -> Result<DescribeOutcome, OracleError> {
  if stdout.lines().any(|line| line.trim() == NO_RESULT_MESSAGE) {
    return Ok(DescribeOutcome::Void);
  }

  let mut columns = Vec::new();
  for line in stdout.lines() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    if let Some((name, regtype)) = line.split_once('|') {
      columns.push(DescribedColumn { name: name.to_string(), regtype: regtype.to_string() });
    }
  }

  if columns.is_empty() {
    return Err(OracleError::Describe(describe_failure(sql, stdout, stderr)));
  }
  Ok(DescribeOutcome::Columns(columns))
}

fn describe_failure(sql: &str, stdout: &str, stderr: &str) -> String {
  let result = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
  let mut message = format!(
    "Error running psql query.\n\nQuery: \"{sql} \\gdesc\"\n\nResult: \"{result}\"\n\nError: Empty output received."
  );
  if sql.contains("--") {
    // Single-line flattening turns trailing `--` comments into swallowed SQL.
    message.push_str(" Try moving comments to dedicated lines.");
  }
  message
}
