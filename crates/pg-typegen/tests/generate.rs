//! End-to-end generate runs over real temp directories, with the database
//! stubbed out behind the oracle and catalog traits.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use pg_typegen::typegen::{
  Config, Orchestrator, WritePlacement,
  catalog::{CatalogError, ColumnMeta, SchemaCatalog, TableIdentity},
  oracle::{DescribeOutcome, DescribedColumn, OracleError, SchemaOracle},
  report::Level,
};
use tempfile::TempDir;

#[derive(Default, Clone)]
struct MockOracle {
  answers: HashMap<String, DescribeOutcome>,
  failures: HashMap<String, String>,
}

impl MockOracle {
  fn columns(mut self, sql: &str, columns: &[(&str, &str)]) -> Self {
    let columns = columns
      .iter()
      .map(|(name, regtype)| DescribedColumn { name: name.to_string(), regtype: regtype.to_string() })
      .collect();
    self.answers.insert(sql.to_string(), DescribeOutcome::Columns(columns));
    self
  }

  fn void(mut self, sql: &str) -> Self {
    self.answers.insert(sql.to_string(), DescribeOutcome::Void);
    self
  }

  fn failing(mut self, sql: &str, message: &str) -> Self {
    self.failures.insert(sql.to_string(), message.to_string());
    self
  }
}

impl SchemaOracle for MockOracle {
  async fn describe(&self, sql: &str) -> Result<DescribeOutcome, OracleError> {
    if let Some(message) = self.failures.get(sql) {
      return Err(OracleError::Describe(message.clone()));
    }
    self
      .answers
      .get(sql)
      .cloned()
      .ok_or_else(|| OracleError::Describe(format!("unexpected query: {sql}")))
  }
}

#[derive(Default, Clone)]
struct MockCatalog {
  tables: HashMap<String, TableIdentity>,
  columns: HashMap<(String, String), ColumnMeta>,
  enums: HashMap<String, Vec<String>>,
}

impl MockCatalog {
  fn table(mut self, written: &str, qualified: &str, columns: &[&str]) -> Self {
    self.tables.insert(
      written.to_string(),
      TableIdentity {
        qualified: qualified.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
      },
    );
    self
  }

  fn column(mut self, qualified: &str, column: &str, not_null: bool, comment: Option<&str>) -> Self {
    self.columns.insert(
      (qualified.to_string(), column.to_string()),
      ColumnMeta { not_null, comment: comment.map(String::from) },
    );
    self
  }
}

impl SchemaCatalog for MockCatalog {
  async fn resolve_table(&self, name: &str) -> Result<Option<TableIdentity>, CatalogError> {
    Ok(self.tables.get(name).cloned())
  }

  async fn column_meta(&self, qualified: &str, column: &str) -> Result<Option<ColumnMeta>, CatalogError> {
    Ok(self.columns.get(&(qualified.to_string(), column.to_string())).cloned())
  }

  async fn enum_labels(&self, regtype: &str) -> Result<Option<Vec<String>>, CatalogError> {
    let base = regtype.trim_end_matches("[]");
    Ok(self.enums.get(base).cloned())
  }
}

fn test_config(root: &Path) -> Config {
  Config { root: root.to_path_buf(), concurrency: 1, ..Config::default() }
}

fn write_file(root: &Path, name: &str, content: &str) -> PathBuf {
  let path = root.join(name);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(&path, content).unwrap();
  path
}

fn test_table_catalog() -> MockCatalog {
  MockCatalog::default()
    .table("test_table", "public.test_table", &["id", "n", "t"])
    .column("public.test_table", "id", true, None)
    .column("public.test_table", "n", false, None)
    .column("public.test_table", "t", false, None)
}

#[tokio::test]
async fn annotates_tags_and_appends_a_namespace_block() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default sql`select id, t from test_table`\n",
  );

  let oracle = MockOracle::default().columns("select id, t from test_table", &[("id", "integer"), ("t", "text")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, test_table_catalog());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(stats.files_scanned, 1);
  assert_eq!(stats.files_changed, 1);
  assert_eq!(stats.queries_typed, 1);

  let expected = "\
import {sql} from 'slonik'

export default sql<queries.TestTable_id_t>`select id, t from test_table`

export declare namespace queries {
  // Generated by pg-typegen

  /** - query: `select id, t from test_table` */
  export interface TestTable_id_t {
    /** column: `public.test_table.id`, not null: `true`, regtype: `integer` */
    id: number

    /** column: `public.test_table.t`, regtype: `text` */
    t: string | null
  }
}
";
  assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
}

#[tokio::test]
async fn reruns_are_byte_identical() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default sql`select id, t from test_table`\n",
  );

  let oracle = MockOracle::default().columns("select id, t from test_table", &[("id", "integer"), ("t", "text")]);

  let first_run = Orchestrator::new(test_config(dir.path()), oracle.clone(), test_table_catalog());
  first_run.run().await.unwrap();
  let after_first = std::fs::read_to_string(&path).unwrap();

  let second_run = Orchestrator::new(test_config(dir.path()), oracle, test_table_catalog());
  let stats = second_run.run().await.unwrap();
  let after_second = std::fs::read_to_string(&path).unwrap();

  assert_eq!(after_first, after_second);
  assert_eq!(stats.files_changed, 0);
}

#[tokio::test]
async fn structurally_identical_queries_share_a_type_with_sorted_docs() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport const a = sql`select id from test_table where n = ${x}`\nexport const b = sql`select id from test_table`\n",
  );

  let oracle = MockOracle::default()
    .columns("select id from test_table where n = $1", &[("id", "integer")])
    .columns("select id from test_table", &[("id", "integer")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, test_table_catalog());
  let stats = orchestrator.run().await.unwrap();
  assert_eq!(stats.queries_typed, 2);

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("sql<queries.TestTable_id>`select id from test_table where n = ${x}`"));
  assert!(text.contains("sql<queries.TestTable_id>`select id from test_table`"));
  // One interface, documenting both queries in sorted order.
  assert_eq!(text.matches("export interface TestTable_id").count(), 1);
  let docs_at = text.find("* - `select id from test_table`").unwrap();
  let second_at = text.find("* - `select id from test_table where n = $1`").unwrap();
  assert!(docs_at < second_at);
}

#[tokio::test]
async fn void_statements_share_the_void_marker() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default [\n  sql`update test_table set n = 0`,\n  sql`create table x (y int)`,\n]\n",
  );

  let oracle =
    MockOracle::default().void("update test_table set n = 0").void("create table x (y int)");
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, MockCatalog::default());
  orchestrator.run().await.unwrap();

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("sql<queries._void>`update test_table set n = 0`"));
  assert!(text.contains("sql<queries._void>`create table x (y int)`"));
  assert!(text.contains("export type _void = void"));
  assert_eq!(text.matches("export type _void").count(), 1);
}

#[tokio::test]
async fn failing_queries_stay_bare_and_do_not_affect_others() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default [\n  sql`select id from test_table`,\n  sql`select nonsense`,\n]\n",
  );

  let oracle = MockOracle::default()
    .columns("select id from test_table", &[("id", "integer")])
    .failing("select nonsense", "Error running psql query.");
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, test_table_catalog());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(stats.queries_typed, 1);
  assert_eq!(stats.queries_untypeable, 1);
  assert!(stats.diagnostics.iter().any(|d| d.level == Level::Warn && d.line == 5));
  assert!(
    stats
      .diagnostics
      .iter()
      .any(|d| d.level == Level::Debug && d.message.contains("`select nonsense` is not typeable"))
  );

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("sql<queries.TestTable_id>`select id from test_table`"));
  assert!(text.contains("sql`select nonsense`"));
}

#[tokio::test]
async fn multi_statement_queries_never_reach_the_oracle() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default sql<queries.Stale>`select 1; select 2`\n",
  );

  // No answers registered: reaching the oracle would fail the run loudly.
  let orchestrator = Orchestrator::new(test_config(dir.path()), MockOracle::default(), MockCatalog::default());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(stats.queries_untypeable, 1);
  assert!(stats.diagnostics.iter().any(|d| d.message.contains("multiple statements")));

  // The stale annotation is cleared too.
  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("sql`select 1; select 2`"));
}

#[tokio::test]
async fn files_are_typed_independently() {
  let dir = TempDir::new().unwrap();
  let source = "import {sql} from 'slonik'\n\nexport default sql`select 1 as a`\n";
  let first = write_file(dir.path(), "a.ts", source);
  let second = write_file(dir.path(), "b.ts", source);

  let oracle = MockOracle::default().columns("select 1 as a", &[("a", "integer")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, MockCatalog::default());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(stats.files_scanned, 2);
  assert_eq!(stats.files_changed, 2);
  assert_eq!(stats.queries_typed, 2);

  // Same shape in both files, but each file's namespace stands alone: no
  // shared type, no collision suffix.
  for path in [&first, &second] {
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("sql<queries.A>`select 1 as a`"));
    assert_eq!(text.matches("export declare namespace queries {").count(), 1);
    assert_eq!(text.matches("export interface A {").count(), 1);
    assert!(!text.contains("A2"));
  }
}

#[tokio::test]
async fn files_without_the_tag_import_are_untouched() {
  let dir = TempDir::new().unwrap();
  let original = "declare const sql: any\n\nexport default sql`select 1 as a`\n";
  let path = write_file(dir.path(), "index.ts", original);

  let orchestrator = Orchestrator::new(test_config(dir.path()), MockOracle::default(), MockCatalog::default());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(stats.files_changed, 0);
  assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
}

#[tokio::test]
async fn removing_the_last_query_removes_the_generated_block() {
  let dir = TempDir::new().unwrap();
  let remaining = "\
import {notsql} from 'elsewhere'

export default notsql`select 1 as a`

export declare namespace queries {
  // Generated by pg-typegen

  /** - query: `select 1 as a` */
  export interface A {
    /** regtype: `integer` */
    a: number | null
  }
}
";
  let path = write_file(dir.path(), "index.ts", remaining);

  let orchestrator = Orchestrator::new(test_config(dir.path()), MockOracle::default(), MockCatalog::default());
  orchestrator.run().await.unwrap();

  let text = std::fs::read_to_string(&path).unwrap();
  assert_eq!(text, "import {notsql} from 'elsewhere'\n\nexport default notsql`select 1 as a`\n");
}

#[tokio::test]
async fn duplicate_labels_merge_into_a_union_field() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default sql`select 1 as a, 'two' as a`\n",
  );

  let oracle =
    MockOracle::default().columns("select 1 as a, 'two' as a", &[("a", "integer"), ("a", "text")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, MockCatalog::default());
  let stats = orchestrator.run().await.unwrap();

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("sql<queries.A_a>`select 1 as a, 'two' as a`"));
  assert!(text.contains("Warning: 2 columns detected for field a!"));
  assert!(text.contains("a: (number | null) | (string | null)"));
  assert!(stats.diagnostics.iter().any(|d| d.message.contains("2 columns detected")));
}

#[tokio::test]
async fn enum_columns_render_literal_unions() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql} from 'slonik'\n\nexport default sql`select e from test_table`\n",
  );

  let mut catalog = test_table_catalog();
  catalog.enums.insert("test_enum".to_string(), vec!["aa".to_string(), "bb".to_string(), "cc".to_string()]);

  let oracle = MockOracle::default().columns("select e from test_table", &[("e", "test_enum")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, catalog);
  orchestrator.run().await.unwrap();

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("e: ('aa' | 'bb' | 'cc') | null"));
}

#[tokio::test]
async fn sibling_dir_mode_writes_a_module_and_an_import() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "a.ts",
    "import {sql} from 'slonik'\n\nexport default sql`select 1 as a`\n",
  );

  let config = Config {
    placement: WritePlacement::SiblingDir("__sql__".to_string()),
    ..test_config(dir.path())
  };
  let oracle = MockOracle::default().columns("select 1 as a", &[("a", "integer")]);
  let orchestrator = Orchestrator::new(config.clone(), oracle.clone(), MockCatalog::default());
  orchestrator.run().await.unwrap();

  let expected_source = "\
import * as queries from './__sql__/a'
import {sql} from 'slonik'

export default sql<queries.A>`select 1 as a`
";
  assert_eq!(std::fs::read_to_string(&path).unwrap(), expected_source);

  let module = std::fs::read_to_string(dir.path().join("__sql__/a.ts")).unwrap();
  let expected_module = "\
// Generated by pg-typegen

/** - query: `select 1 as a` */
export interface A {
  /** regtype: `integer` */
  a: number | null
}
";
  assert_eq!(module, expected_module);

  // The second run must not add a second import.
  let rerun = Orchestrator::new(config, oracle, MockCatalog::default());
  let stats = rerun.run().await.unwrap();
  assert_eq!(stats.files_changed, 0);
  assert_eq!(std::fs::read_to_string(&path).unwrap(), expected_source);
}

#[tokio::test]
async fn module_write_failure_leaves_the_source_untouched() {
  let dir = TempDir::new().unwrap();
  let original = "import {sql} from 'slonik'\n\nexport default sql`select 1 as a`\n";
  let path = write_file(dir.path(), "a.ts", original);
  // A file squatting on the module directory name makes the write fail.
  std::fs::write(dir.path().join("__sql__"), "in the way").unwrap();

  let config = Config {
    placement: WritePlacement::SiblingDir("__sql__".to_string()),
    ..test_config(dir.path())
  };
  let oracle = MockOracle::default().columns("select 1 as a", &[("a", "integer")]);
  let orchestrator = Orchestrator::new(config, oracle, MockCatalog::default());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
  assert_eq!(stats.files_changed, 0);
  assert!(
    stats
      .diagnostics
      .iter()
      .any(|d| d.level == Level::Error && d.message.contains("could not write queries module"))
  );
}

#[tokio::test]
async fn renamed_imports_are_recognized() {
  let dir = TempDir::new().unwrap();
  let path = write_file(
    dir.path(),
    "index.ts",
    "import {sql as db} from 'slonik'\n\nexport default db`select 1 as a`\n",
  );

  let oracle = MockOracle::default().columns("select 1 as a", &[("a", "integer")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, MockCatalog::default());
  orchestrator.run().await.unwrap();

  let text = std::fs::read_to_string(&path).unwrap();
  assert!(text.contains("db<queries.A>`select 1 as a`"));
}

#[tokio::test]
async fn excluded_directories_are_never_scanned() {
  let dir = TempDir::new().unwrap();
  let source = "import {sql} from 'slonik'\n\nexport default sql`select 1 as a`\n";
  let excluded = write_file(dir.path(), "node_modules/dep/index.ts", source);
  let included = write_file(dir.path(), "src/index.ts", source);

  let oracle = MockOracle::default().columns("select 1 as a", &[("a", "integer")]);
  let orchestrator = Orchestrator::new(test_config(dir.path()), oracle, MockCatalog::default());
  let stats = orchestrator.run().await.unwrap();

  assert_eq!(stats.files_scanned, 1);
  assert_eq!(std::fs::read_to_string(&excluded).unwrap(), source);
  assert!(std::fs::read_to_string(&included).unwrap().contains("sql<queries.A>"));
}
