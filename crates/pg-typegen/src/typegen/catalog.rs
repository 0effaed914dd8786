//! Table and column metadata from the system catalogs.
//!
//! The oracle only yields labels and regtypes; nullability, column comments,
//! table projections and enum variants all come from here. Results are
//! cached per run since the same tables recur across many queries.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("catalog query failed: {0}")]
  Query(#[from] sqlx::Error),
}

/// A table the database could resolve, with its columns in attnum order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdentity {
  /// `schema.name`, always qualified.
  pub qualified: String,
  pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMeta {
  pub not_null: bool,
  pub comment: Option<String>,
}

pub trait SchemaCatalog {
  /// Resolves a possibly-unqualified table name through the connection's
  /// search path. None when the name does not name a relation.
  fn resolve_table(&self, name: &str) -> impl Future<Output = Result<Option<TableIdentity>, CatalogError>>;

  fn column_meta(
    &self,
    qualified_table: &str,
    column: &str,
  ) -> impl Future<Output = Result<Option<ColumnMeta>, CatalogError>>;

  /// Variant labels for an enum type, in sort order. None for non-enums.
  fn enum_labels(&self, regtype: &str) -> impl Future<Output = Result<Option<Vec<String>>, CatalogError>>;
}

#[derive(Debug, Default)]
struct CatalogCache {
  tables: HashMap<String, Option<TableIdentity>>,
  columns: HashMap<(String, String), Option<ColumnMeta>>,
  enums: HashMap<String, Option<Vec<String>>>,
}

#[derive(Debug, Clone)]
pub struct PgCatalog {
  pool: PgPool,
  cache: Arc<Mutex<CatalogCache>>,
}

impl PgCatalog {
  pub fn new(pool: PgPool) -> Self {
    Self { pool, cache: Arc::new(Mutex::new(CatalogCache::default())) }
  }
}

impl SchemaCatalog for PgCatalog {
  async fn resolve_table(&self, name: &str) -> Result<Option<TableIdentity>, CatalogError> {
    if let Some(hit) = self.cache.lock().unwrap().tables.get(name) {
      return Ok(hit.clone());
    }

    // to_regclass honors the search path and quoting rules for us.
    let row = sqlx::query(
      r"
      select n.nspname as schema, c.relname as name
      from pg_class c
      join pg_namespace n on n.oid = c.relnamespace
      where c.oid = to_regclass($1)
      ",
    )
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;

    let identity = match row {
      None => None,
      Some(row) => {
        let schema: String = row.try_get("schema")?;
        let table: String = row.try_get("name")?;
        let qualified = format!("{schema}.{table}");
        let columns = sqlx::query(
          r"
          select attname
          from pg_attribute
          where attrelid = to_regclass($1) and attnum > 0 and not attisdropped
          order by attnum
          ",
        )
        .bind(&qualified)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String, _>("attname"))
        .collect::<Result<Vec<_>, _>>()?;
        Some(TableIdentity { qualified, columns })
      }
    };

    self.cache.lock().unwrap().tables.insert(name.to_string(), identity.clone());
    Ok(identity)
  }

  async fn column_meta(&self, qualified_table: &str, column: &str) -> Result<Option<ColumnMeta>, CatalogError> {
    let key = (qualified_table.to_string(), column.to_string());
    if let Some(hit) = self.cache.lock().unwrap().columns.get(&key) {
      return Ok(hit.clone());
    }

    let row = sqlx::query(
      r"
      select a.attnotnull as not_null, col_description(a.attrelid, a.attnum) as comment
      from pg_attribute a
      where a.attrelid = to_regclass($1) and a.attname = $2 and a.attnum > 0 and not a.attisdropped
      ",
    )
    .bind(qualified_table)
    .bind(column)
    .fetch_optional(&self.pool)
    .await?;

    let meta = match row {
      None => None,
      Some(row) => Some(ColumnMeta { not_null: row.try_get("not_null")?, comment: row.try_get("comment")? }),
    };

    self.cache.lock().unwrap().columns.insert(key, meta.clone());
    Ok(meta)
  }

  async fn enum_labels(&self, regtype: &str) -> Result<Option<Vec<String>>, CatalogError> {
    let (base, _is_array) = crate::typegen::pgtypes::base_regtype(regtype);
    if let Some(hit) = self.cache.lock().unwrap().enums.get(&base) {
      return Ok(hit.clone());
    }

    let rows = sqlx::query(
      r"
      select e.enumlabel
      from pg_enum e
      where e.enumtypid = to_regtype($1)
      order by e.enumsortorder
      ",
    )
    .bind(&base)
    .fetch_all(&self.pool)
    .await?;

    let labels = if rows.is_empty() {
      None
    } else {
      Some(
        rows
          .into_iter()
          .map(|row| row.try_get::<String, _>("enumlabel"))
          .collect::<Result<Vec<_>, _>>()?,
      )
    };

    self.cache.lock().unwrap().enums.insert(base, labels.clone());
    Ok(labels)
  }
}
