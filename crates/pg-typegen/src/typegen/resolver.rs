//! Turns described columns into named, deduplicated generated types.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::typegen::{
  model::{ColumnDescriptor, DeclarationBlock, FieldDescriptor, GeneratedType, ShapeKey, TypeShape},
  naming,
};

/// Every void statement in a file shares this one marker type.
pub const VOID_TYPE_NAME: &str = "_void";

/// What the resolver needs to know about the (single) source table in order
/// to derive a table-based name.
#[derive(Debug, Clone)]
pub struct TableNaming {
  /// Unqualified relation name, e.g. `test_table`.
  pub short_name: String,
  /// Full column list in definition order, for full-projection detection.
  pub columns: Vec<String>,
}

/// Collapses duplicate output labels into single fields, keeping first
/// appearance order. `select 1 as a, 'two' as a` yields one field `a` with
/// two candidates.
pub fn merge_fields(columns: Vec<ColumnDescriptor>) -> Vec<FieldDescriptor> {
  let mut fields: IndexMap<String, FieldDescriptor> = IndexMap::new();
  for column in columns {
    match fields.get_mut(&column.label) {
      Some(field) => field.candidates.push(column),
      None => {
        fields.insert(column.label.clone(), FieldDescriptor::single(column));
      }
    }
  }
  fields.into_values().collect()
}

/// Derives the base type name, before collision suffixing.
///
/// Priority: full projection uses just the table name; a single-table subset
/// prefixes the table onto the labels; otherwise labels alone; statements
/// with no usable labels fall back to a content hash. A non-identifier label
/// (like `?column?`) disqualifies the table prefix.
pub fn derive_name(shape: &TypeShape, table: Option<&TableNaming>, normalized: &str) -> String {
  let fields = match shape {
    TypeShape::Void => return VOID_TYPE_NAME.to_string(),
    TypeShape::Unresolved => return naming::anonymous_name(normalized),
    TypeShape::Fields(fields) => fields,
  };
  if fields.is_empty() {
    return naming::anonymous_name(normalized);
  }

  // Names reflect every described column, so duplicate labels show up twice
  // even though the rendered field merges them.
  let labels: Vec<&str> =
    fields.iter().flat_map(|f| f.candidates.iter().map(|c| c.label.as_str())).collect();
  let all_identifiers = labels.iter().all(|l| naming::is_identifier(l));

  if all_identifiers {
    if let Some(table) = table {
      if labels == table.columns.iter().map(String::as_str).collect::<Vec<_>>() {
        return naming::table_part(&table.short_name);
      }
      let mut name = naming::table_part(&table.short_name);
      for label in &labels {
        name.push('_');
        name.push_str(&naming::label_part(label));
      }
      return name;
    }
  }

  let joined = labels.iter().map(|l| naming::label_part(l)).collect::<Vec<_>>().join("_");
  if joined.is_empty() {
    naming::anonymous_name(normalized)
  } else {
    naming::capitalize(&joined)
  }
}

/// Per-file registry of generated types, keyed by structural shape.
/// First appearance fixes both the name and the position in the block.
#[derive(Debug, Default)]
pub struct TypeRegistry {
  types: IndexMap<ShapeKey, GeneratedType>,
  used_names: BTreeSet<String>,
}

impl TypeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers one resolved query, returning the (possibly pre-existing)
  /// type name to annotate the tag with. `Unresolved` shapes return None
  /// and leave no trace in the block.
  pub fn register(&mut self, shape: TypeShape, table: Option<&TableNaming>, normalized: &str) -> Option<String> {
    let key = ShapeKey::of(&shape)?;

    if let Some(existing) = self.types.get_mut(&key) {
      existing.queries.insert(normalized.to_string());
      return Some(existing.name.clone());
    }

    let base = derive_name(&shape, table, normalized);
    let name = naming::ensure_unique(&base, &self.used_names);
    self.used_names.insert(name.clone());

    let warnings = duplicate_label_warnings(&shape);
    let mut queries = BTreeSet::new();
    queries.insert(normalized.to_string());
    self.types.insert(key, GeneratedType { name: name.clone(), shape, queries, warnings });
    Some(name)
  }

  pub fn is_empty(&self) -> bool {
    self.types.is_empty()
  }

  /// Warnings attached to registered types, in registration order.
  pub fn warnings(&self) -> impl Iterator<Item = &str> {
    self.types.values().flat_map(|t| t.warnings.iter().map(String::as_str))
  }

  pub fn into_block(self) -> DeclarationBlock {
    DeclarationBlock { types: self.types.into_values().collect() }
  }
}

fn duplicate_label_warnings(shape: &TypeShape) -> Vec<String> {
  let TypeShape::Fields(fields) = shape else { return Vec::new() };
  fields
    .iter()
    .filter(|f| f.candidates.len() > 1)
    .map(|f| format!("Warning: {} columns detected for field {}!", f.candidates.len(), f.label))
    .collect()
}
