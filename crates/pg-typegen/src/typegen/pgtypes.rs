/// Mapping from PostgreSQL regtype names to the TypeScript-facing types used
/// in generated declarations.
///
/// The regtype arrives verbatim from the oracle, e.g. `character varying(1)`
/// or `text[]`; modifiers are stripped and array suffixes recurse on the
/// element type. Types with no mapping fall back to `unknown`, which also
/// absorbs nullability.

/// Splits a regtype into its base name (modifiers stripped) and whether it
/// is an array type.
pub fn base_regtype(regtype: &str) -> (String, bool) {
  let trimmed = regtype.trim();
  if let Some(element) = trimmed.strip_suffix("[]") {
    return (base_regtype(element).0, true);
  }
  let without_modifier = match trimmed.find('(') {
    Some(open) => {
      let close = trimmed.rfind(')').unwrap_or(trimmed.len() - 1);
      let tail = &trimmed[close + 1..];
      format!("{}{}", trimmed[..open].trim_end(), tail)
    }
    None => trimmed.to_string(),
  };
  (without_modifier, false)
}

fn scalar_ts_type(base: &str) -> Option<&'static str> {
  let ts = match base {
    "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" | "numeric" | "decimal" | "real"
    | "float4" | "double precision" | "float8" | "oid" => "number",
    "timestamp with time zone" | "timestamptz" | "timestamp without time zone" | "timestamp" | "date" => "number",
    "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name" | "uuid" | "citext"
    | "interval" => "string",
    "boolean" | "bool" => "boolean",
    "json" | "jsonb" | "record" => "unknown",
    "void" => "void",
    _ => return None,
  };
  Some(ts)
}

/// Resolves a regtype to its TypeScript type. Enum-typed columns render as a
/// union of their literal labels when the catalog supplied them.
pub fn ts_type(regtype: &str, enum_labels: Option<&[String]>) -> String {
  let (base, is_array) = base_regtype(regtype);

  let element = if let Some(labels) = enum_labels.filter(|l| !l.is_empty()) {
    labels.iter().map(|l| format!("'{}'", l.replace('\'', "\\'"))).collect::<Vec<_>>().join(" | ")
  } else {
    scalar_ts_type(&base).unwrap_or("unknown").to_string()
  };

  if is_array {
    if element.contains(' ') { format!("({element})[]") } else { format!("{element}[]") }
  } else {
    element
  }
}
