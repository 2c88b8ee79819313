use sqlx::any::{AnyArguments, AnyRow};
use sqlx::{Arguments, Row};

use crate::error::Error;

/// A dynamically-typed column value bound through `sqlx::Any`.
///
/// Every codec registered through [`crate::registry`] serializes to and
/// deserializes from this enum, so the rest of the engine never has to know
/// which concrete Rust type a field started life as.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A stable textual form used to build query-cache fingerprints (§4.10) and
    /// `Set`-collection uniqueness comparisons (§4.9).
    pub fn fingerprint(&self) -> String {
        match self {
            Value::Null => "∅".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::I64(i) => format!("i:{i}"),
            Value::F64(f) => format!("f:{f}"),
            Value::Str(s) => format!("s:{s}"),
            Value::Bytes(b) => format!("x:{}", hex_encode(b)),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Declares how a column's raw SQL value maps back onto a `Value` variant.
/// Needed because `sqlx::Any`'s `AnyRow` does not introspect column types for
/// us — the entity descriptor (C2) carries this alongside every column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    I64,
    F64,
    Str,
    Bytes,
    /// Stored as `I64`, rehydrated as an enum variant index (§4.1).
    IndexedEnum,
}

impl ColumnKind {
    pub fn decode(self, row: &AnyRow, column_name: &str) -> Result<Value, Error> {
        let ordinal = row
            .columns()
            .iter()
            .position(|c| c.name() == column_name);
        if ordinal.is_none() {
            return Ok(Value::Null);
        }
        match self {
            ColumnKind::Bool => {
                let v: Option<i64> = row.try_get(column_name).map_err(Error::Database)?;
                Ok(v.map(|n| Value::Bool(n != 0)).unwrap_or(Value::Null))
            }
            ColumnKind::I64 | ColumnKind::IndexedEnum => {
                let v: Option<i64> = row.try_get(column_name).map_err(Error::Database)?;
                Ok(v.map(Value::I64).unwrap_or(Value::Null))
            }
            ColumnKind::F64 => {
                let v: Option<f64> = row.try_get(column_name).map_err(Error::Database)?;
                Ok(v.map(Value::F64).unwrap_or(Value::Null))
            }
            ColumnKind::Str => {
                let v: Option<String> = row.try_get(column_name).map_err(Error::Database)?;
                Ok(v.map(Value::Str).unwrap_or(Value::Null))
            }
            ColumnKind::Bytes => {
                let v: Option<Vec<u8>> = row.try_get(column_name).map_err(Error::Database)?;
                Ok(v.map(Value::Bytes).unwrap_or(Value::Null))
            }
        }
    }
}

/// Appends `values` to a fresh set of `sqlx::Any` bind arguments, in order.
pub fn bind_arguments(values: &[Value]) -> Result<AnyArguments<'static>, Error> {
    let mut args = AnyArguments::default();
    for v in values {
        match v {
            Value::Null => args.add(Option::<i64>::None).map_err(Error::Database)?,
            Value::Bool(b) => args.add(*b as i64).map_err(Error::Database)?,
            Value::I64(i) => args.add(*i).map_err(Error::Database)?,
            Value::F64(f) => args.add(*f).map_err(Error::Database)?,
            Value::Str(s) => args.add(s.clone()).map_err(Error::Database)?,
            Value::Bytes(b) => args.add(b.clone()).map_err(Error::Database)?,
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_distinguishes_type_not_just_textual_form() {
        // §4.10's query-cache key leans on this: "1" the string and 1 the
        // integer must not collide just because they stringify the same.
        assert_ne!(Value::Str("1".into()).fingerprint(), Value::I64(1).fingerprint());
        assert_ne!(Value::Bool(true).fingerprint(), Value::I64(1).fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_for_equal_values() {
        assert_eq!(Value::Str("lobby".into()).fingerprint(), Value::Str("lobby".into()).fingerprint());
        assert_eq!(Value::Bytes(vec![1, 2, 3]).fingerprint(), Value::Bytes(vec![1, 2, 3]).fingerprint());
    }

    #[test]
    fn as_i64_coerces_bool_but_not_string() {
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::Bool(false).as_i64(), Some(0));
        assert_eq!(Value::Str("3".into()).as_i64(), None);
    }

    #[test]
    fn as_str_only_matches_str_variant() {
        assert_eq!(Value::Str("hi".into()).as_str(), Some("hi"));
        assert_eq!(Value::I64(1).as_str(), None);
    }
}
