//! SQL result row to record conversion.
//!
//! Decoding happens in two steps. Each cell is first scanned into a
//! nullable holder chosen from the column's declared kind; a cell that
//! cannot be scanned fails the whole row. Holders are then filled into
//! the destination fields. Composite and pointer payloads that fail to
//! decode are logged and leave their field untouched.

use crate::catalog::{ColumnSpec, FieldCatalog};
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::record::{FieldError, FieldValue, Record};
use crate::types::{TypeKind, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Nullable scan target for one result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Holder {
    String(Option<String>),
    Bool(Option<bool>),
    Float(Option<f64>),
    Int(Option<i64>),
    Time(Option<DateTime<Utc>>),
    /// Untyped payload for binary and composite columns. Empty when NULL.
    Raw(Vec<u8>),
}

impl Holder {
    /// Scan `cell` into the holder selected by the column kind.
    pub fn scan(spec: &ColumnSpec, policy: &Policy, cell: &Value) -> Result<Self> {
        let column = spec.column.as_str();
        let mismatch = |expected: &str| Error::type_mismatch(column, expected, format!("{:?}", cell));

        let holder = match &spec.kind {
            TypeKind::String => Holder::String(match cell {
                Value::Null => None,
                Value::Text(s) => Some(s.clone()),
                Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
                Value::Timestamp(ts) => Some(ts.to_rfc3339()),
                other => Some(other.to_string()),
            }),
            TypeKind::Bool => Holder::Bool(match cell {
                Value::Null => None,
                Value::Bool(b) => Some(*b),
                Value::Int(0) => Some(false),
                Value::Int(1) => Some(true),
                other => Some(
                    other
                        .as_str()
                        .and_then(parse_bool)
                        .ok_or_else(|| mismatch("Bool"))?,
                ),
            }),
            TypeKind::Float => Holder::Float(match cell {
                Value::Null => None,
                other => Some(
                    other
                        .to_f64()
                        .or_else(|| other.as_str().and_then(|s| s.trim().parse().ok()))
                        .ok_or_else(|| mismatch("Float"))?,
                ),
            }),
            TypeKind::Int if policy.is_date_time(column) => Holder::Time(match cell {
                Value::Null => None,
                Value::Timestamp(ts) => Some(*ts),
                other => Some(
                    other
                        .as_str()
                        .and_then(parse_date_time)
                        .ok_or_else(|| mismatch("Timestamp"))?,
                ),
            }),
            TypeKind::Int => Holder::Int(match cell {
                Value::Null => None,
                Value::Float(n) => Some(float_to_i64(*n).ok_or_else(|| mismatch("Int"))?),
                other => Some(
                    other
                        .to_i64()
                        .or_else(|| other.as_str().and_then(|s| s.trim().parse().ok()))
                        .ok_or_else(|| mismatch("Int"))?,
                ),
            }),
            TypeKind::Bytes | TypeKind::Composite(_) => Holder::Raw(match cell {
                Value::Null => Vec::new(),
                Value::Bytes(b) => b.clone(),
                Value::Text(s) => s.as_bytes().to_vec(),
                Value::Timestamp(ts) => ts.to_rfc3339().into_bytes(),
                other => other.to_string().into_bytes(),
            }),
        };
        Ok(holder)
    }
}

/// Whole float inside the i64 range.
fn float_to_i64(n: f64) -> Option<i64> {
    // 2^63 is exactly representable and is the first value past i64::MAX.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if n.fract() != 0.0 || !(-LIMIT..LIMIT).contains(&n) {
        return None;
    }
    Some(n as i64)
}

/// Parse a boolean the way SQL drivers render them.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse a textual timestamp, treating zone-less values as UTC.
fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Decode a non-empty pointer or composite payload into a value of `kind`.
pub fn decode_payload(kind: &TypeKind, payload: &[u8]) -> std::result::Result<FieldValue, String> {
    let text = || String::from_utf8_lossy(payload);
    match kind {
        TypeKind::String => match serde_json::from_slice::<String>(payload) {
            Ok(s) => Ok(FieldValue::String(s)),
            Err(_) => Ok(FieldValue::String(text().into_owned())),
        },
        TypeKind::Bool => parse_bool(&text())
            .map(FieldValue::Bool)
            .ok_or_else(|| format!("invalid bool {:?}", text())),
        TypeKind::Int => text()
            .trim()
            .parse()
            .map(FieldValue::Int)
            .map_err(|e| format!("invalid integer {:?}: {}", text(), e)),
        TypeKind::Float => text()
            .trim()
            .parse()
            .map(FieldValue::Float)
            .map_err(|e| format!("invalid float {:?}: {}", text(), e)),
        TypeKind::Bytes => Ok(FieldValue::Bytes(payload.to_vec())),
        TypeKind::Composite(_) => match kind.pointee() {
            Some(_) if std::str::from_utf8(payload).map(str::trim) == Ok("null") => {
                Ok(FieldValue::Composite(serde_json::Value::Null))
            }
            Some(inner) => decode_payload(inner, payload),
            None => serde_json::from_slice(payload)
                .map(FieldValue::Composite)
                .map_err(|e| e.to_string()),
        },
    }
}

/// Converts result rows into record fields.
#[derive(Debug, Clone, Copy)]
pub struct ValueDecoder<'a> {
    catalog: &'a FieldCatalog,
    policy: &'a Policy,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(catalog: &'a FieldCatalog, policy: &'a Policy) -> Self {
        Self { catalog, policy }
    }

    /// Scan `cells` and fill `dest`.
    ///
    /// Cells are aligned with the catalog columns. Scan failures and
    /// missing fields fail the row; composite decode failures do not.
    pub fn decode<R: Record>(&self, cells: &[Value], dest: &mut R) -> Result<()> {
        let columns = self.catalog.columns();
        if cells.len() != columns.len() {
            return Err(Error::ColumnCount {
                expected: columns.len(),
                actual: cells.len(),
            });
        }

        let holders = columns
            .iter()
            .zip(cells)
            .map(|(spec, cell)| Holder::scan(spec, self.policy, cell))
            .collect::<Result<Vec<_>>>()?;

        for (spec, holder) in columns.iter().zip(holders) {
            self.fill(dest, spec, holder)?;
        }
        Ok(())
    }

    fn fill<R: Record>(&self, dest: &mut R, spec: &ColumnSpec, holder: Holder) -> Result<()> {
        let column = spec.column.as_str();
        let field = dest.field_mut(spec.source_field).ok_or_else(|| {
            Error::invalid_destination(format!(
                "destination has no field {} for column {}",
                spec.source_field, column
            ))
        })?;

        let value = match holder {
            Holder::String(v) => FieldValue::String(v.unwrap_or_default()),
            Holder::Bool(v) => FieldValue::Bool(v.unwrap_or_default()),
            Holder::Float(v) => FieldValue::Float(v.unwrap_or_default()),
            Holder::Int(v) => FieldValue::Int(v.unwrap_or_default()),
            Holder::Time(None) => return Ok(()),
            Holder::Time(Some(ts)) => {
                FieldValue::Int(self.policy.date_time_unit.to_timestamp(ts)?)
            }
            Holder::Raw(raw) if spec.kind == TypeKind::Bytes => FieldValue::Bytes(raw),
            Holder::Raw(raw) if raw.is_empty() => return Ok(()),
            Holder::Raw(raw) => match decode_payload(&spec.kind, &raw) {
                Ok(value) => value,
                Err(message) => {
                    skip_field(column, &message);
                    return Ok(());
                }
            },
        };

        match field.set_value(value) {
            Ok(()) => Ok(()),
            Err(err @ FieldError::Json(_)) => {
                skip_field(column, &err.to_string());
                Ok(())
            }
            Err(err) if spec.kind.is_composite() => {
                skip_field(column, &err.to_string());
                Ok(())
            }
            Err(err) => Err(Error::type_mismatch(column, spec.kind.to_string(), err.to_string())),
        }
    }
}

fn skip_field(column: &str, message: &str) {
    let err = Error::decode(column, message);
    tracing::warn!(
        target: "sqltool::decode",
        column,
        error = %err,
        "Leaving field unchanged"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ActionMode;
    use crate::policy::{DateTimeUnit, Opt};
    use crate::record::{Field, Json};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Obj {
        sub_field: String,
    }

    #[derive(Debug, Default)]
    struct Sample {
        id: i64,
        created_at: i64,
        username: String,
        active: bool,
        ratio: f64,
        avatar: Vec<u8>,
        obj: Json<Obj>,
        ptr: Option<bool>,
        name_ptr: Option<String>,
        map: HashMap<String, Option<String>>,
        slice: Vec<Option<i64>>,
    }

    crate::record!(Sample {
        id => "id",
        created_at => "created_at",
        username => "username",
        active => "active",
        ratio => "ratio",
        avatar => "avatar",
        obj => "obj",
        ptr => "ptr",
        name_ptr => "name_ptr",
        map => "map",
        slice => "slice",
    });

    fn select_catalog(policy: &Policy) -> FieldCatalog {
        FieldCatalog::build(Sample::identity(), &Sample::fields(), policy, ActionMode::Select)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_decode_full_row() {
        let mut policy = Policy::default();
        Opt::date_time_columns(["created_at"]).apply(&mut policy);
        Opt::date_time_unit(DateTimeUnit::Seconds).apply(&mut policy);
        let catalog = select_catalog(&policy);

        let cells = vec![
            Value::Int(1),
            text("2023-03-30 23:57:48"),
            text("sample"),
            Value::Int(1),
            text("0.25"),
            Value::Bytes(vec![0, 1, 2]),
            text(r#"{"sub_field":"abc"}"#),
            text("true"),
            text(r#""ann""#),
            text(r#"{"a":"b"}"#),
            text("[1,3]"),
        ];
        let mut dest = Sample::default();
        ValueDecoder::new(&catalog, &policy)
            .decode(&cells, &mut dest)
            .unwrap();

        assert_eq!(dest.id, 1);
        assert_eq!(dest.created_at, 1_680_220_668);
        assert_eq!(dest.username, "sample");
        assert!(dest.active);
        assert_eq!(dest.ratio, 0.25);
        assert_eq!(dest.avatar, vec![0, 1, 2]);
        assert_eq!(dest.obj.sub_field, "abc");
        assert_eq!(dest.ptr, Some(true));
        assert_eq!(dest.name_ptr.as_deref(), Some("ann"));
        assert_eq!(dest.map.get("a"), Some(&Some("b".to_string())));
        assert_eq!(dest.slice, vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_nulls_leave_zero_or_unset() {
        let mut policy = Policy::default();
        Opt::date_time_columns(["created_at"]).apply(&mut policy);
        let catalog = select_catalog(&policy);

        let cells = vec![Value::Null; 11];
        let mut dest = Sample {
            created_at: 5,
            username: "stale".into(),
            ptr: Some(false),
            ..Default::default()
        };
        ValueDecoder::new(&catalog, &policy)
            .decode(&cells, &mut dest)
            .unwrap();

        assert_eq!(dest.username, "");
        assert_eq!(dest.created_at, 5);
        assert_eq!(dest.ptr, Some(false));
        assert!(dest.avatar.is_empty());
        assert!(dest.map.is_empty());
    }

    #[test]
    fn test_bad_composite_is_skipped() {
        let policy = Policy::default();
        let catalog = select_catalog(&policy);

        let mut cells = vec![Value::Null; 11];
        cells[2] = text("kept");
        cells[9] = text("{not json");
        cells[10] = text(r#"{"a":1}"#);
        let mut dest = Sample {
            slice: vec![Some(9)],
            ..Default::default()
        };
        ValueDecoder::new(&catalog, &policy)
            .decode(&cells, &mut dest)
            .unwrap();

        assert_eq!(dest.username, "kept");
        assert!(dest.map.is_empty());
        assert_eq!(dest.slice, vec![Some(9)]);
    }

    #[test]
    fn test_scan_mismatch_fails_row() {
        let policy = Policy::default();
        let catalog = select_catalog(&policy);

        let mut cells = vec![Value::Null; 11];
        cells[0] = text("not-a-number");
        let err = ValueDecoder::new(&catalog, &policy)
            .decode(&cells, &mut Sample::default())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_column_count_mismatch() {
        let policy = Policy::default();
        let catalog = select_catalog(&policy);
        let err = ValueDecoder::new(&catalog, &policy)
            .decode(&[Value::Int(1)], &mut Sample::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ColumnCount {
                expected: 11,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_parse_date_time_forms() {
        let expected = DateTime::from_timestamp(1_680_220_668, 348_585_000).unwrap();
        assert_eq!(parse_date_time("2023-03-30 23:57:48.348585"), Some(expected));
        assert_eq!(parse_date_time("2023-03-30T23:57:48.348585"), Some(expected));
        assert_eq!(parse_date_time("2023-03-30T23:57:48.348585Z"), Some(expected));
        assert_eq!(
            parse_date_time("2023-03-31T06:57:48.348585+07:00"),
            Some(expected)
        );
        assert!(parse_date_time("2023-03-30").is_some());
        assert_eq!(parse_date_time("yesterday"), None);
    }

    #[test]
    fn test_float_outside_int_range_is_mismatch() {
        let policy = Policy::default();
        let catalog = select_catalog(&policy);

        let mut cells = vec![Value::Null; 11];
        cells[0] = Value::Float(1e19);
        let err = ValueDecoder::new(&catalog, &policy)
            .decode(&cells, &mut Sample::default())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref column, .. } if column == "id"));

        cells[0] = Value::Float(-9_223_372_036_854_775_808.0);
        let mut dest = Sample::default();
        ValueDecoder::new(&catalog, &policy)
            .decode(&cells, &mut dest)
            .unwrap();
        assert_eq!(dest.id, i64::MIN);
    }

    #[test]
    fn test_null_payload_for_pointers() {
        let nested = TypeKind::pointer(TypeKind::pointer(TypeKind::String));
        assert_eq!(
            decode_payload(&nested, b"null"),
            Ok(FieldValue::Composite(serde_json::Value::Null))
        );

        let mut field: Option<Option<String>> = None;
        field.set_value(decode_payload(&nested, b"null").unwrap()).unwrap();
        assert_eq!(field, Some(None));
    }

    #[test]
    fn test_decode_payload_pointer_chain() {
        let kind = TypeKind::pointer(TypeKind::pointer(TypeKind::Int));
        assert_eq!(decode_payload(&kind, b"42"), Ok(FieldValue::Int(42)));
        assert!(decode_payload(&TypeKind::Bool, b"maybe").is_err());
        assert_eq!(
            decode_payload(&TypeKind::String, b"plain"),
            Ok(FieldValue::String("plain".into()))
        );
    }
}
