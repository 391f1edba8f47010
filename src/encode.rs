//! Record to SQL parameter conversion.
//!
//! The encoder walks the catalog in order and produces one [`Value`] per
//! non-serial column. Policy is applied in a fixed order: nullable zero
//! values, then datetime handling, then kind-specific conversion.

use crate::catalog::{ActionMode, ColumnSpec, FieldCatalog};
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::record::{FieldValue, Record};
use crate::types::{TypeKind, Value};
use chrono::{DateTime, Utc};

/// Converts record fields into positional SQL parameters.
#[derive(Debug, Clone, Copy)]
pub struct ValueEncoder<'a> {
    catalog: &'a FieldCatalog,
    policy: &'a Policy,
    mode: ActionMode,
    now: DateTime<Utc>,
}

impl<'a> ValueEncoder<'a> {
    /// Create an encoder stamping auto-timestamp columns with `now`.
    pub fn new(
        catalog: &'a FieldCatalog,
        policy: &'a Policy,
        mode: ActionMode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            catalog,
            policy,
            mode,
            now,
        }
    }

    /// Columns the encoded parameters bind to, in parameter order.
    pub fn column_names(&self) -> Vec<&'a str> {
        self.written()
            .map(|spec| spec.column.as_str())
            .collect()
    }

    fn written(&self) -> impl Iterator<Item = &'a ColumnSpec> + 'a {
        let (catalog, policy) = (self.catalog, self.policy);
        catalog
            .columns()
            .iter()
            .filter(move |spec| !policy.is_serial(&spec.column))
    }

    /// Encode `record` into parameters aligned with [`column_names`](Self::column_names).
    ///
    /// A composite serialization failure fails the whole call.
    pub fn encode<R: Record>(&self, record: &R) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.catalog.len());
        for spec in self.written() {
            values.push(self.encode_column(record, spec)?);
        }
        Ok(values)
    }

    fn encode_column<R: Record>(&self, record: &R, spec: &ColumnSpec) -> Result<Value> {
        let column = spec.column.as_str();
        let field = record.field(spec.source_field).ok_or_else(|| {
            Error::invalid_destination(format!(
                "record has no field {} for column {}",
                spec.source_field, column
            ))
        })?;
        let is_zero = field.is_zero();

        if is_zero && self.policy.is_nullable(column) {
            return Ok(Value::Null);
        }

        let value = field.to_value().map_err(|source| Error::Encode {
            column: column.to_string(),
            source,
        })?;

        if self.policy.is_date_time(column) {
            return self.encode_date_time(column, value, is_zero);
        }

        match &spec.kind {
            TypeKind::Bytes => Ok(scalar(value)),
            TypeKind::Composite(_) => match value {
                _ if is_zero => Ok(Value::Null),
                // Pointers to raw binary keep their bytes.
                FieldValue::Bytes(b) => Ok(Value::Bytes(b)),
                other => serde_json::to_vec(&other.into_json())
                    .map(Value::Bytes)
                    .map_err(|source| Error::Encode {
                        column: column.to_string(),
                        source,
                    }),
            },
            _ => Ok(scalar(value)),
        }
    }

    fn encode_date_time(&self, column: &str, value: FieldValue, is_zero: bool) -> Result<Value> {
        if self.policy.auto_create_columns.contains(column) && self.mode == ActionMode::Insert {
            return Ok(Value::Timestamp(self.now));
        }
        if self.policy.auto_update_columns.contains(column) && self.mode.is_write() {
            return Ok(Value::Timestamp(self.now));
        }
        if is_zero {
            return Ok(Value::Null);
        }
        match value {
            FieldValue::Int(ts) => Ok(Value::Timestamp(self.policy.date_time_unit.to_datetime(ts)?)),
            other => Err(Error::type_mismatch(column, "Int", format!("{:?}", other))),
        }
    }
}

fn scalar(value: FieldValue) -> Value {
    match value {
        FieldValue::String(s) => Value::Text(s),
        FieldValue::Bool(b) => Value::Bool(b),
        FieldValue::Int(n) => Value::Int(n),
        FieldValue::Float(n) => Value::Float(n),
        FieldValue::Bytes(b) => Value::Bytes(b),
        FieldValue::Composite(json) => Value::Text(json.to_string()),
    }
}
