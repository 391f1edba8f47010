//! Column catalog derived from a record type's field annotations.

use crate::policy::Policy;
use crate::record::{FieldDescriptor, RecordTypeIdentity};
use crate::types::TypeKind;
use std::collections::HashMap;
use std::fmt;

/// Operation the session is preparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionMode {
    Insert,
    Select,
    Update,
    Delete,
}

impl ActionMode {
    /// Check if this mode writes field values.
    pub fn is_write(self) -> bool {
        matches!(self, ActionMode::Insert | ActionMode::Update)
    }
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionMode::Insert => "insert",
            ActionMode::Select => "select",
            ActionMode::Update => "update",
            ActionMode::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Binding of one database column to one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub column: String,
    /// Rust field identifier.
    pub source_field: &'static str,
    /// Declared kind of the field.
    pub kind: TypeKind,
}

/// Extract the column name from an annotation.
///
/// Returns `None` when the annotation is empty or its first token is `-`.
/// Flags after the first comma are accepted and ignored.
pub fn parse_annotation(annotation: &str) -> Option<&str> {
    let column = annotation
        .split(',')
        .map(str::trim)
        .find(|token| !token.is_empty())?;
    if column == "-" {
        return None;
    }
    Some(column)
}

/// Check if `column` is left out of the catalog for `mode`.
///
/// Auto-timestamp columns are kept while they are being stamped, even when
/// listed in the ignore set.
pub fn is_excluded(policy: &Policy, mode: ActionMode, column: &str) -> bool {
    if policy.auto_create_columns.contains(column) && mode == ActionMode::Insert {
        return false;
    }
    if policy.auto_update_columns.contains(column) && mode.is_write() {
        return false;
    }
    if policy.ignore_columns.contains(column) {
        return true;
    }
    policy.is_serial(column) && mode.is_write()
}

/// Ordered column metadata for one record type, policy and mode.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    identity: RecordTypeIdentity,
    mode: ActionMode,
    columns: Vec<ColumnSpec>,
    by_column: HashMap<String, usize>,
}

impl FieldCatalog {
    /// Build the catalog from field descriptors in declaration order.
    pub fn build(
        identity: RecordTypeIdentity,
        fields: &[FieldDescriptor],
        policy: &Policy,
        mode: ActionMode,
    ) -> Self {
        let mut columns = Vec::with_capacity(fields.len());
        let mut by_column = HashMap::with_capacity(fields.len());

        for field in fields {
            let Some(column) = parse_annotation(field.annotation) else {
                continue;
            };
            if is_excluded(policy, mode, column) {
                continue;
            }
            by_column.insert(column.to_string(), columns.len());
            columns.push(ColumnSpec {
                column: column.to_string(),
                source_field: field.name,
                kind: field.kind.clone(),
            });
        }

        tracing::debug!(
            target: "sqltool::catalog",
            record = identity.type_name,
            %mode,
            columns = columns.len(),
            "Built column catalog"
        );

        Self {
            identity,
            mode,
            columns,
            by_column,
        }
    }

    /// Identity of the record type this catalog describes.
    pub fn identity(&self) -> RecordTypeIdentity {
        self.identity
    }

    /// Mode the catalog was built for.
    pub fn mode(&self) -> ActionMode {
        self.mode
    }

    /// Column specs in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column.as_str()).collect()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Field identifier bound to `column`.
    pub fn field_name(&self, column: &str) -> Option<&'static str> {
        self.spec(column).map(|c| c.source_field)
    }

    /// Declared kind of `column`.
    pub fn kind(&self, column: &str) -> Option<&TypeKind> {
        self.spec(column).map(|c| &c.kind)
    }

    fn spec(&self, column: &str) -> Option<&ColumnSpec> {
        self.by_column.get(column).map(|&idx| &self.columns[idx])
    }
}
