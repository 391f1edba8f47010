//! Declared value kinds for record fields.
//!
//! The kind is fixed when a record's column catalog is built and drives
//! every conversion between field values and SQL values.

use std::fmt;

/// Declared kind of a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Text.
    String,
    /// Boolean.
    Bool,
    /// Signed integer (widened to 64 bits on the wire).
    Int,
    /// Floating point (widened to 64 bits on the wire).
    Float,
    /// Raw binary, passed through without structured encoding.
    Bytes,
    /// Slice, struct, map or pointer, stored as a JSON payload.
    Composite(CompositeKind),
}

/// Shape of a composite field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeKind {
    /// Sequence of elements.
    Slice,
    /// Nested record-like value.
    Struct,
    /// Keyed collection.
    Map,
    /// Optional value of the boxed pointee kind.
    Pointer(Box<TypeKind>),
}

impl TypeKind {
    /// Shorthand for a pointer to `pointee`.
    pub fn pointer(pointee: TypeKind) -> Self {
        TypeKind::Composite(CompositeKind::Pointer(Box::new(pointee)))
    }

    /// Check if this kind is stored as a structured payload.
    pub fn is_composite(&self) -> bool {
        matches!(self, TypeKind::Composite(_))
    }

    /// Check if this kind is a pointer.
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeKind::Composite(CompositeKind::Pointer(_)))
    }

    /// Get the pointee kind (for pointers, `None` otherwise).
    pub fn pointee(&self) -> Option<&TypeKind> {
        match self {
            TypeKind::Composite(CompositeKind::Pointer(inner)) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::String => write!(f, "String"),
            TypeKind::Bool => write!(f, "Bool"),
            TypeKind::Int => write!(f, "Int"),
            TypeKind::Float => write!(f, "Float"),
            TypeKind::Bytes => write!(f, "Bytes"),
            TypeKind::Composite(CompositeKind::Slice) => write!(f, "Slice"),
            TypeKind::Composite(CompositeKind::Struct) => write!(f, "Struct"),
            TypeKind::Composite(CompositeKind::Map) => write!(f, "Map"),
            TypeKind::Composite(CompositeKind::Pointer(inner)) => write!(f, "*{}", inner),
        }
    }
}
