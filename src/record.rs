//! Record and field description.
//!
//! A record is any struct that implements [`Record`], usually through the
//! [`record!`](crate::record!) macro. Each mapped field carries an annotation
//! string (`column[,flag,...]`) and a field type implementing [`Field`],
//! which fixes its [`TypeKind`] and how values move in and out of it.

use crate::types::{CompositeKind, TypeKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// Stable identity of a record type: defining module path plus type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordTypeIdentity {
    pub module_path: &'static str,
    pub type_name: &'static str,
}

impl RecordTypeIdentity {
    /// Identity of `T`, derived from its fully qualified type name.
    pub fn of<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        let base = full.split('<').next().unwrap_or(full);
        match base.rfind("::") {
            Some(idx) => Self {
                module_path: &full[..idx],
                type_name: &full[idx + 2..],
            },
            None => Self {
                module_path: "",
                type_name: full,
            },
        }
    }
}

/// One mapped field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust field identifier.
    pub name: &'static str,
    /// Annotation string, `column[,flag,...]`.
    pub annotation: &'static str,
    /// Declared kind of the field.
    pub kind: TypeKind,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, annotation: &'static str, kind: TypeKind) -> Self {
        Self {
            name,
            annotation,
            kind,
        }
    }
}

/// Snapshot of a field value, or a decoded value headed into a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    /// Structured payload of a composite field. `Null` for an unset pointer.
    Composite(serde_json::Value),
}

impl FieldValue {
    /// Convert into a JSON value.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s),
            FieldValue::Bool(b) => serde_json::Value::Bool(b),
            FieldValue::Int(n) => serde_json::Value::from(n),
            FieldValue::Float(n) => serde_json::Value::from(n),
            FieldValue::Bytes(b) => serde_json::Value::from(b),
            FieldValue::Composite(v) => v,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "String",
            FieldValue::Bool(_) => "Bool",
            FieldValue::Int(_) => "Int",
            FieldValue::Float(_) => "Float",
            FieldValue::Bytes(_) => "Bytes",
            FieldValue::Composite(_) => "Composite",
        }
    }
}

/// Failure to store a decoded value into a field.
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("expected {expected}, got {actual}")]
    Mismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("value {value} out of range for {target}")]
    OutOfRange { value: i64, target: &'static str },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn mismatch(expected: &'static str, actual: &FieldValue) -> FieldError {
    FieldError::Mismatch {
        expected,
        actual: actual.type_name(),
    }
}

/// A record field type the mapping layer can read and write.
pub trait Field {
    /// Declared kind of this field type.
    fn kind() -> TypeKind
    where
        Self: Sized;

    /// Check if the field holds its zero value.
    fn is_zero(&self) -> bool;

    /// Snapshot the current value. Composite values are serialized here.
    fn to_value(&self) -> serde_json::Result<FieldValue>;

    /// Store a decoded value.
    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError>;
}

/// Kind of the field selected by `accessor`. Used by [`record!`](crate::record!).
pub fn kind_of<R, F, A>(_accessor: A) -> TypeKind
where
    F: Field,
    A: Fn(&R) -> &F,
{
    F::kind()
}

/// A record type mapped to table rows.
pub trait Record {
    /// Identity used to decide whether a cached catalog still applies.
    fn identity() -> RecordTypeIdentity
    where
        Self: Sized,
    {
        RecordTypeIdentity::of::<Self>()
    }

    /// Mapped fields in declaration order.
    fn fields() -> Vec<FieldDescriptor>
    where
        Self: Sized;

    /// Field by Rust identifier.
    fn field(&self, name: &str) -> Option<&dyn Field>;

    /// Mutable field by Rust identifier.
    fn field_mut(&mut self, name: &str) -> Option<&mut dyn Field>;
}

/// Implement [`Record`] for a struct from `field => "annotation"` pairs.
///
/// ```
/// use sqltool_rs::record;
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     username: String,
///     cache: String,
/// }
///
/// record!(User {
///     id => "id",
///     username => "username",
///     cache => "-",
/// });
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ty { $($field:ident => $annotation:literal),* $(,)? }) => {
        impl $crate::record::Record for $ty {
            fn fields() -> ::std::vec::Vec<$crate::record::FieldDescriptor> {
                ::std::vec![$(
                    $crate::record::FieldDescriptor::new(
                        ::std::stringify!($field),
                        $annotation,
                        $crate::record::kind_of(|r: &$ty| &r.$field),
                    )
                ),*]
            }

            fn field(&self, name: &str) -> ::std::option::Option<&dyn $crate::record::Field> {
                match name {
                    $(::std::stringify!($field) => ::std::option::Option::Some(&self.$field),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn field_mut(
                &mut self,
                name: &str,
            ) -> ::std::option::Option<&mut dyn $crate::record::Field> {
                match name {
                    $(::std::stringify!($field) => ::std::option::Option::Some(&mut self.$field),)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    };
}

impl Field for String {
    fn kind() -> TypeKind {
        TypeKind::String
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_value(&self) -> serde_json::Result<FieldValue> {
        Ok(FieldValue::String(self.clone()))
    }

    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        match value {
            FieldValue::String(s) => {
                *self = s;
                Ok(())
            }
            other => Err(mismatch("String", &other)),
        }
    }
}

impl Field for bool {
    fn kind() -> TypeKind {
        TypeKind::Bool
    }

    fn is_zero(&self) -> bool {
        !*self
    }

    fn to_value(&self) -> serde_json::Result<FieldValue> {
        Ok(FieldValue::Bool(*self))
    }

    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        match value {
            FieldValue::Bool(b) => {
                *self = b;
                Ok(())
            }
            other => Err(mismatch("Bool", &other)),
        }
    }
}

macro_rules! int_field {
    ($($t:ty),*) => {$(
        impl Field for $t {
            fn kind() -> TypeKind {
                TypeKind::Int
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn to_value(&self) -> serde_json::Result<FieldValue> {
                Ok(FieldValue::Int(*self as i64))
            }

            fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
                match value {
                    FieldValue::Int(n) => {
                        *self = <$t>::try_from(n).map_err(|_| FieldError::OutOfRange {
                            value: n,
                            target: stringify!($t),
                        })?;
                        Ok(())
                    }
                    other => Err(mismatch("Int", &other)),
                }
            }
        }
    )*};
}

int_field!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! float_field {
    ($($t:ty),*) => {$(
        impl Field for $t {
            fn kind() -> TypeKind {
                TypeKind::Float
            }

            fn is_zero(&self) -> bool {
                *self == 0.0
            }

            fn to_value(&self) -> serde_json::Result<FieldValue> {
                Ok(FieldValue::Float(*self as f64))
            }

            fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
                match value {
                    FieldValue::Float(n) => {
                        *self = n as $t;
                        Ok(())
                    }
                    other => Err(mismatch("Float", &other)),
                }
            }
        }
    )*};
}

float_field!(f32, f64);

impl Field for bytes::Bytes {
    fn kind() -> TypeKind {
        TypeKind::Bytes
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_value(&self) -> serde_json::Result<FieldValue> {
        Ok(FieldValue::Bytes(self.to_vec()))
    }

    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        match value {
            FieldValue::Bytes(b) => {
                *self = bytes::Bytes::from(b);
                Ok(())
            }
            other => Err(mismatch("Bytes", &other)),
        }
    }
}

// `Vec<u8>` is raw binary; every other element type is a JSON slice.
impl<T> Field for Vec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn kind() -> TypeKind {
        if TypeId::of::<T>() == TypeId::of::<u8>() {
            TypeKind::Bytes
        } else {
            TypeKind::Composite(CompositeKind::Slice)
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_value(&self) -> serde_json::Result<FieldValue> {
        if let Some(raw) = (self as &dyn Any).downcast_ref::<Vec<u8>>() {
            return Ok(FieldValue::Bytes(raw.clone()));
        }
        Ok(FieldValue::Composite(serde_json::to_value(self)?))
    }

    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        match value {
            FieldValue::Bytes(b) => match (self as &mut dyn Any).downcast_mut::<Vec<u8>>() {
                Some(raw) => {
                    *raw = b;
                    Ok(())
                }
                None => Err(FieldError::Mismatch {
                    expected: "Slice",
                    actual: "Bytes",
                }),
            },
            FieldValue::Composite(json) => {
                *self = serde_json::from_value(json)?;
                Ok(())
            }
            other => Err(mismatch("Slice", &other)),
        }
    }
}

macro_rules! map_field {
    ($map:ident, $($bound:path),*) => {
        impl<K, V> Field for $map<K, V>
        where
            K: Serialize + DeserializeOwned $(+ $bound)*,
            V: Serialize + DeserializeOwned,
        {
            fn kind() -> TypeKind {
                TypeKind::Composite(CompositeKind::Map)
            }

            fn is_zero(&self) -> bool {
                self.is_empty()
            }

            fn to_value(&self) -> serde_json::Result<FieldValue> {
                Ok(FieldValue::Composite(serde_json::to_value(self)?))
            }

            fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
                match value {
                    FieldValue::Composite(json) => {
                        *self = serde_json::from_value(json)?;
                        Ok(())
                    }
                    other => Err(mismatch("Map", &other)),
                }
            }
        }
    };
}

map_field!(HashMap, Eq, Hash);
map_field!(BTreeMap, Ord);

impl<T> Field for Option<T>
where
    T: Field + Default,
{
    fn kind() -> TypeKind {
        TypeKind::pointer(T::kind())
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn to_value(&self) -> serde_json::Result<FieldValue> {
        match self {
            None => Ok(FieldValue::Composite(serde_json::Value::Null)),
            Some(inner) => match inner.to_value()? {
                FieldValue::Bytes(b) => Ok(FieldValue::Bytes(b)),
                other => Ok(FieldValue::Composite(other.into_json())),
            },
        }
    }

    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        // A JSON null unsets the innermost pointer only.
        if value == FieldValue::Composite(serde_json::Value::Null) && !T::kind().is_pointer() {
            *self = None;
            return Ok(());
        }
        let mut inner = T::default();
        inner.set_value(value)?;
        *self = Some(inner);
        Ok(())
    }
}

/// Struct-valued field stored as a JSON payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for Json<T> {
    fn from(value: T) -> Self {
        Json(value)
    }
}

impl<T> Field for Json<T>
where
    T: Serialize + DeserializeOwned + Default + PartialEq,
{
    fn kind() -> TypeKind {
        TypeKind::Composite(CompositeKind::Struct)
    }

    fn is_zero(&self) -> bool {
        self.0 == T::default()
    }

    fn to_value(&self) -> serde_json::Result<FieldValue> {
        Ok(FieldValue::Composite(serde_json::to_value(&self.0)?))
    }

    fn set_value(&mut self, value: FieldValue) -> Result<(), FieldError> {
        match value {
            FieldValue::Composite(json) => {
                self.0 = serde_json::from_value(json)?;
                Ok(())
            }
            other => Err(mismatch("Struct", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    #[derive(Debug, Default)]
    struct Profile {
        id: i64,
        name: String,
        avatar: Vec<u8>,
        tags: Vec<String>,
        address: Json<Address>,
        nick: Option<String>,
    }

    crate::record!(Profile {
        id => "id",
        name => "name,omitempty",
        avatar => "avatar",
        tags => "tags",
        address => "address",
        nick => "nick",
    });

    #[test]
    fn test_identity() {
        let identity = Profile::identity();
        assert_eq!(identity.type_name, "Profile");
        assert!(identity.module_path.ends_with("record::tests"));
        assert_ne!(identity, RecordTypeIdentity::of::<Address>());
    }

    #[test]
    fn test_macro_descriptors() {
        let fields = Profile::fields();
        let kinds: Vec<_> = fields.iter().map(|f| (f.name, f.kind.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                ("id", TypeKind::Int),
                ("name", TypeKind::String),
                ("avatar", TypeKind::Bytes),
                ("tags", TypeKind::Composite(CompositeKind::Slice)),
                ("address", TypeKind::Composite(CompositeKind::Struct)),
                ("nick", TypeKind::pointer(TypeKind::String)),
            ]
        );
        assert_eq!(fields[1].annotation, "name,omitempty");
    }

    #[test]
    fn test_field_access() {
        let mut profile = Profile::default();
        assert!(profile.field("missing").is_none());

        let field = profile.field_mut("name").unwrap();
        field.set_value(FieldValue::String("amy".into())).unwrap();
        assert_eq!(profile.name, "amy");
        assert!(!profile.field("name").unwrap().is_zero());
        assert!(profile.field("id").unwrap().is_zero());
    }

    #[test]
    fn test_int_out_of_range() {
        let mut small = 0i8;
        let err = small.set_value(FieldValue::Int(300)).unwrap_err();
        assert!(matches!(err, FieldError::OutOfRange { value: 300, .. }));
    }

    #[test]
    fn test_byte_vec_is_raw() {
        let mut raw: Vec<u8> = vec![1, 2, 3];
        assert_eq!(raw.to_value().unwrap(), FieldValue::Bytes(vec![1, 2, 3]));
        raw.set_value(FieldValue::Bytes(vec![9])).unwrap();
        assert_eq!(raw, vec![9]);
    }

    #[test]
    fn test_pointer_to_value() {
        let none: Option<bool> = None;
        assert!(none.is_zero());
        assert_eq!(
            none.to_value().unwrap(),
            FieldValue::Composite(serde_json::Value::Null)
        );

        let some = Some(true);
        assert_eq!(
            some.to_value().unwrap(),
            FieldValue::Composite(serde_json::Value::Bool(true))
        );

        let mut slot: Option<i32> = None;
        slot.set_value(FieldValue::Int(5)).unwrap();
        assert_eq!(slot, Some(5));
    }

    #[test]
    fn test_null_unsets_innermost_pointer() {
        let null = FieldValue::Composite(serde_json::Value::Null);

        let mut single = Some("x".to_string());
        single.set_value(null.clone()).unwrap();
        assert_eq!(single, None);

        let mut nested: Option<Option<String>> = None;
        nested.set_value(null).unwrap();
        assert_eq!(nested, Some(None));
    }

    #[test]
    fn test_struct_zero() {
        let empty = Json(Address::default());
        assert!(empty.is_zero());
        let set = Json(Address {
            city: "Hanoi".into(),
        });
        assert!(!set.is_zero());
    }
}
