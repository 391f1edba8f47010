//! Value and kind types shared by the mapping layer and drivers.

mod kind;
mod value;

pub use kind::{CompositeKind, TypeKind};
pub use value::Value;
