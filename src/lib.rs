//! Runtime field mapping between Rust records and SQL statements.
//!
//! Describe a record once with [`record!`], then let a [`Session`] turn it
//! into column lists and positional parameters for INSERT/UPDATE, and turn
//! result rows back into records for SELECT. SQL text is built by the
//! caller's query builder; statements run through a driver implementing
//! [`Connection`].
//!
//! # Example
//!
//! ```no_run
//! use sqltool_rs::{record, Connection, Opt, Result, Session, Value};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     created_at: i64,
//!     updated_at: i64,
//!     username: String,
//!     pass: String,
//! }
//!
//! record!(User {
//!     id => "id",
//!     created_at => "created_at",
//!     updated_at => "updated_at",
//!     username => "username",
//!     pass => "pass",
//! });
//!
//! async fn load<C: Connection>(session: &mut Session<C>, id: i64) -> Result<User> {
//!     let mut user = User::default();
//!     session.prepare_select(&user, [Opt::date_time_columns(["created_at", "updated_at"])]);
//!
//!     let sql = format!("SELECT {} FROM user WHERE id = ?", session.columns().join(", "));
//!     session.select_one(&mut user, &sql, &[Value::Int(id)]).await?;
//!     Ok(user)
//! }
//! ```

pub mod catalog;
pub mod context;
pub mod decode;
pub mod driver;
pub mod encode;
pub mod error;
pub mod policy;
pub mod record;
pub mod session;
pub mod types;

// Re-export main types
pub use catalog::{ActionMode, ColumnSpec, FieldCatalog};
pub use context::ExecContext;
pub use decode::ValueDecoder;
pub use driver::{Connection, ExecResult, QueryResult, Statement, Transaction};
pub use encode::ValueEncoder;
pub use error::{Error, Result};
pub use policy::{DateTimeUnit, Opt, Policy};
pub use record::{Field, FieldDescriptor, FieldValue, Json, Record, RecordTypeIdentity};
pub use session::Session;
pub use types::{CompositeKind, TypeKind, Value};
