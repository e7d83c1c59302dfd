//! Relational Storage - declarative record-to-table mapping over SQLite.
//!
//! Record structs derive [`Entity`] and register against a [`Registry`]
//! built once at startup; the registry derives each type's schema (table,
//! surrogate identity column, data columns, foreign keys, uniqueness
//! groups) and hands out connection-bound handles for CRUD, predicate
//! search, and many-to-many association traversal.
//!
//! # Core concepts
//!
//! - **Entity**: a record type mapped to exactly one table, identified by an
//!   auto-assigned integer surrogate key (`Option<i64>` field named after
//!   the snake_case type name + `_id`).
//! - **Relationship**: a field whose type is another entity, stored as a
//!   foreign-key column and hydrated back into the full related record on
//!   fetch.
//! - **Association**: a two-field declaration mapped to a membership table
//!   with a composite primary key - a pure many-to-many relation.
//!
//! # Example
//!
//! ```text
//! #[derive(Clone, Entity)]
//! struct Realm {
//!     realm_id: Option<i64>,
//!     realm: String,
//! }
//!
//! #[derive(Clone, Entity)]
//! #[unique(realm, username)]
//! struct User {
//!     user_id: Option<i64>,
//!     username: String,
//!     realm: Realm,
//! }
//!
//! let mut registry = Registry::new();
//! registry.register::<Realm>()?;
//! registry.register::<User>()?;
//!
//! let conn = connection::open("games.db")?;
//! registry.create_tables(&conn)?;
//!
//! let users = registry.model::<User>(&conn)?;
//! users.store(&mut user)?;
//! let matches = users.search(&Criteria::new().related("realm", &realm))?;
//! ```
//!
//! The layer is synchronous and never commits: transaction boundaries
//! belong entirely to the caller.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod connection;
mod criteria;
mod entity;
mod error;
mod handle;
mod join;
mod model;
mod registry;
mod time;
mod value;

pub use criteria::Criteria;
pub use entity::{
    Association, Entity, EntityRow, FieldKind, FieldSpec, FieldValue, ReferenceSpec, RelatedRef,
};
pub use error::StorageError;
pub use handle::{JoinHandle, ModelHandle};
pub use join::{JoinMapper, JoinModel};
pub use model::{Column, ForeignKey, Mapper, Model};
pub use registry::Registry;
pub use time::Timestamp;
pub use value::{ColumnType, FromValue, Value};

// Re-export derive macros
pub use relational_storage_derive::{Association, Entity};

// Re-export the embedded store so callers can manage transactions
pub use rusqlite;
