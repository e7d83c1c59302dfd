//! Traits implemented by the derive macros.
//!
//! `Entity` is the contract between a record struct and the mapping engine:
//! it exposes the declared fields for registration, identity access, value
//! extraction for writes, and row hydration for reads. `Association`
//! declares a many-to-many membership relation between two entity types.
//!
//! Both are generated - `#[derive(Entity)]` and `#[derive(Association)]`
//! from the companion derive crate are the only intended implementors.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::{ColumnType, FromValue, StorageError, Value};

/// A record type mapped to exactly one table.
pub trait Entity: Clone + Sized + 'static {
    /// The type's name; doubles as the table name.
    fn entity_name() -> &'static str;

    /// The identity column name (snake_case of the type name + `_id`).
    fn identity_column() -> &'static str;

    /// Declared non-identity fields, in declaration order.
    fn fields() -> Vec<FieldSpec>;

    /// Declared uniqueness groups, validated at registration.
    fn unique_groups() -> &'static [&'static [&'static str]];

    /// The identity value, if one has been assigned.
    fn identity(&self) -> Option<i64>;

    /// Assign the identity value after an insert.
    fn set_identity(&mut self, id: i64);

    /// Extract the record's field values for a write, in declaration order.
    fn field_values(&self) -> Vec<FieldValue>;

    /// Rebuild a record from a fetched row.
    fn from_row(row: &mut EntityRow) -> Result<Self, StorageError>;
}

/// A declared many-to-many association between two entity types.
pub trait Association: 'static {
    type Left: Entity;
    type Right: Entity;

    /// The declaration's name; doubles as the association table name.
    fn association_name() -> &'static str;
}

/// Descriptor for one declared field of an entity type.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

/// What a declared field maps to: a data column or another entity.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Column(ColumnType),
    Reference(ReferenceSpec),
}

/// Target of a relationship field.
#[derive(Debug, Clone)]
pub struct ReferenceSpec {
    pub target: TypeId,
    pub entity: &'static str,
}

impl FieldSpec {
    pub fn column(name: &'static str, column_type: ColumnType, nullable: bool) -> Self {
        FieldSpec {
            name,
            kind: FieldKind::Column(column_type),
            nullable,
        }
    }

    pub fn reference<E: Entity>(name: &'static str, nullable: bool) -> Self {
        FieldSpec {
            name,
            kind: FieldKind::Reference(ReferenceSpec {
                target: TypeId::of::<E>(),
                entity: E::entity_name(),
            }),
            nullable,
        }
    }
}

/// One extracted field value, ready for binding.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Column {
        field: &'static str,
        value: Value,
    },
    Related {
        field: &'static str,
        related: RelatedRef,
    },
}

impl FieldValue {
    pub fn column(field: &'static str, value: Value) -> Self {
        FieldValue::Column { field, value }
    }

    pub fn related(field: &'static str, related: RelatedRef) -> Self {
        FieldValue::Related { field, related }
    }
}

/// The persistence state of a related record at write time.
///
/// Referenced rows must be stored before the referencing row; `Unsaved`
/// makes that ordering violation detectable before any statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedRef {
    /// Optional relationship with no related record - maps to NULL.
    Absent,
    /// A related record that has never been stored.
    Unsaved,
    /// A related record with an assigned identity.
    Persisted(i64),
}

impl RelatedRef {
    pub fn of<E: Entity>(entity: &E) -> Self {
        match entity.identity() {
            Some(id) => RelatedRef::Persisted(id),
            None => RelatedRef::Unsaved,
        }
    }

    pub fn of_optional<E: Entity>(entity: Option<&E>) -> Self {
        match entity {
            Some(e) => Self::of(e),
            None => RelatedRef::Absent,
        }
    }
}

/// A fetched row mid-hydration: raw column values plus the already-resolved
/// related records, consumed field by field by the generated `from_row`.
pub struct EntityRow {
    columns: HashMap<String, Value>,
    related: HashMap<&'static str, Box<dyn Any>>,
}

impl EntityRow {
    pub(crate) fn new(
        columns: HashMap<String, Value>,
        related: HashMap<&'static str, Box<dyn Any>>,
    ) -> Self {
        EntityRow { columns, related }
    }

    /// Take a column value, converting it to the field's type.
    pub fn column<V: FromValue>(&mut self, name: &str) -> Result<V, StorageError> {
        let value = self
            .columns
            .remove(name)
            .ok_or_else(|| StorageError::Storage(format!("Row has no column `{name}`")))?;

        V::from_value(value)
    }

    /// Take the hydrated record for an optional relationship field.
    pub fn related<E: Entity>(&mut self, field: &str) -> Result<Option<E>, StorageError> {
        match self.related.remove(field) {
            None => Ok(None),
            Some(boxed) => match boxed.downcast::<E>() {
                Ok(record) => Ok(Some(*record)),
                Err(_) => Err(StorageError::Storage(format!(
                    "Hydrated record for `{field}` is not a `{}`",
                    E::entity_name()
                ))),
            },
        }
    }

    /// Take the hydrated record for a required relationship field.
    pub fn related_required<E: Entity>(&mut self, field: &str) -> Result<E, StorageError> {
        self.related::<E>(field)?.ok_or_else(|| {
            StorageError::Integrity(format!(
                "Required related `{}` record for `{field}` is missing",
                E::entity_name()
            ))
        })
    }
}
