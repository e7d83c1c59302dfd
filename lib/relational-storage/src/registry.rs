//! The type registry: declared record types resolved into mapping metadata.
//!
//! A `Registry` is constructed once at startup, entity types registered in
//! dependency order (referenced types first), associations after their
//! participants, and is treated as immutable from then on. All registration
//! failures are configuration errors - the process should not start with a
//! partially-registered schema.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use crate::entity::{Association, Entity, FieldKind};
use crate::handle::{JoinHandle, ModelHandle};
use crate::join::{JoinMapper, JoinModel};
use crate::model::{Column, ErasedMapper, ForeignKey, Mapper, Model};
use crate::{ColumnType, StorageError};

#[derive(Default)]
pub struct Registry {
    entities: HashMap<TypeId, Arc<dyn ErasedMapper>>,
    entity_order: Vec<Arc<dyn ErasedMapper>>,
    joins: HashMap<TypeId, Arc<JoinModel>>,
    join_order: Vec<Arc<JoinModel>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type, deriving its mapping metadata.
    ///
    /// Relationship fields must reference types registered earlier; forward
    /// references and entity-level cycles are rejected. Registering a type
    /// twice is an error.
    pub fn register<E: Entity>(&mut self) -> Result<(), StorageError> {
        let type_id = TypeId::of::<E>();
        let entity = E::entity_name();

        if self.entities.contains_key(&type_id) {
            return Err(StorageError::Configuration(format!(
                "`{entity}` is already registered"
            )));
        }

        let id_column = E::identity_column().to_string();

        let mut columns: Vec<Column> = Vec::new();
        let mut foreigners: Vec<ForeignKey> = Vec::new();
        let mut searchable: Vec<String> = Vec::new();

        for spec in E::fields() {
            let column = match spec.kind {
                FieldKind::Column(column_type) => Column {
                    name: spec.name.to_string(),
                    column_type,
                    nullable: spec.nullable,
                },
                FieldKind::Reference(reference) => {
                    let target =
                        self.entities
                            .get(&reference.target)
                            .cloned()
                            .ok_or_else(|| {
                                StorageError::Configuration(format!(
                                    "Field `{}` in `{entity}` references unregistered entity `{}`",
                                    spec.name, reference.entity
                                ))
                            })?;

                    let fk_column = target.model().id_column.clone();

                    foreigners.push(ForeignKey {
                        column: fk_column.clone(),
                        field: spec.name,
                        target_type: reference.target,
                        target,
                    });

                    Column {
                        name: fk_column,
                        column_type: ColumnType::Integer,
                        nullable: spec.nullable,
                    }
                }
            };

            if column.name == id_column || columns.iter().any(|c| c.name == column.name) {
                return Err(StorageError::Configuration(format!(
                    "Duplicate column `{}` in `{entity}`",
                    column.name
                )));
            }

            searchable.push(column.name.clone());
            columns.push(column);
        }

        // Unique groups may name a column directly or a relationship field,
        // which resolves to its foreign-key column.
        let mut uniques: Vec<Vec<String>> = Vec::new();

        for group in E::unique_groups() {
            let mut resolved = Vec::with_capacity(group.len());

            for name in *group {
                if columns.iter().any(|c| c.name == *name) {
                    resolved.push((*name).to_string());
                } else if let Some(fk) = foreigners.iter().find(|fk| fk.field == *name) {
                    resolved.push(fk.column.clone());
                } else {
                    return Err(StorageError::Configuration(format!(
                        "Unique group references unknown field `{name}` in `{entity}`"
                    )));
                }
            }

            uniques.push(resolved);
        }

        let model = Model {
            entity,
            type_id,
            table: entity.to_string(),
            id_column,
            columns,
            foreigners,
            uniques,
            searchable,
        };

        debug!(entity, table = %model.table, "registered entity");

        let mapper: Arc<dyn ErasedMapper> = Arc::new(Mapper::<E>::new(model));
        self.entity_order.push(Arc::clone(&mapper));
        self.entities.insert(type_id, mapper);

        Ok(())
    }

    /// Register an association between two already-registered entity types.
    pub fn register_association<A: Association>(&mut self) -> Result<(), StorageError> {
        let type_id = TypeId::of::<A>();
        let name = A::association_name();

        if self.joins.contains_key(&type_id) {
            return Err(StorageError::Configuration(format!(
                "`{name}` is already registered"
            )));
        }

        if TypeId::of::<A::Left>() == TypeId::of::<A::Right>() {
            return Err(StorageError::Configuration(format!(
                "`{name}` associates `{}` with itself; the membership columns would collide",
                A::Left::entity_name()
            )));
        }

        let left = self.participant::<A::Left>(name)?;
        let right = self.participant::<A::Right>(name)?;

        debug!(association = name, "registered association");

        let join = Arc::new(JoinModel {
            table: name.to_string(),
            left,
            right,
        });
        self.join_order.push(Arc::clone(&join));
        self.joins.insert(type_id, join);

        Ok(())
    }

    fn participant<E: Entity>(&self, name: &str) -> Result<Arc<dyn ErasedMapper>, StorageError> {
        self.entities
            .get(&TypeId::of::<E>())
            .cloned()
            .ok_or_else(|| {
                StorageError::Configuration(format!(
                    "`{name}` references unregistered entity `{}`",
                    E::entity_name()
                ))
            })
    }

    /// The mapper for a registered entity type.
    pub fn mapper<E: Entity>(&self) -> Result<&Mapper<E>, StorageError> {
        self.entities
            .get(&TypeId::of::<E>())
            .and_then(|mapper| mapper.as_any().downcast_ref::<Mapper<E>>())
            .ok_or_else(|| {
                StorageError::Usage(format!(
                    "`{}` is not a registered entity",
                    E::entity_name()
                ))
            })
    }

    /// The mapper for a registered association type.
    pub fn join_mapper<A: Association>(&self) -> Result<JoinMapper<A>, StorageError> {
        self.joins
            .get(&TypeId::of::<A>())
            .cloned()
            .map(JoinMapper::new)
            .ok_or_else(|| {
                StorageError::Usage(format!(
                    "`{}` is not a registered association",
                    A::association_name()
                ))
            })
    }

    /// A connection-bound handle for a registered entity type.
    pub fn model<'a, E: Entity>(
        &'a self,
        conn: &'a Connection,
    ) -> Result<ModelHandle<'a, E>, StorageError> {
        Ok(ModelHandle::new(self.mapper::<E>()?, conn))
    }

    /// A connection-bound handle for a registered association type.
    pub fn association<'a, A: Association>(
        &'a self,
        conn: &'a Connection,
    ) -> Result<JoinHandle<'a, A>, StorageError> {
        Ok(JoinHandle::new(self.join_mapper::<A>()?, conn))
    }

    /// Idempotently create every registered table, in registration order
    /// with referenced tables first.
    pub fn create_tables(&self, conn: &Connection) -> Result<(), StorageError> {
        for mapper in &self.entity_order {
            mapper.create_table(conn)?;
        }

        for join in &self.join_order {
            join.create_table(conn)?;
        }

        Ok(())
    }
}
