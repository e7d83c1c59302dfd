//! Record mapping engine: per-type schema metadata and CRUD operations.
//!
//! A `Model` is built once per entity type at registration and describes the
//! backing table; a `Mapper` executes DDL, fetches, searches, and stores
//! against a caller-supplied connection. Relationship recursion happens
//! through `ErasedMapper`, the object-safe view a model holds of the types
//! it references. Fetched related records move between mappers as
//! `Box<dyn Any>` and are downcast back during hydration.
//!
//! Every multi-statement operation here runs on the caller's connection and
//! transaction; the engine never commits or rolls back.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::entity::{Entity, EntityRow, FieldValue, RelatedRef};
use crate::{ColumnType, Criteria, StorageError, Value};

/// One data column of a mapped table.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// A has-one relationship, stored as a foreign-key column named after the
/// referenced type's identity column.
pub struct ForeignKey {
    pub column: String,
    pub field: &'static str,
    pub target_type: TypeId,
    pub(crate) target: Arc<dyn ErasedMapper>,
}

/// Schema metadata for one registered entity type.
///
/// `columns` is ordered by field declaration and excludes the identity
/// column; relationship fields appear as their foreign-key columns. Every
/// column, foreign-key columns included, is searchable.
pub struct Model {
    pub entity: &'static str,
    pub type_id: TypeId,
    pub table: String,
    pub id_column: String,
    pub columns: Vec<Column>,
    pub foreigners: Vec<ForeignKey>,
    pub uniques: Vec<Vec<String>>,
    pub searchable: Vec<String>,
}

impl Model {
    fn create_table_sql(&self) -> String {
        let mut parts = Vec::with_capacity(self.columns.len() + self.foreigners.len() + 2);

        parts.push(format!("[{}] INTEGER NOT NULL PRIMARY KEY", self.id_column));

        for column in &self.columns {
            let mut definition = format!("[{}] {}", column.name, column.column_type.sql_type());
            if !column.nullable {
                definition.push_str(" NOT NULL");
            }
            parts.push(definition);
        }

        for group in &self.uniques {
            parts.push(format!("UNIQUE ([{}])", group.join("], [")));
        }

        for fk in &self.foreigners {
            parts.push(format!(
                "FOREIGN KEY ([{}]) REFERENCES [{}] ([{}])",
                fk.column,
                fk.target.model().table,
                fk.column
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS [{}] (\n  {}\n)",
            self.table,
            parts.join(",\n  ")
        )
    }
}

/// CRUD engine for one entity type.
pub struct Mapper<E: Entity> {
    model: Model,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Mapper<E> {
    pub(crate) fn new(model: Model) -> Self {
        Mapper {
            model,
            _marker: PhantomData,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Idempotently create the backing table, referenced entities' tables
    /// first.
    pub fn create_table(&self, conn: &Connection) -> Result<(), StorageError> {
        for fk in &self.model.foreigners {
            fk.target.create_table(conn)?;
        }

        let sql = self.model.create_table_sql();
        debug!(sql = %sql, "create table");

        conn.execute(&sql, [])?;

        Ok(())
    }

    /// Fetch the record for one identity value; `None` if no row matches.
    pub fn get(&self, conn: &Connection, id: i64) -> Result<Option<E>, StorageError> {
        Ok(self.get_many(conn, &[id])?.remove(&id))
    }

    /// Batched fetch with relationship hydration.
    ///
    /// Issues one select for the requested rows, then one recursive batched
    /// fetch per relationship covering the distinct referenced ids of the
    /// whole batch. Requested ids with no row are omitted from the result;
    /// a non-null foreign key whose target row is gone is an integrity
    /// error.
    pub fn get_many(&self, conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, E>, StorageError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut selected: Vec<&str> = self
            .model
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect();
        selected.push(self.model.id_column.as_str());

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT [{}] FROM [{}] WHERE [{}] IN ({placeholders})",
            selected.join("], ["),
            self.model.table,
            self.model.id_column,
        );

        debug!(sql = %sql, ids = ?ids, "select batch");

        let id_index = self.model.columns.len();
        let mut packed: Vec<(i64, HashMap<String, Value>)> = Vec::new();

        let mut statement = conn.prepare(&sql)?;
        let mut rows = statement.query(params_from_iter(ids.iter()))?;

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(id_index)?;
            let mut values = HashMap::with_capacity(self.model.columns.len() + 1);

            for (index, column) in self.model.columns.iter().enumerate() {
                values.insert(
                    column.name.clone(),
                    Value::read(column.column_type, row.get_ref(index)?)?,
                );
            }

            values.insert(self.model.id_column.clone(), Value::Integer(id));
            packed.push((id, values));
        }

        // One batched fetch per relationship, shared across the whole batch.
        let mut related_sets: HashMap<&'static str, HashMap<i64, Box<dyn Any>>> = HashMap::new();

        for fk in &self.model.foreigners {
            let distinct: BTreeSet<i64> = packed
                .iter()
                .filter_map(|(_, values)| match values.get(&fk.column) {
                    Some(Value::Integer(fid)) => Some(*fid),
                    _ => None,
                })
                .collect();
            let distinct: Vec<i64> = distinct.into_iter().collect();

            related_sets.insert(fk.field, fk.target.fetch_any(conn, &distinct)?);
        }

        let mut output = HashMap::with_capacity(packed.len());

        for (id, mut values) in packed {
            let mut related: HashMap<&'static str, Box<dyn Any>> = HashMap::new();

            for fk in &self.model.foreigners {
                let Some(value) = values.remove(&fk.column) else {
                    continue;
                };
                let Value::Integer(fid) = value else {
                    continue;
                };

                let record = related_sets
                    .get(fk.field)
                    .and_then(|set| set.get(&fid))
                    .and_then(|record| fk.target.clone_any(record.as_ref()));

                match record {
                    Some(record) => {
                        related.insert(fk.field, record);
                    }
                    None => {
                        return Err(StorageError::Integrity(format!(
                            "[{}].[{}] = {fid} references a missing [{}] row",
                            self.model.table,
                            fk.column,
                            fk.target.model().table
                        )));
                    }
                }
            }

            let mut row = EntityRow::new(values, related);
            output.insert(id, E::from_row(&mut row)?);
        }

        Ok(output)
    }

    /// Every record in the table, in selection order.
    pub fn all(&self, conn: &Connection) -> Result<Vec<E>, StorageError> {
        let sql = format!(
            "SELECT [{}] FROM [{}]",
            self.model.id_column, self.model.table
        );

        debug!(sql = %sql, "select all");

        let mut statement = conn.prepare(&sql)?;
        let ids = statement
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        self.in_id_order(conn, &ids)
    }

    /// Records matching the given predicates, hydrated via `get_many`.
    pub fn search(&self, conn: &Connection, criteria: &Criteria) -> Result<Vec<E>, StorageError> {
        let (clause, binds) = criteria.compile(&self.model)?;

        let mut sql = format!(
            "SELECT [{}] FROM [{}]",
            self.model.id_column, self.model.table
        );
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        debug!(sql = %sql, binds = ?binds, "search");

        let mut statement = conn.prepare(&sql)?;
        let ids = statement
            .query_map(params_from_iter(binds.iter()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        self.in_id_order(conn, &ids)
    }

    fn in_id_order(&self, conn: &Connection, ids: &[i64]) -> Result<Vec<E>, StorageError> {
        let mut records = self.get_many(conn, ids)?;

        Ok(ids.iter().filter_map(|id| records.remove(id)).collect())
    }

    /// Upsert the record by identity.
    ///
    /// Relationship fields are written as the related record's identity; a
    /// present related record that has never been stored is a usage error
    /// (referenced rows first), an absent optional relationship becomes
    /// NULL. A record without an identity is inserted and the generated id
    /// written back; a record with an identity replaces that row's fields
    /// in place, so a uniqueness collision with a different row fails
    /// instead of swallowing it. Join rows referencing the identity are
    /// never touched.
    pub fn store(&self, conn: &Connection, record: &mut E) -> Result<(), StorageError> {
        let mut columns: Vec<&str> = Vec::new();
        let mut binds: Vec<Value> = Vec::new();

        for field_value in record.field_values() {
            match field_value {
                FieldValue::Column { field, value } => {
                    columns.push(field);
                    binds.push(value);
                }
                FieldValue::Related { field, related } => {
                    let fk = self
                        .model
                        .foreigners
                        .iter()
                        .find(|fk| fk.field == field)
                        .ok_or_else(|| {
                            StorageError::Usage(format!(
                                "`{}` has no relationship field `{field}`",
                                self.model.entity
                            ))
                        })?;

                    let value = match related {
                        RelatedRef::Absent => Value::Null,
                        RelatedRef::Persisted(id) => Value::Integer(id),
                        RelatedRef::Unsaved => {
                            return Err(StorageError::Usage(format!(
                                "Related `{field}` record must be stored before `{}`",
                                self.model.entity
                            )));
                        }
                    };

                    columns.push(fk.column.as_str());
                    binds.push(value);
                }
            }
        }

        let fresh = record.identity().is_none();

        if let Some(id) = record.identity() {
            columns.push(self.model.id_column.as_str());
            binds.push(Value::Integer(id));
        }

        let assignments: Vec<String> = columns
            .iter()
            .filter(|column| **column != self.model.id_column)
            .map(|column| format!("[{column}] = excluded.[{column}]"))
            .collect();

        let conflict = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };

        let sql = if columns.is_empty() {
            format!("INSERT INTO [{}] DEFAULT VALUES", self.model.table)
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO [{}] ([{}]) VALUES ({placeholders}) ON CONFLICT ([{}]) {conflict}",
                self.model.table,
                columns.join("], ["),
                self.model.id_column,
            )
        };

        debug!(sql = %sql, binds = ?binds, "store");

        conn.execute(&sql, params_from_iter(binds.iter()))?;

        if fresh {
            record.set_identity(conn.last_insert_rowid());
        }

        Ok(())
    }
}

/// Object-safe view of a `Mapper`, used for relationship recursion without
/// knowledge of the referenced record type.
pub(crate) trait ErasedMapper {
    fn model(&self) -> &Model;

    fn create_table(&self, conn: &Connection) -> Result<(), StorageError>;

    /// `get_many` with the records boxed for the calling mapper to place
    /// into hydration slots.
    fn fetch_any(
        &self,
        conn: &Connection,
        ids: &[i64],
    ) -> Result<HashMap<i64, Box<dyn Any>>, StorageError>;

    /// Clone a boxed record of this mapper's type; `None` when the value is
    /// of a different type.
    fn clone_any(&self, record: &dyn Any) -> Option<Box<dyn Any>>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> ErasedMapper for Mapper<E> {
    fn model(&self) -> &Model {
        &self.model
    }

    fn create_table(&self, conn: &Connection) -> Result<(), StorageError> {
        Mapper::create_table(self, conn)
    }

    fn fetch_any(
        &self,
        conn: &Connection,
        ids: &[i64],
    ) -> Result<HashMap<i64, Box<dyn Any>>, StorageError> {
        Ok(self
            .get_many(conn, ids)?
            .into_iter()
            .map(|(id, record)| (id, Box::new(record) as Box<dyn Any>))
            .collect())
    }

    fn clone_any(&self, record: &dyn Any) -> Option<Box<dyn Any>> {
        record
            .downcast_ref::<E>()
            .map(|record| Box::new(record.clone()) as Box<dyn Any>)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::any::TypeId;

    use super::*;

    #[test]
    fn create_table_sql_shape() {
        let model = Model {
            entity: "Widget",
            type_id: TypeId::of::<()>(),
            table: "Widget".to_string(),
            id_column: "widget_id".to_string(),
            columns: vec![
                Column {
                    name: "label".to_string(),
                    column_type: ColumnType::Text,
                    nullable: false,
                },
                Column {
                    name: "weight".to_string(),
                    column_type: ColumnType::Integer,
                    nullable: true,
                },
            ],
            foreigners: Vec::new(),
            uniques: vec![vec!["label".to_string()]],
            searchable: vec!["label".to_string(), "weight".to_string()],
        };

        let sql = model.create_table_sql();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS [Widget]"));
        assert!(sql.contains("[widget_id] INTEGER NOT NULL PRIMARY KEY"));
        assert!(sql.contains("[label] TEXT NOT NULL"));
        assert!(sql.contains("[weight] INTEGER,"));
        assert!(sql.contains("UNIQUE ([label])"));
    }
}
