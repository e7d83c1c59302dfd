//! Many-to-many association engine.
//!
//! A `JoinModel` describes one membership table: a composite primary key
//! over the two participant types' identity columns and nothing else. The
//! composite key makes membership a set - re-adding an existing pair is a
//! no-op. `JoinMapper` is the typed view handed out by the registry.
//!
//! `replace_left`/`replace_right` sequence a clear and the new membership
//! rows in one call; atomicity beyond that still belongs to the caller's
//! transaction.

use std::marker::PhantomData;
use std::sync::Arc;

use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::entity::{Association, Entity};
use crate::model::ErasedMapper;
use crate::{Criteria, StorageError, Value};

/// Schema metadata for one registered association.
pub struct JoinModel {
    pub table: String,
    pub(crate) left: Arc<dyn ErasedMapper>,
    pub(crate) right: Arc<dyn ErasedMapper>,
}

impl JoinModel {
    pub(crate) fn create_table(&self, conn: &Connection) -> Result<(), StorageError> {
        self.left.create_table(conn)?;
        self.right.create_table(conn)?;

        let left = self.left.model();
        let right = self.right.model();

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS [{table}] (\n  \
             [{l}] INTEGER NOT NULL,\n  \
             [{r}] INTEGER NOT NULL,\n  \
             PRIMARY KEY ([{l}], [{r}]),\n  \
             FOREIGN KEY ([{l}]) REFERENCES [{lt}] ([{l}]),\n  \
             FOREIGN KEY ([{r}]) REFERENCES [{rt}] ([{r}])\n)",
            table = self.table,
            l = left.id_column,
            r = right.id_column,
            lt = left.table,
            rt = right.table,
        );

        debug!(sql = %sql, "create join table");

        conn.execute(&sql, [])?;

        Ok(())
    }

    fn insert_pair(
        &self,
        conn: &Connection,
        left_id: Value,
        right_id: Value,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT OR IGNORE INTO [{}] ([{}], [{}]) VALUES (?, ?)",
            self.table,
            self.left.model().id_column,
            self.right.model().id_column,
        );

        debug!(sql = %sql, left = ?left_id, right = ?right_id, "store membership");

        conn.execute(&sql, params_from_iter([&left_id, &right_id]))?;

        Ok(())
    }

    fn ids_on(
        &self,
        conn: &Connection,
        selected: &str,
        anchored: &str,
        anchor_id: Value,
    ) -> Result<Vec<i64>, StorageError> {
        let sql = format!(
            "SELECT [{selected}] FROM [{}] WHERE [{anchored}] = ?",
            self.table
        );

        debug!(sql = %sql, anchor = ?anchor_id, "select memberships");

        let mut statement = conn.prepare(&sql)?;
        let ids = statement
            .query_map(params_from_iter([&anchor_id]), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(ids)
    }

    fn clear_on(
        &self,
        conn: &Connection,
        anchored: &str,
        anchor_id: Value,
    ) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM [{}] WHERE [{anchored}] = ?", self.table);

        debug!(sql = %sql, anchor = ?anchor_id, "clear memberships");

        conn.execute(&sql, params_from_iter([&anchor_id]))?;

        Ok(())
    }

    /// Join through the anchor entity's table: distinct related-side ids for
    /// anchor rows matching the criteria.
    fn traverse(
        &self,
        conn: &Connection,
        anchor: &Arc<dyn ErasedMapper>,
        selected: &str,
        criteria: &Criteria,
    ) -> Result<Vec<i64>, StorageError> {
        let anchor_model = anchor.model();
        let (clause, binds) = criteria.compile(anchor_model)?;

        let mut sql = format!(
            "SELECT DISTINCT [{selected}] FROM [{}] JOIN [{}] USING ([{}])",
            anchor_model.table, self.table, anchor_model.id_column,
        );
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        debug!(sql = %sql, binds = ?binds, "traverse memberships");

        let mut statement = conn.prepare(&sql)?;
        let ids = statement
            .query_map(params_from_iter(binds.iter()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(ids)
    }
}

/// Typed association operations for one registered association type.
pub struct JoinMapper<A: Association> {
    model: Arc<JoinModel>,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Association> JoinMapper<A> {
    pub(crate) fn new(model: Arc<JoinModel>) -> Self {
        JoinMapper {
            model,
            _marker: PhantomData,
        }
    }

    pub fn model(&self) -> &JoinModel {
        &self.model
    }

    /// Idempotently create both entity tables and the association table.
    pub fn create_table(&self, conn: &Connection) -> Result<(), StorageError> {
        self.model.create_table(conn)
    }

    /// Add a membership pair; adding an existing pair is a no-op.
    pub fn store(
        &self,
        conn: &Connection,
        left: &A::Left,
        right: &A::Right,
    ) -> Result<(), StorageError> {
        self.model
            .insert_pair(conn, identity_value(left), identity_value(right))
    }

    /// Right-side identity values associated with the given left record.
    pub fn ids_for_left(&self, conn: &Connection, left: &A::Left) -> Result<Vec<i64>, StorageError> {
        self.model.ids_on(
            conn,
            &self.model.right.model().id_column,
            &self.model.left.model().id_column,
            identity_value(left),
        )
    }

    /// Left-side identity values associated with the given right record.
    pub fn ids_for_right(
        &self,
        conn: &Connection,
        right: &A::Right,
    ) -> Result<Vec<i64>, StorageError> {
        self.model.ids_on(
            conn,
            &self.model.left.model().id_column,
            &self.model.right.model().id_column,
            identity_value(right),
        )
    }

    /// Hydrated right-side records associated with the given left record.
    pub fn of_left(&self, conn: &Connection, left: &A::Left) -> Result<Vec<A::Right>, StorageError> {
        let ids = self.ids_for_left(conn, left)?;
        hydrate::<A::Right>(&self.model.right, conn, &ids)
    }

    /// Hydrated left-side records associated with the given right record.
    pub fn of_right(
        &self,
        conn: &Connection,
        right: &A::Right,
    ) -> Result<Vec<A::Left>, StorageError> {
        let ids = self.ids_for_right(conn, right)?;
        hydrate::<A::Left>(&self.model.left, conn, &ids)
    }

    /// Hydrated right-side records associated with left records matching the
    /// criteria (validated against the left type's searchable fields).
    pub fn from_left(
        &self,
        conn: &Connection,
        criteria: &Criteria,
    ) -> Result<Vec<A::Right>, StorageError> {
        let ids = self.model.traverse(
            conn,
            &self.model.left,
            &self.model.right.model().id_column,
            criteria,
        )?;
        hydrate::<A::Right>(&self.model.right, conn, &ids)
    }

    /// Hydrated left-side records associated with right records matching the
    /// criteria (validated against the right type's searchable fields).
    pub fn from_right(
        &self,
        conn: &Connection,
        criteria: &Criteria,
    ) -> Result<Vec<A::Left>, StorageError> {
        let ids = self.model.traverse(
            conn,
            &self.model.right,
            &self.model.left.model().id_column,
            criteria,
        )?;
        hydrate::<A::Left>(&self.model.left, conn, &ids)
    }

    /// Remove every membership row for the given left record.
    pub fn clear_left(&self, conn: &Connection, left: &A::Left) -> Result<(), StorageError> {
        self.model.clear_on(
            conn,
            &self.model.left.model().id_column,
            identity_value(left),
        )
    }

    /// Remove every membership row for the given right record.
    pub fn clear_right(&self, conn: &Connection, right: &A::Right) -> Result<(), StorageError> {
        self.model.clear_on(
            conn,
            &self.model.right.model().id_column,
            identity_value(right),
        )
    }

    /// Replace the full membership set for a left record in one call.
    pub fn replace_left(
        &self,
        conn: &Connection,
        left: &A::Left,
        rights: &[A::Right],
    ) -> Result<(), StorageError> {
        self.clear_left(conn, left)?;

        for right in rights {
            self.store(conn, left, right)?;
        }

        Ok(())
    }

    /// Replace the full membership set for a right record in one call.
    pub fn replace_right(
        &self,
        conn: &Connection,
        right: &A::Right,
        lefts: &[A::Left],
    ) -> Result<(), StorageError> {
        self.clear_right(conn, right)?;

        for left in lefts {
            self.store(conn, left, right)?;
        }

        Ok(())
    }
}

fn identity_value<E: Entity>(record: &E) -> Value {
    record.identity().map_or(Value::Null, Value::Integer)
}

fn hydrate<E: Entity>(
    mapper: &Arc<dyn ErasedMapper>,
    conn: &Connection,
    ids: &[i64],
) -> Result<Vec<E>, StorageError> {
    let mut fetched = mapper.fetch_any(conn, ids)?;
    let mut records = Vec::with_capacity(fetched.len());

    for id in ids {
        let Some(boxed) = fetched.remove(id) else {
            continue;
        };

        match boxed.downcast::<E>() {
            Ok(record) => records.push(*record),
            Err(_) => {
                return Err(StorageError::Storage(format!(
                    "Fetched record for id {id} is not a `{}`",
                    E::entity_name()
                )));
            }
        }
    }

    Ok(records)
}
