//! Connection-bound wrappers.
//!
//! Pure convenience: each handle pairs a mapper with an active connection so
//! call sites do not thread the connection through every operation. No
//! additional behavior or validation.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::entity::{Association, Entity};
use crate::join::JoinMapper;
use crate::model::Mapper;
use crate::{Criteria, StorageError};

pub struct ModelHandle<'a, E: Entity> {
    mapper: &'a Mapper<E>,
    conn: &'a Connection,
}

impl<'a, E: Entity> ModelHandle<'a, E> {
    pub(crate) fn new(mapper: &'a Mapper<E>, conn: &'a Connection) -> Self {
        ModelHandle { mapper, conn }
    }

    pub fn mapper(&self) -> &Mapper<E> {
        self.mapper
    }

    pub fn create_table(&self) -> Result<(), StorageError> {
        self.mapper.create_table(self.conn)
    }

    pub fn store(&self, record: &mut E) -> Result<(), StorageError> {
        self.mapper.store(self.conn, record)
    }

    pub fn get(&self, id: i64) -> Result<Option<E>, StorageError> {
        self.mapper.get(self.conn, id)
    }

    pub fn get_many(&self, ids: &[i64]) -> Result<HashMap<i64, E>, StorageError> {
        self.mapper.get_many(self.conn, ids)
    }

    pub fn all(&self) -> Result<Vec<E>, StorageError> {
        self.mapper.all(self.conn)
    }

    pub fn search(&self, criteria: &Criteria) -> Result<Vec<E>, StorageError> {
        self.mapper.search(self.conn, criteria)
    }
}

pub struct JoinHandle<'a, A: Association> {
    mapper: JoinMapper<A>,
    conn: &'a Connection,
}

impl<'a, A: Association> JoinHandle<'a, A> {
    pub(crate) fn new(mapper: JoinMapper<A>, conn: &'a Connection) -> Self {
        JoinHandle { mapper, conn }
    }

    pub fn mapper(&self) -> &JoinMapper<A> {
        &self.mapper
    }

    pub fn create_table(&self) -> Result<(), StorageError> {
        self.mapper.create_table(self.conn)
    }

    pub fn store(&self, left: &A::Left, right: &A::Right) -> Result<(), StorageError> {
        self.mapper.store(self.conn, left, right)
    }

    pub fn ids_for_left(&self, left: &A::Left) -> Result<Vec<i64>, StorageError> {
        self.mapper.ids_for_left(self.conn, left)
    }

    pub fn ids_for_right(&self, right: &A::Right) -> Result<Vec<i64>, StorageError> {
        self.mapper.ids_for_right(self.conn, right)
    }

    pub fn of_left(&self, left: &A::Left) -> Result<Vec<A::Right>, StorageError> {
        self.mapper.of_left(self.conn, left)
    }

    pub fn of_right(&self, right: &A::Right) -> Result<Vec<A::Left>, StorageError> {
        self.mapper.of_right(self.conn, right)
    }

    pub fn from_left(&self, criteria: &Criteria) -> Result<Vec<A::Right>, StorageError> {
        self.mapper.from_left(self.conn, criteria)
    }

    pub fn from_right(&self, criteria: &Criteria) -> Result<Vec<A::Left>, StorageError> {
        self.mapper.from_right(self.conn, criteria)
    }

    pub fn clear_left(&self, left: &A::Left) -> Result<(), StorageError> {
        self.mapper.clear_left(self.conn, left)
    }

    pub fn clear_right(&self, right: &A::Right) -> Result<(), StorageError> {
        self.mapper.clear_right(self.conn, right)
    }

    pub fn replace_left(&self, left: &A::Left, rights: &[A::Right]) -> Result<(), StorageError> {
        self.mapper.replace_left(self.conn, left, rights)
    }

    pub fn replace_right(&self, right: &A::Right, lefts: &[A::Left]) -> Result<(), StorageError> {
        self.mapper.replace_right(self.conn, right, lefts)
    }
}
