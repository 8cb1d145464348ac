//! Persistence port
//!
//! The engine never talks to a database directly. Registries and the SLA
//! engine receive a [`Store`] and read/write typed records through it. Each
//! record carries a revision; [`Store::update`] is a compare-and-swap on that
//! revision, which is how concurrent transitions on one record are serialized.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("STORE/NOT_FOUND: {0}")]
    NotFound(String),

    #[error("STORE/ALREADY_EXISTS: {0}")]
    AlreadyExists(String),

    #[error("STORE/STALE_REVISION: {id} expected revision {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },

    #[error("STORE/CORRUPT: {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("STORE/UNAVAILABLE: {0}")]
    Unavailable(String),
}

/// A stored record together with its optimistic-concurrency revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub id: String,
    pub revision: u64,
    pub value: T,
}

pub trait Store<T>: Send + Sync {
    /// Insert a new record at revision 1.
    fn insert(&self, id: &str, value: &T) -> Result<Versioned<T>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError>;

    /// All records, ordered by id.
    fn list(&self) -> Result<Vec<Versioned<T>>, StoreError>;

    /// Replace the record if its revision still equals `expected_revision`.
    fn update(
        &self,
        id: &str,
        expected_revision: u64,
        value: &T,
    ) -> Result<Versioned<T>, StoreError>;
}

#[derive(Debug, Clone)]
struct Row {
    revision: u64,
    json: Value,
}

/// In-process adapter. Rows are kept as JSON documents, the same shape the
/// host application writes to its JSON columns, so (de)serialization lives
/// here and nowhere else.
pub struct MemoryStore<T> {
    rows: RwLock<BTreeMap<String, Row>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> MemoryStore<T> {
    fn encode(id: &str, value: &T) -> Result<Value, StoreError> {
        serde_json::to_value(value).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode(id: &str, row: &Row) -> Result<Versioned<T>, StoreError> {
        let value = serde_json::from_value(row.json.clone()).map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Versioned {
            id: id.to_string(),
            revision: row.revision,
            value,
        })
    }
}

fn poisoned<E>(_: E) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

impl<T: Serialize + DeserializeOwned> Store<T> for MemoryStore<T> {
    fn insert(&self, id: &str, value: &T) -> Result<Versioned<T>, StoreError> {
        let json = Self::encode(id, value)?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        if rows.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        let row = Row { revision: 1, json };
        let stored = Self::decode(id, &row)?;
        rows.insert(id.to_string(), row);
        Ok(stored)
    }

    fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        rows.get(id).map(|row| Self::decode(id, row)).transpose()
    }

    fn list(&self) -> Result<Vec<Versioned<T>>, StoreError> {
        let rows = self.rows.read().map_err(poisoned)?;
        rows.iter().map(|(id, row)| Self::decode(id, row)).collect()
    }

    fn update(
        &self,
        id: &str,
        expected_revision: u64,
        value: &T,
    ) -> Result<Versioned<T>, StoreError> {
        let json = Self::encode(id, value)?;
        let mut rows = self.rows.write().map_err(poisoned)?;
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if row.revision != expected_revision {
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: expected_revision,
                actual: row.revision,
            });
        }
        row.revision += 1;
        row.json = json;
        Self::decode(id, row)
    }
}
