use crate::{
    id::Key,
    repo::{Repository, RepositoryError},
    tree::Map,
};
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
};

///
/// RepositoryCall
///
/// One recorded repository operation, kept for test assertions.
///

#[derive(Clone, Debug, PartialEq)]
pub enum RepositoryCall {
    Create { data: Map },
    Update { key: Key, patch: Map },
}

///
/// MemoryRepository
///
/// In-memory `Repository` with auto-assigned integer primary keys and
/// top-level patch merging. Single-threaded by design, matching the
/// engines' concurrency model; interior mutability keeps the trait's
/// `&self` contract.
///

#[derive(Debug)]
pub struct MemoryRepository {
    primary_key: String,
    rows: RefCell<BTreeMap<i64, Map>>,
    next_key: Cell<i64>,
    calls: RefCell<Vec<RepositoryCall>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            primary_key: "id".to_string(),
            rows: RefCell::new(BTreeMap::new()),
            next_key: Cell::new(1),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Use a primary key field other than `"id"`.
    #[must_use]
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Start assigning keys from `key` instead of 1.
    #[must_use]
    pub fn with_next_key(self, key: i64) -> Self {
        self.next_key.set(key);
        self
    }

    /// Snapshot of a stored row.
    #[must_use]
    pub fn row(&self, key: i64) -> Option<Map> {
        self.rows.borrow().get(&key).cloned()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.borrow().len()
    }

    /// Every create/update issued against this repository, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RepositoryCall> {
        self.calls.borrow().clone()
    }

    const fn int_key(key: &Key) -> Option<i64> {
        match key {
            Key::Int(i) => Some(*i),
            Key::Text(_) => None,
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MemoryRepository {
    fn create(&self, data: &Map) -> Result<Map, RepositoryError> {
        self.calls
            .borrow_mut()
            .push(RepositoryCall::Create { data: data.clone() });

        let key = self.next_key.get();
        self.next_key.set(key + 1);

        let mut row = data.clone();
        row.insert(self.primary_key.clone(), Value::from(key));
        self.rows.borrow_mut().insert(key, row.clone());

        Ok(row)
    }

    fn update(&self, key: &Key, patch: &Map) -> Result<(), RepositoryError> {
        self.calls.borrow_mut().push(RepositoryCall::Update {
            key: key.clone(),
            patch: patch.clone(),
        });

        let int_key = Self::int_key(key).ok_or_else(|| RepositoryError::Rejected {
            operation: "update",
            message: format!("non-integer key {key}"),
        })?;

        let mut rows = self.rows.borrow_mut();
        let row = rows
            .get_mut(&int_key)
            .ok_or_else(|| RepositoryError::NotFound { key: key.clone() })?;
        for (field, value) in patch {
            row.insert(field.clone(), value.clone());
        }

        Ok(())
    }

    fn find(&self, key: &Key) -> Result<Option<Map>, RepositoryError> {
        Ok(Self::int_key(key).and_then(|k| self.rows.borrow().get(&k).cloned()))
    }
}
