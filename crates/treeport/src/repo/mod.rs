//! The persistence seam. The engines drive repositories but never own
//! them: creation happens depth-first during deserialization, and the
//! resolver issues consolidated partial updates afterwards.

pub mod memory;

pub use memory::{MemoryRepository, RepositoryCall};

use crate::{id::Key, tree::Map};
use std::rc::Rc;
use thiserror::Error as ThisError;

///
/// RepositoryError
///
/// Failure surface of a repository collaborator. The engines propagate
/// these untouched; no retries, no rollback.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RepositoryError {
    #[error("repository rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("no entity with key {key}")]
    NotFound { key: Key },
}

///
/// Repository
///
/// Implemented by the host application. `create` must return a record
/// containing the primary key field; `update` applies a partial patch to
/// an existing record.
///

pub trait Repository {
    fn create(&self, data: &Map) -> Result<Map, RepositoryError>;

    fn update(&self, key: &Key, patch: &Map) -> Result<(), RepositoryError>;

    fn find(&self, key: &Key) -> Result<Option<Map>, RepositoryError>;
}

/// Shared handle to a repository instance. Deferred patches group by
/// handle identity, so keep cloning the same handle for the same backing
/// store within a run.
pub type RepositoryHandle = Rc<dyn Repository>;
