//! Mapping trace boundary.
//!
//! Tracing is optional, injected by the caller, and must not affect
//! mapping semantics.

use crate::id::Key;

///
/// MapTraceSink
///

pub trait MapTraceSink {
    fn on_event(&self, event: MapTraceEvent);
}

///
/// MapTraceEvent
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MapTraceEvent {
    /// An entity row was created during a hierarchical deserialize.
    EntityCreated { entity: String, key: Option<Key> },

    /// A reference patch was recorded for the resolution pass.
    ReferenceDeferred { token: String, path: String },

    /// One consolidated update was issued for a primary key.
    PatchApplied { key: Key, fields: usize },

    /// The resolution pass completed.
    ResolveFinished { patches: usize, handlers: usize },
}
