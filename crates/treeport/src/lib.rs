//! Template-driven bidirectional mapper between normalized entity rows and a
//! portable `_id`/`_ref`-annotated tree.
//!
//! A template describes an entity type once (primary key, plain values,
//! references to other entities, conditional sub-schemas, regex-addressed
//! deep rewrites, and child collections) and both directions are driven
//! from that single description: rows serialize into a portable tree, and a
//! portable tree deserializes into repository create calls plus a second
//! reference-resolution pass that patches cross-entity keys once every
//! entity exists.

pub mod builder;
pub mod de;
pub mod entity;
pub mod error;
pub mod format;
pub mod hierarchy;
pub mod id;
pub mod repo;
pub mod rule;
pub mod ser;
pub mod special;
pub mod template;
pub mod trace;
pub mod tree;

///
/// Prelude
///
/// Prelude contains only domain vocabulary; engine internals stay one
/// module level down.
///

pub mod prelude {
    pub use crate::{
        builder::Rules,
        de::GenericDeserializer,
        entity::EntityTemplate,
        error::{CompositionError, IntegrityError},
        hierarchy::HierarchicalTemplate,
        id::{IdFactory, IdResolver, Key},
        repo::{MemoryRepository, Repository, RepositoryHandle},
        rule::{Rule, TemplateNode},
        ser::GenericSerializer,
        template::Template,
        tree::{ID_KEY, Map, REF_KEY},
    };
}
