//! Engine seams and the per-entity bundle the hierarchical composer works
//! with.

use crate::{
    de::GenericDeserializer,
    error::IntegrityError,
    id::{IdFactory, IdResolver},
    repo::RepositoryHandle,
    ser::GenericSerializer,
    template::Template,
    tree::Map,
};

///
/// SerializeEngine
///
/// Converts one entity's data into a portable tree. Implementations must be
/// stateless across runs; per-run state travels in the id factory.
///

pub trait SerializeEngine {
    fn serialize(
        &self,
        template: &Template,
        data: &Map,
        ids: &mut IdFactory,
    ) -> Result<Map, IntegrityError>;
}

///
/// DeserializeEngine
///
/// Materializes one entity from a portable tree, binding its internal id
/// and deferring reference patches on the shared resolver.
///

pub trait DeserializeEngine {
    #[allow(clippy::too_many_arguments)]
    fn deserialize(
        &self,
        template: &Template,
        repository: &RepositoryHandle,
        primary_key: &str,
        tree: &Map,
        inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, IntegrityError>;
}

///
/// EntityTemplate
///
/// One entity type's template, repository, and engine pair. The generic
/// engines cover the common case; special-purpose engines swap in per
/// entity type via the `with_*` builders.
///

pub struct EntityTemplate {
    template: Template,
    repository: RepositoryHandle,
    serializer: Box<dyn SerializeEngine>,
    deserializer: Box<dyn DeserializeEngine>,
    primary_key_field: String,
}

impl EntityTemplate {
    #[must_use]
    pub fn new(template: Template, repository: RepositoryHandle) -> Self {
        Self {
            template,
            repository,
            serializer: Box::new(GenericSerializer::new()),
            deserializer: Box::new(GenericDeserializer::new()),
            primary_key_field: "id".to_string(),
        }
    }

    #[must_use]
    pub fn with_serializer(mut self, serializer: impl SerializeEngine + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    #[must_use]
    pub fn with_deserializer(mut self, deserializer: impl DeserializeEngine + 'static) -> Self {
        self.deserializer = Box::new(deserializer);
        self
    }

    /// Override the repository row field holding the primary key.
    #[must_use]
    pub fn with_primary_key_field(mut self, field: impl Into<String>) -> Self {
        self.primary_key_field = field.into();
        self
    }

    #[must_use]
    pub const fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub const fn repository(&self) -> &RepositoryHandle {
        &self.repository
    }

    #[must_use]
    pub fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    /// The entity name declared by the template's id rule, if it has one.
    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        self.template.id_rule().map(|(_, entity)| entity)
    }

    pub fn serialize(&self, data: &Map, ids: &mut IdFactory) -> Result<Map, IntegrityError> {
        self.serializer.serialize(&self.template, data, ids)
    }

    pub fn deserialize(
        &self,
        tree: &Map,
        inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, IntegrityError> {
        self.deserializer.deserialize(
            &self.template,
            &self.repository,
            &self.primary_key_field,
            tree,
            inherited,
            resolver,
        )
    }
}
