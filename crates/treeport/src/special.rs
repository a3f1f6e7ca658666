//! Special-purpose engines for entities that exist on both sides of a
//! transfer: bind-only deserialization, key-only serialization, and
//! update-in-place deserialization.

use crate::{
    de,
    entity::{DeserializeEngine, SerializeEngine},
    error::IntegrityError,
    id::{IdFactory, IdResolver, Key},
    repo::{RepositoryError, RepositoryHandle},
    template::Template,
    tree::{ID_KEY, Map},
};
use serde_json::Value;
use std::cell::RefCell;

///
/// PreExistingEntityDeserializer
///
/// Never touches the repository: the entity already exists on the importing
/// side, so deserialization only binds the tree's internal id to the
/// primary key carried alongside it. References to the entity then resolve
/// like any other.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PreExistingEntityDeserializer;

impl PreExistingEntityDeserializer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DeserializeEngine for PreExistingEntityDeserializer {
    fn deserialize(
        &self,
        template: &Template,
        _repository: &RepositoryHandle,
        primary_key: &str,
        tree: &Map,
        _inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, IntegrityError> {
        let (_, entity) = template.id_rule().ok_or(IntegrityError::MissingIdRule)?;

        let token = tree
            .get(ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| IntegrityError::MissingIdMarker {
                entity: entity.to_string(),
            })?;
        let key_value = tree
            .get(primary_key)
            .ok_or_else(|| IntegrityError::MissingPrimaryKey {
                field: primary_key.to_string(),
            })?;
        let key = Key::from_value(key_value).ok_or_else(|| IntegrityError::InvalidKey {
            path: primary_key.to_string(),
        })?;

        resolver.bind(token, key)?;

        let mut out = Map::new();
        out.insert(primary_key.to_string(), key_value.clone());

        Ok(out)
    }
}

///
/// PreservingIdSerializer
///
/// Counterpart export form: only the internal id token and the raw primary
/// key, so the importing side can bind without recreating anything.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct PreservingIdSerializer;

impl PreservingIdSerializer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SerializeEngine for PreservingIdSerializer {
    fn serialize(
        &self,
        template: &Template,
        data: &Map,
        ids: &mut IdFactory,
    ) -> Result<Map, IntegrityError> {
        let (field, entity) = template.id_rule().ok_or(IntegrityError::MissingIdRule)?;

        let value = data
            .get(field)
            .ok_or_else(|| IntegrityError::RequiredFieldMissing {
                field: field.to_string(),
            })?;
        let key = Key::from_value(value).ok_or_else(|| IntegrityError::InvalidKey {
            path: field.to_string(),
        })?;

        let mut out = Map::new();
        out.insert(ID_KEY.to_string(), Value::String(ids.get(entity, &key)));
        out.insert(field.to_string(), value.clone());

        Ok(out)
    }
}

///
/// UpdatingDeserializer
///
/// Walks the template like the generic engine but updates an existing
/// record instead of creating one. The target primary key must be set
/// before each use; it is consumed by the call.
///

#[derive(Debug, Default)]
pub struct UpdatingDeserializer {
    primary_key: RefCell<Option<Key>>,
}

impl UpdatingDeserializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary key of the record the next deserialize call updates.
    pub fn set_primary_key(&self, key: impl Into<Key>) {
        *self.primary_key.borrow_mut() = Some(key.into());
    }
}

impl DeserializeEngine for UpdatingDeserializer {
    fn deserialize(
        &self,
        template: &Template,
        repository: &RepositoryHandle,
        _primary_key_field: &str,
        tree: &Map,
        inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, IntegrityError> {
        let key = self
            .primary_key
            .borrow_mut()
            .take()
            .ok_or(IntegrityError::UpdateKeyNotSet)?;

        let outcome = de::walk(template, tree, inherited)?;

        repository.update(&key, &outcome.entity)?;
        let updated = repository
            .find(&key)?
            .ok_or_else(|| RepositoryError::NotFound { key: key.clone() })?;

        if let Some(token) = outcome.id_token {
            resolver.bind(&token, key.clone())?;
        }
        for reference in outcome.pending {
            resolver.defer(
                reference.token,
                repository.clone(),
                key.clone(),
                reference.path,
                updated.clone(),
                reference.fallback,
            );
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::Rules,
        repo::{MemoryRepository, Repository},
    };
    use serde_json::json;
    use std::rc::Rc;

    fn as_map(value: Value) -> Map {
        value.as_object().expect("fixture must be an object").clone()
    }

    #[test]
    fn pre_existing_entities_bind_without_repository_calls() {
        let t = Rules::new();
        let template = Template::new().field("id", t.id("resources"));
        let repo = Rc::new(MemoryRepository::new());
        let handle: RepositoryHandle = repo.clone();
        let mut resolver = IdResolver::new();

        let out = PreExistingEntityDeserializer::new()
            .deserialize(
                &template,
                &handle,
                "id",
                &as_map(json!({"_id": "resources_0", "id": 42})),
                &Map::new(),
                &mut resolver,
            )
            .expect("deserialize");

        assert_eq!(Value::Object(out), json!({"id": 42}));
        assert!(repo.calls().is_empty());

        // The binding is live for reference resolution.
        let err = resolver.bind("resources_0", Key::Int(43)).expect_err("already bound");
        assert!(matches!(err, IntegrityError::AlreadyBound { .. }));
    }

    #[test]
    fn pre_existing_without_primary_key_fails() {
        let t = Rules::new();
        let template = Template::new().field("id", t.id("resources"));
        let handle: RepositoryHandle = Rc::new(MemoryRepository::new());
        let mut resolver = IdResolver::new();

        let err = PreExistingEntityDeserializer::new()
            .deserialize(
                &template,
                &handle,
                "id",
                &as_map(json!({"_id": "resources_0"})),
                &Map::new(),
                &mut resolver,
            )
            .expect_err("must fail");
        assert!(matches!(err, IntegrityError::MissingPrimaryKey { field } if field == "id"));
    }

    #[test]
    fn preserving_serializer_emits_token_and_raw_key() {
        let t = Rules::new();
        let template = Template::new()
            .field("id", t.id("resources"))
            .field("val", t.value());
        let mut ids = IdFactory::new();

        let out = PreservingIdSerializer::new()
            .serialize(&template, &as_map(json!({"id": 42, "val": "dropped"})), &mut ids)
            .expect("serialize");

        assert_eq!(Value::Object(out), json!({"_id": "resources_0", "id": 42}));
    }

    #[test]
    fn updating_deserializer_patches_an_existing_record() {
        let t = Rules::new();
        let template = Template::new()
            .field("id", t.id("pages"))
            .field("val", t.value())
            .field("menu_id", t.references("menus"));

        let repo = Rc::new(MemoryRepository::new());
        let handle: RepositoryHandle = repo.clone();
        repo.create(&as_map(json!({"val": "old", "menu_id": 0, "kept": true})))
            .expect("seed record");

        let mut resolver = IdResolver::new();
        let engine = UpdatingDeserializer::new();
        engine.set_primary_key(1i64);

        let updated = engine
            .deserialize(
                &template,
                &handle,
                "id",
                &as_map(json!({"_id": "pages_0", "val": "new", "menu_id": {"_ref": "menus_1"}})),
                &Map::new(),
                &mut resolver,
            )
            .expect("deserialize");

        assert_eq!(updated.get("val"), Some(&json!("new")));
        assert_eq!(updated.get("kept"), Some(&json!(true)));

        resolver.bind("menus_1", Key::Int(9)).expect("bind menu");
        resolver.resolve().expect("resolve");
        assert_eq!(
            repo.row(1).and_then(|row| row.get("menu_id").cloned()),
            Some(json!(9))
        );
    }

    #[test]
    fn updating_deserializer_requires_a_primary_key_each_call() {
        let t = Rules::new();
        let template = Template::new().field("id", t.id("pages")).field("val", t.value());
        let repo = Rc::new(MemoryRepository::new());
        let handle: RepositoryHandle = repo.clone();
        repo.create(&as_map(json!({"val": "old"}))).expect("seed record");

        let engine = UpdatingDeserializer::new();
        engine.set_primary_key(1i64);

        let mut resolver = IdResolver::new();
        engine
            .deserialize(
                &template,
                &handle,
                "id",
                &as_map(json!({"_id": "pages_0", "val": "new"})),
                &Map::new(),
                &mut resolver,
            )
            .expect("first call");

        // The key was consumed; a second call must be armed again.
        let err = engine
            .deserialize(
                &template,
                &handle,
                "id",
                &as_map(json!({"_id": "pages_1", "val": "newer"})),
                &Map::new(),
                &mut resolver,
            )
            .expect_err("must fail");
        assert!(matches!(err, IntegrityError::UpdateKeyNotSet));
    }
}
