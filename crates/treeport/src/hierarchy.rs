//! Hierarchical composition: whole entity trees serialized and
//! materialized through a registry of per-entity templates.

use crate::{
    entity::EntityTemplate,
    error::CompositionError,
    id::{IdFactory, IdResolver, Key},
    trace::{MapTraceEvent, MapTraceSink},
    tree::Map,
};
use serde_json::Value;
use std::{collections::BTreeMap, rc::Rc};

///
/// HierarchicalTemplate
///
/// Registry of entity templates keyed by entity name. `HasMany` fields in a
/// template name child entity types; serialization and deserialization
/// recurse through them, so one call handles an arbitrarily deep tree.
/// Deserialization creates every entity first and flushes the shared
/// resolver once, which is what makes forward references legal.
///

#[derive(Default)]
pub struct HierarchicalTemplate {
    registry: BTreeMap<String, EntityTemplate>,
    trace: Option<Rc<dyn MapTraceSink>>,
}

impl HierarchicalTemplate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer for entity creation and resolution events.
    #[must_use]
    pub fn with_trace(mut self, sink: Rc<dyn MapTraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    fn emit(&self, event: MapTraceEvent) {
        if let Some(sink) = &self.trace {
            sink.on_event(event);
        }
    }

    /// Register an entity template under the entity name its id rule
    /// declares.
    pub fn register(&mut self, template: EntityTemplate) -> Result<(), CompositionError> {
        let Some(entity) = template.entity_name() else {
            return Err(CompositionError::MissingIdRule);
        };
        let entity = entity.to_string();

        if self.registry.contains_key(&entity) {
            return Err(CompositionError::DuplicateRegistration { entity });
        }
        self.registry.insert(entity, template);

        Ok(())
    }

    fn lookup(&self, entity: &str) -> Result<&EntityTemplate, CompositionError> {
        self.registry
            .get(entity)
            .ok_or_else(|| CompositionError::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    /// Serialize an entity and its whole child tree into one portable tree,
    /// with internal ids numbered from a fresh factory.
    pub fn serialize(&self, entity: &str, data: &Map) -> Result<Map, CompositionError> {
        let mut ids = IdFactory::new();
        self.serialize_with(entity, data, &mut ids)
    }

    /// Like [`serialize`](Self::serialize), sharing an existing id factory so
    /// several trees can be serialized with consistent tokens.
    pub fn serialize_with(
        &self,
        entity: &str,
        data: &Map,
        ids: &mut IdFactory,
    ) -> Result<Map, CompositionError> {
        self.serialize_relations(self.lookup(entity)?, data, ids)
    }

    fn serialize_relations(
        &self,
        template: &EntityTemplate,
        data: &Map,
        ids: &mut IdFactory,
    ) -> Result<Map, CompositionError> {
        let mut tree = template.serialize(data, ids)?;

        for (field, related, rule) in template.template().has_many_rules() {
            let related_template = self.lookup(related)?;

            let Some(children) = data.get(field) else {
                if rule.is_optional() {
                    continue;
                }
                return Err(CompositionError::MissingRelationData {
                    entity: related.to_string(),
                    field: field.to_string(),
                });
            };
            let children = children
                .as_array()
                .ok_or_else(|| CompositionError::RelationNotAList {
                    field: field.to_string(),
                })?;

            let mut serialized = Vec::with_capacity(children.len());
            for child in children {
                let child = child
                    .as_object()
                    .ok_or_else(|| CompositionError::RelationNotAList {
                        field: field.to_string(),
                    })?;
                serialized.push(Value::Object(
                    self.serialize_relations(related_template, child, ids)?,
                ));
            }
            tree.insert(field.to_string(), Value::Array(serialized));
        }

        Ok(tree)
    }

    /// Materialize a portable tree: create every entity depth-first, then
    /// resolve all deferred reference patches in one pass.
    ///
    /// Returns the created entity data with child collections attached under
    /// their `HasMany` fields, as created; reference patches land in the
    /// repositories, not in the returned tree.
    pub fn deserialize(&self, entity: &str, tree: &Map) -> Result<Map, CompositionError> {
        let mut resolver = IdResolver::new();
        if let Some(sink) = &self.trace {
            resolver = resolver.with_trace(Rc::clone(sink));
        }

        let created = self.deserialize_relations(entity, tree, &Map::new(), &mut resolver)?;
        resolver.resolve()?;

        Ok(created)
    }

    fn deserialize_relations(
        &self,
        entity: &str,
        tree: &Map,
        inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, CompositionError> {
        let template = self.lookup(entity)?;
        let created = template.deserialize(tree, inherited, resolver)?;

        self.emit(MapTraceEvent::EntityCreated {
            entity: entity.to_string(),
            key: created
                .get(template.primary_key_field())
                .and_then(Key::from_value),
        });

        let mut out = created.clone();
        for (field, related, rule) in template.template().has_many_rules() {
            let Some(children) = tree.get(field) else {
                if rule.is_optional() {
                    continue;
                }
                return Err(CompositionError::MissingRelationData {
                    entity: related.to_string(),
                    field: field.to_string(),
                });
            };
            let children = children
                .as_array()
                .ok_or_else(|| CompositionError::RelationNotAList {
                    field: field.to_string(),
                })?;

            // Counters the children draw their increment fields from,
            // advanced across siblings.
            let mut counters: Vec<(String, i64, i64)> = self
                .lookup(related)?
                .template()
                .increment_rules()
                .map(|(field, start, step)| (field.to_string(), start, step))
                .collect();

            let mut deserialized = Vec::with_capacity(children.len());
            for child in children {
                let child = child
                    .as_object()
                    .ok_or_else(|| CompositionError::RelationNotAList {
                        field: field.to_string(),
                    })?;

                // Children inherit from the parent's created record, never
                // from the parent's own inherited scope.
                let mut child_inherited = created.clone();
                for (counter_field, current, step) in &mut counters {
                    child_inherited.insert(format!("@{counter_field}"), Value::from(*current));
                    *current += *step;
                }

                deserialized.push(Value::Object(self.deserialize_relations(
                    related,
                    child,
                    &child_inherited,
                    resolver,
                )?));
            }
            out.insert(field.to_string(), Value::Array(deserialized));
        }

        Ok(out)
    }
}
