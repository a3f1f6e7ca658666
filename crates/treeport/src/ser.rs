//! The generic serializer: a lock-step walk of a template and an entity's
//! data, producing the portable tree.

use crate::{
    entity::SerializeEngine,
    error::IntegrityError,
    id::{IdFactory, Key},
    rule::{Rule, RuleKind, TemplateNode},
    template::Template,
    tree::{self, ID_KEY, Map},
};
use serde_json::Value;

///
/// GenericSerializer
///
/// Stateless; per-run state (the id factory) is threaded through the call.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GenericSerializer;

impl GenericSerializer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Serialize entity data into a portable tree according to the template.
    pub fn serialize(
        &self,
        template: &Template,
        data: &Map,
        ids: &mut IdFactory,
    ) -> Result<Map, IntegrityError> {
        self.walk_fields(template, data, data, "", ids)
    }

    fn walk_fields(
        &self,
        template: &Template,
        data: &Map,
        root: &Map,
        path: &str,
        ids: &mut IdFactory,
    ) -> Result<Map, IntegrityError> {
        let mut out = Map::new();

        for (field, node) in template {
            if let TemplateNode::Rule(rule) = node {
                match rule.kind() {
                    // Handled by the hierarchical composer, or derived on
                    // the importing side; never part of the portable tree.
                    RuleKind::HasMany { .. }
                    | RuleKind::Inherits { .. }
                    | RuleKind::Increments { .. } => continue,

                    // The primary key folds into the `_id` marker.
                    RuleKind::Id { entity } => {
                        let value =
                            data.get(field)
                                .ok_or_else(|| IntegrityError::RequiredFieldMissing {
                                    field: field.to_string(),
                                })?;
                        let key = Key::from_value(value).ok_or_else(|| {
                            IntegrityError::InvalidKey {
                                path: tree::join_paths(path, field),
                            }
                        })?;
                        out.insert(ID_KEY.to_string(), Value::String(ids.get(entity, &key)));
                        continue;
                    }

                    _ => {}
                }

                if rule.is_optional() && !data.contains_key(field) {
                    continue;
                }
            }

            // Constants bypass the data entirely.
            if let TemplateNode::Constant(value) = node {
                out.insert(field.to_string(), value.clone());
                continue;
            }

            let value = data
                .get(field)
                .ok_or_else(|| IntegrityError::RequiredFieldMissing {
                    field: field.to_string(),
                })?;

            let converted =
                self.walk_node(node, value, root, &tree::join_paths(path, field), ids)?;
            if let Some(converted) = converted {
                out.insert(field.to_string(), converted);
            }
        }

        Ok(out)
    }

    fn walk_node(
        &self,
        node: &TemplateNode,
        data: &Value,
        root: &Map,
        path: &str,
        ids: &mut IdFactory,
    ) -> Result<Option<Value>, IntegrityError> {
        match node {
            TemplateNode::Constant(value) => Ok(Some(value.clone())),

            TemplateNode::Nested(template) => {
                let fields = data
                    .as_object()
                    .ok_or_else(|| IntegrityError::StructureMismatch {
                        path: path.to_string(),
                        expected: "an object",
                    })?;
                let nested = self.walk_fields(template, fields, root, path, ids)?;

                Ok(Some(Value::Object(nested)))
            }

            TemplateNode::Rule(rule) => self.walk_rule(rule, data, root, path, ids),
        }
    }

    fn walk_rule(
        &self,
        rule: &Rule,
        data: &Value,
        root: &Map,
        path: &str,
        ids: &mut IdFactory,
    ) -> Result<Option<Value>, IntegrityError> {
        match rule.kind() {
            RuleKind::Value => Ok(Some(data.clone())),

            // A conditions case can select one of these; the surrounding
            // field is then omitted from the portable tree.
            RuleKind::HasMany { .. } | RuleKind::Inherits { .. } | RuleKind::Increments { .. } => {
                Ok(None)
            }

            // An id rule is only meaningful at the top of a template.
            RuleKind::Id { .. } => Err(IntegrityError::InvalidRule {
                path: path.to_string(),
            }),

            RuleKind::References { entity, .. } => {
                self.serialize_reference(rule, entity, data, path, ids)
            }

            RuleKind::Conditions {
                field,
                cases,
                default,
            } => {
                let discriminator =
                    root.get(field)
                        .ok_or_else(|| IntegrityError::RequiredConditionsFieldMissing {
                            field: field.to_string(),
                        })?;

                for (label, case_node) in cases {
                    if tree::loose_case_eq(discriminator, label) {
                        return self.walk_node(case_node, data, root, path, ids);
                    }
                }
                match default {
                    Some(case_node) => self.walk_node(case_node, data, root, path, ids),
                    None => Err(IntegrityError::NoConditionsMatched {
                        field: field.to_string(),
                    }),
                }
            }

            RuleKind::Deep { finders } => {
                // Finders run against the original flattening; only matched
                // leaves are rewritten in the copy.
                let mut rewritten = data.clone();
                let leaves = tree::flatten(data);

                for (pattern, finder_rule) in finders {
                    for (leaf_path, leaf_value) in &leaves {
                        if !pattern.is_match(leaf_path) {
                            continue;
                        }
                        let replaced = self.walk_rule(
                            finder_rule,
                            leaf_value,
                            root,
                            &tree::join_paths(path, leaf_path),
                            ids,
                        )?;
                        if let Some(replaced) = replaced {
                            if leaf_path.is_empty() {
                                rewritten = replaced;
                            } else {
                                tree::set_path(&mut rewritten, leaf_path, replaced);
                            }
                        }
                    }
                }

                Ok(Some(rewritten))
            }
        }
    }

    fn serialize_reference(
        &self,
        rule: &Rule,
        entity: &str,
        data: &Value,
        path: &str,
        ids: &mut IdFactory,
    ) -> Result<Option<Value>, IntegrityError> {
        if data.is_null() {
            if rule.is_nullable() {
                return Ok(Some(Value::Null));
            }
            return Err(IntegrityError::NullReference {
                path: path.to_string(),
            });
        }

        if rule.is_collection() {
            let items = data
                .as_array()
                .ok_or_else(|| IntegrityError::StructureMismatch {
                    path: path.to_string(),
                    expected: "a list of entity keys",
                })?;

            let mut refs = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item_path = tree::join_paths(path, &index.to_string());
                if item.is_null() && rule.is_nullable() {
                    refs.push(Value::Null);
                    continue;
                }
                let key = Key::from_value(item)
                    .ok_or(IntegrityError::InvalidKey { path: item_path })?;
                refs.push(tree::make_ref(&ids.get(entity, &key)));
            }

            return Ok(Some(Value::Array(refs)));
        }

        let key = Key::from_value(data).ok_or_else(|| IntegrityError::InvalidKey {
            path: path.to_string(),
        })?;

        Ok(Some(tree::make_ref(&ids.get(entity, &key))))
    }
}

impl SerializeEngine for GenericSerializer {
    fn serialize(
        &self,
        template: &Template,
        data: &Map,
        ids: &mut IdFactory,
    ) -> Result<Map, IntegrityError> {
        Self::serialize(self, template, data, ids)
    }
}
