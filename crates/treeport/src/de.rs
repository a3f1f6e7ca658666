//! The generic deserializer: materializes entities from a portable tree,
//! leaving placeholder values wherever a reference cannot be resolved yet.
//!
//! Creation and resolution are separate phases. This walk only creates the
//! entity and records its bindings and pending patches on the resolver; the
//! composer flushes the resolver once the whole tree exists, so references
//! may point forward as freely as backward.

use crate::{
    entity::DeserializeEngine,
    error::IntegrityError,
    id::{IdResolver, Key},
    repo::RepositoryHandle,
    rule::{Rule, RuleKind, TemplateNode},
    template::Template,
    tree::{self, ID_KEY, Map, REF_KEY},
};
use serde_json::Value;

/// A reference encountered during the walk, to be patched in during
/// resolution.
pub(crate) struct PendingRef {
    pub token: String,
    /// Dotted path from the entity root to the receiving field.
    pub path: String,
    pub fallback: Option<Value>,
}

/// Everything a single template walk produces: the entity data to create,
/// the internal id to bind, and the references to patch in later.
pub(crate) struct WalkOutcome {
    pub entity: Map,
    pub id_token: Option<String>,
    pub pending: Vec<PendingRef>,
}

/// Walk a portable tree against its template, without touching any
/// repository.
pub(crate) fn walk(
    template: &Template,
    tree: &Map,
    inherited: &Map,
) -> Result<WalkOutcome, IntegrityError> {
    let mut id_token = None;
    if let Some((_, entity)) = template.id_rule() {
        let token = tree
            .get(ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| IntegrityError::MissingIdMarker {
                entity: entity.to_string(),
            })?;
        id_token = Some(token.to_string());
    }

    let mut pending = Vec::new();
    let entity = walk_fields(template, tree, tree, inherited, "", &mut pending)?;

    Ok(WalkOutcome {
        entity,
        id_token,
        pending,
    })
}

fn walk_fields(
    template: &Template,
    data: &Map,
    root: &Map,
    inherited: &Map,
    path: &str,
    pending: &mut Vec<PendingRef>,
) -> Result<Map, IntegrityError> {
    let mut out = Map::new();

    for (field, node) in template {
        // A conditions rule may select a case that needs no tree data at
        // all; resolve it up front so those cases work on fields the
        // serialized form legitimately omits.
        let mut node = node;

        if let TemplateNode::Rule(rule) = node {
            match rule.kind() {
                // The id marker was consumed up front; child collections
                // belong to the composer.
                RuleKind::Id { .. } | RuleKind::HasMany { .. } => continue,

                RuleKind::Inherits { fields } => {
                    out.insert(field.to_string(), inherit(fields, inherited, field)?);
                    continue;
                }

                RuleKind::Increments { .. } => {
                    out.insert(field.to_string(), increment(inherited, field)?);
                    continue;
                }

                RuleKind::Conditions {
                    field: discriminator,
                    cases,
                    default,
                } => {
                    let selected = select_case(discriminator, cases, default.as_deref(), root)?;
                    if let Some(inner) = selected.as_rule() {
                        match inner.kind() {
                            RuleKind::Inherits { fields } => {
                                out.insert(field.to_string(), inherit(fields, inherited, field)?);
                                continue;
                            }
                            RuleKind::Increments { .. } => {
                                out.insert(field.to_string(), increment(inherited, field)?);
                                continue;
                            }
                            _ => {}
                        }
                    }
                    node = selected;
                }

                _ => {}
            }

            if rule.is_optional() && !data.contains_key(field) {
                continue;
            }
        }

        if let TemplateNode::Constant(value) = node {
            out.insert(field.to_string(), value.clone());
            continue;
        }

        let value = data
            .get(field)
            .ok_or_else(|| IntegrityError::RequiredFieldMissing {
                field: field.to_string(),
            })?;

        let converted = walk_node(
            node,
            value,
            root,
            inherited,
            &tree::join_paths(path, field),
            pending,
        )?;
        out.insert(field.to_string(), converted);
    }

    Ok(out)
}

/// Pick the conditions case matching the root discriminator value.
fn select_case<'a>(
    discriminator: &str,
    cases: &'a [(String, TemplateNode)],
    default: Option<&'a TemplateNode>,
    root: &Map,
) -> Result<&'a TemplateNode, IntegrityError> {
    let value = root
        .get(discriminator)
        .ok_or_else(|| IntegrityError::RequiredConditionsFieldMissing {
            field: discriminator.to_string(),
        })?;

    for (label, case_node) in cases {
        if tree::loose_case_eq(value, label) {
            return Ok(case_node);
        }
    }
    default.ok_or_else(|| IntegrityError::NoConditionsMatched {
        field: discriminator.to_string(),
    })
}

fn walk_node(
    node: &TemplateNode,
    data: &Value,
    root: &Map,
    inherited: &Map,
    path: &str,
    pending: &mut Vec<PendingRef>,
) -> Result<Value, IntegrityError> {
    match node {
        TemplateNode::Constant(value) => Ok(value.clone()),

        TemplateNode::Nested(template) => {
            let fields = data
                .as_object()
                .ok_or_else(|| IntegrityError::StructureMismatch {
                    path: path.to_string(),
                    expected: "an object",
                })?;
            let nested = walk_fields(template, fields, root, inherited, path, pending)?;

            Ok(Value::Object(nested))
        }

        TemplateNode::Rule(rule) => walk_rule(rule, data, root, inherited, path, pending),
    }
}

fn walk_rule(
    rule: &Rule,
    data: &Value,
    root: &Map,
    inherited: &Map,
    path: &str,
    pending: &mut Vec<PendingRef>,
) -> Result<Value, IntegrityError> {
    match rule.kind() {
        RuleKind::Value => Ok(data.clone()),

        RuleKind::Id { .. } | RuleKind::HasMany { .. } => Err(IntegrityError::InvalidRule {
            path: path.to_string(),
        }),

        // A conditions case can select either of these at leaf position.
        RuleKind::Inherits { fields } => inherit(fields, inherited, last_segment(path)),
        RuleKind::Increments { .. } => increment(inherited, last_segment(path)),

        RuleKind::References { fallback, .. } => {
            deserialize_reference(rule, fallback.as_ref(), data, path, pending)
        }

        RuleKind::Conditions {
            field,
            cases,
            default,
        } => {
            let selected = select_case(field, cases, default.as_deref(), root)?;
            walk_node(selected, data, root, inherited, path, pending)
        }

        RuleKind::Deep { finders } => {
            let mut rewritten = data.clone();
            let leaves = fold_refs(tree::flatten(data));

            for (pattern, finder_rule) in finders {
                for (leaf_path, leaf_value) in &leaves {
                    if !pattern.is_match(leaf_path) {
                        continue;
                    }
                    let replaced = walk_rule(
                        finder_rule,
                        leaf_value,
                        root,
                        inherited,
                        &tree::join_paths(path, leaf_path),
                        pending,
                    )?;
                    if leaf_path.is_empty() {
                        rewritten = replaced;
                    } else {
                        tree::set_path(&mut rewritten, leaf_path, replaced);
                    }
                }
            }

            Ok(rewritten)
        }
    }
}

fn deserialize_reference(
    rule: &Rule,
    fallback: Option<&Value>,
    data: &Value,
    path: &str,
    pending: &mut Vec<PendingRef>,
) -> Result<Value, IntegrityError> {
    if data.is_null() {
        if rule.is_nullable() {
            return Ok(Value::Null);
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
                expected: "a list of references",
            })?;

        let mut placeholders = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let item_path = tree::join_paths(path, &index.to_string());
            if item.is_null() && rule.is_nullable() {
                placeholders.push(Value::Null);
                continue;
            }
            placeholders.push(pend_reference(item, &item_path, fallback, pending)?);
        }

        return Ok(Value::Array(placeholders));
    }

    pend_reference(data, path, fallback, pending)
}

/// Record the pending patch and return the placeholder to store until the
/// target entity exists.
fn pend_reference(
    data: &Value,
    path: &str,
    fallback: Option<&Value>,
    pending: &mut Vec<PendingRef>,
) -> Result<Value, IntegrityError> {
    let token = tree::ref_token(data).ok_or_else(|| IntegrityError::MalformedReference {
        path: path.to_string(),
    })?;

    pending.push(PendingRef {
        token: token.to_string(),
        path: path.to_string(),
        fallback: fallback.cloned(),
    });

    Ok(fallback.cloned().unwrap_or_else(|| Value::from(0)))
}

fn inherit(sources: &[String], inherited: &Map, field: &str) -> Result<Value, IntegrityError> {
    sources
        .iter()
        .find_map(|source| inherited.get(source))
        .cloned()
        .ok_or_else(|| IntegrityError::MissingInheritedField {
            field: field.to_string(),
        })
}

fn increment(inherited: &Map, field: &str) -> Result<Value, IntegrityError> {
    inherited
        .get(&format!("@{field}"))
        .cloned()
        .ok_or_else(|| IntegrityError::MissingIncrementCounter {
            field: field.to_string(),
        })
}

fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// Fold `{"_ref": token}` objects back into single leaves.
///
/// Flattening splits a reference object into a `…field._ref` leaf; the
/// finder patterns address `…field`, so each such leaf is rewritten one
/// segment up with the reference object restored.
fn fold_refs(leaves: Vec<(String, Value)>) -> Vec<(String, Value)> {
    leaves
        .into_iter()
        .map(|(path, value)| {
            if path == REF_KEY {
                return (String::new(), tree_ref(value));
            }
            match path.strip_suffix(&format!(".{REF_KEY}")) {
                Some(parent) => (parent.to_string(), tree_ref(value)),
                None => (path, value),
            }
        })
        .collect()
}

fn tree_ref(token: Value) -> Value {
    match token.as_str() {
        Some(token) => tree::make_ref(token),
        // Not a reference after all; keep the original shape.
        None => {
            let mut object = Map::new();
            object.insert(REF_KEY.to_string(), token);
            Value::Object(object)
        }
    }
}

///
/// GenericDeserializer
///
/// Creates the entity through its repository, binds its internal id, and
/// defers every recorded reference patch.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GenericDeserializer;

impl GenericDeserializer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn deserialize(
        &self,
        template: &Template,
        repository: &RepositoryHandle,
        primary_key: &str,
        tree: &Map,
        inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, IntegrityError> {
        let outcome = walk(template, tree, inherited)?;

        let created = repository.create(&outcome.entity)?;
        let key_value =
            created
                .get(primary_key)
                .ok_or_else(|| IntegrityError::MissingPrimaryKey {
                    field: primary_key.to_string(),
                })?;
        let key = Key::from_value(key_value).ok_or_else(|| IntegrityError::InvalidKey {
            path: primary_key.to_string(),
        })?;

        if let Some(token) = outcome.id_token {
            resolver.bind(&token, key.clone())?;
        }
        for reference in outcome.pending {
            resolver.defer(
                reference.token,
                repository.clone(),
                key.clone(),
                reference.path,
                created.clone(),
                reference.fallback,
            );
        }

        Ok(created)
    }
}

impl DeserializeEngine for GenericDeserializer {
    fn deserialize(
        &self,
        template: &Template,
        repository: &RepositoryHandle,
        primary_key: &str,
        tree: &Map,
        inherited: &Map,
        resolver: &mut IdResolver,
    ) -> Result<Map, IntegrityError> {
        Self::deserialize(
            self, template, repository, primary_key, tree, inherited, resolver,
        )
    }
}
