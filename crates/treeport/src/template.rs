//! Templates: one immutable, declaration-ordered description of an entity
//! type's shape, shared by both engines and the hierarchical composer.

use crate::rule::{Rule, TemplateNode};

///
/// Template
///
/// Mapping from field name to node, preserving declaration order (internal
/// id tokens are numbered in walk order, so order is part of the observable
/// output of a serialization run).
///

#[derive(Clone, Debug, Default)]
pub struct Template {
    fields: Vec<(String, TemplateNode)>,
}

impl Template {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field. Later declarations of the same name shadow earlier
    /// ones on lookup but are not deduplicated.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, node: impl Into<TemplateNode>) -> Self {
        self.fields.push((name.into(), node.into()));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TemplateNode> {
        self.fields
            .iter()
            .rev()
            .find(|(field, _)| field == name)
            .map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TemplateNode)> {
        self.fields.iter().map(|(name, node)| (name.as_str(), node))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The field carrying this template's `Id` rule, with its entity name.
    #[must_use]
    pub fn id_rule(&self) -> Option<(&str, &str)> {
        self.iter().find_map(|(field, node)| {
            let entity = node.as_rule()?.id_entity()?;
            Some((field, entity))
        })
    }

    /// All `HasMany` fields with their related entity names and rules.
    pub fn has_many_rules(&self) -> impl Iterator<Item = (&str, &str, &Rule)> {
        self.iter().filter_map(|(field, node)| {
            let rule = node.as_rule()?;
            let entity = rule.has_many_entity()?;
            Some((field, entity, rule))
        })
    }

    /// All `Increments` fields with their start and step values.
    pub fn increment_rules(&self) -> impl Iterator<Item = (&str, i64, i64)> {
        self.iter().filter_map(|(field, node)| match node.as_rule()?.kind() {
            crate::rule::RuleKind::Increments { start, step } => Some((field, *start, *step)),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a Template {
    type Item = (&'a str, &'a TemplateNode);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a TemplateNode)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
