//! The rule model: every template field maps onto exactly one of a closed
//! set of behaviors, plus three orthogonal modifier flags. Both engines
//! consume rules through exhaustive matches, so adding a kind forces every
//! walk site to take a position on it.

use crate::template::Template;
use regex::Regex;
use serde_json::Value;

///
/// RuleModifiers
///
/// Orthogonal flags applied to a rule independent of its kind.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RuleModifiers {
    /// Field may be absent from the data; the walk skips it silently.
    pub optional: bool,
    /// The data value is a sequence whose elements convert independently.
    pub collection: bool,
    /// A null data value short-circuits to null instead of converting.
    pub nullable: bool,
}

///
/// RuleKind
///
/// The closed set of field behaviors a template can declare.
///

#[derive(Clone, Debug)]
pub enum RuleKind {
    /// Primary key; folded into the portable tree's `_id` marker.
    Id { entity: String },

    /// Passed through unchanged in both directions.
    Value,

    /// Foreign key to another entity, carried as `{"_ref": token}`.
    References {
        entity: String,
        fallback: Option<Value>,
    },

    /// Dispatch on a sibling discriminator field at the root of the entity.
    Conditions {
        field: String,
        cases: Vec<(String, TemplateNode)>,
        default: Option<Box<TemplateNode>>,
    },

    /// Regex finders applied against the dotted-path flattening of an
    /// arbitrarily nested sub-value; non-matching leaves pass through.
    Deep { finders: Vec<(Regex, Rule)> },

    /// Child collection; walked by the hierarchical composer, skipped by
    /// the generic engines.
    HasMany { entity: String },

    /// Looked up in the values inherited from the parent during a
    /// hierarchical walk, first present field wins.
    Inherits { fields: Vec<String> },

    /// Running counter supplied by the parent across siblings of a
    /// has-many collection.
    Increments { start: i64, step: i64 },
}

///
/// Rule
///

#[derive(Clone, Debug)]
pub struct Rule {
    kind: RuleKind,
    modifiers: RuleModifiers,
}

impl Rule {
    #[must_use]
    pub const fn new(kind: RuleKind, modifiers: RuleModifiers) -> Self {
        Self { kind, modifiers }
    }

    #[must_use]
    pub const fn kind(&self) -> &RuleKind {
        &self.kind
    }

    #[must_use]
    pub const fn modifiers(&self) -> RuleModifiers {
        self.modifiers
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.modifiers.optional
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        self.modifiers.collection
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.modifiers.nullable
    }

    /// The entity name carried by an `Id` rule, if this is one.
    #[must_use]
    pub fn id_entity(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Id { entity } => Some(entity),
            _ => None,
        }
    }

    /// The related entity name carried by a `HasMany` rule, if this is one.
    #[must_use]
    pub fn has_many_entity(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::HasMany { entity } => Some(entity),
            _ => None,
        }
    }
}

///
/// TemplateNode
///
/// What a template field can hold: a rule, a nested template, or a
/// constant emitted verbatim in both directions.
///

#[derive(Clone, Debug)]
pub enum TemplateNode {
    Rule(Rule),
    Nested(Template),
    Constant(Value),
}

impl TemplateNode {
    /// The rule behind this node, if it is one.
    #[must_use]
    pub const fn as_rule(&self) -> Option<&Rule> {
        match self {
            Self::Rule(rule) => Some(rule),
            _ => None,
        }
    }
}

impl From<Rule> for TemplateNode {
    fn from(rule: Rule) -> Self {
        Self::Rule(rule)
    }
}

impl From<Template> for TemplateNode {
    fn from(template: Template) -> Self {
        Self::Nested(template)
    }
}

impl From<Value> for TemplateNode {
    fn from(constant: Value) -> Self {
        Self::Constant(constant)
    }
}

impl From<&str> for TemplateNode {
    fn from(constant: &str) -> Self {
        Self::Constant(Value::String(constant.to_string()))
    }
}

impl From<i64> for TemplateNode {
    fn from(constant: i64) -> Self {
        Self::Constant(Value::from(constant))
    }
}

impl From<bool> for TemplateNode {
    fn from(constant: bool) -> Self {
        Self::Constant(Value::Bool(constant))
    }
}
