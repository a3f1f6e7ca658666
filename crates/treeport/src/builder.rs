//! Fluent rule construction.
//!
//! Modifiers travel on a by-value draft that the terminal call consumes, so
//! there is no hidden "next rule" state: `t.optional().collection_of()
//! .references("pages")` builds exactly one rule and the chain cannot leak
//! flags into a later one.

use crate::rule::{Rule, RuleKind, RuleModifiers, TemplateNode};
use regex::Regex;
use serde_json::Value;

///
/// Rules
///
/// Entry point for building template rules; conventionally bound to a short
/// local (`let t = Rules::new()`).
///

#[derive(Clone, Copy, Debug, Default)]
pub struct Rules;

impl Rules {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The next rule's field may be absent from the data.
    #[must_use]
    pub fn optional(self) -> RuleDraft {
        RuleDraft::default().optional()
    }

    /// The next rule's data value is a sequence of independently
    /// converted elements.
    #[must_use]
    pub fn collection_of(self) -> RuleDraft {
        RuleDraft::default().collection_of()
    }

    /// The next rule accepts a null data value and short-circuits to null.
    #[must_use]
    pub fn nullable(self) -> RuleDraft {
        RuleDraft::default().nullable()
    }

    /// This field is the primary key for the named entity type.
    #[must_use]
    pub fn id(self, entity: impl Into<String>) -> Rule {
        RuleDraft::default().id(entity)
    }

    /// This field is a plain value, passed through unchanged.
    #[must_use]
    pub fn value(self) -> Rule {
        RuleDraft::default().value()
    }

    /// This field references another entity by its real key.
    #[must_use]
    pub fn references(self, entity: impl Into<String>) -> Rule {
        RuleDraft::default().references(entity)
    }

    /// Like [`references`](Self::references), with a fallback value used
    /// instead of failing when the reference cannot be resolved.
    #[must_use]
    pub fn references_or(self, entity: impl Into<String>, fallback: impl Into<Value>) -> Rule {
        RuleDraft::default().references_or(entity, fallback)
    }

    /// Treat the field differently depending on a discriminator field's
    /// value, with no default case.
    #[must_use]
    pub fn conditions<C, N>(self, field: impl Into<String>, cases: C) -> Rule
    where
        C: IntoIterator<Item = (&'static str, N)>,
        N: Into<TemplateNode>,
    {
        RuleDraft::default().conditions(field, cases)
    }

    /// Like [`conditions`](Self::conditions), with a default case used when
    /// no case label matches.
    #[must_use]
    pub fn conditions_or<C, N>(
        self,
        field: impl Into<String>,
        cases: C,
        default: impl Into<TemplateNode>,
    ) -> Rule
    where
        C: IntoIterator<Item = (&'static str, N)>,
        N: Into<TemplateNode>,
    {
        RuleDraft::default().conditions_or(field, cases, default)
    }

    /// Rewrite leaves of a nested sub-value whose dotted paths match the
    /// finder patterns, leaving every other leaf untouched.
    #[must_use]
    pub fn deep(self, finders: impl IntoIterator<Item = (Regex, Rule)>) -> Rule {
        RuleDraft::default().deep(finders)
    }

    /// This field is a child collection handled by the hierarchical
    /// composer.
    #[must_use]
    pub fn has_many(self, entity: impl Into<String>) -> Rule {
        RuleDraft::default().has_many(entity)
    }

    /// This field is filled from the parent's data during a hierarchical
    /// walk; the listed source fields are tried in priority order.
    #[must_use]
    pub fn inherits<I>(self, fields: I) -> Rule
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        RuleDraft::default().inherits(fields)
    }

    /// This field is a running counter the parent advances across siblings
    /// in a has-many collection.
    #[must_use]
    pub fn increments(self, start: i64, step: i64) -> Rule {
        RuleDraft::default().increments(start, step)
    }
}

///
/// RuleDraft
///
/// Accumulated modifier flags waiting for a terminal call.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RuleDraft {
    modifiers: RuleModifiers,
}

impl RuleDraft {
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.modifiers.optional = true;
        self
    }

    #[must_use]
    pub const fn collection_of(mut self) -> Self {
        self.modifiers.collection = true;
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.modifiers.nullable = true;
        self
    }

    fn finish(self, kind: RuleKind) -> Rule {
        Rule::new(kind, self.modifiers)
    }

    #[must_use]
    pub fn id(self, entity: impl Into<String>) -> Rule {
        self.finish(RuleKind::Id {
            entity: entity.into(),
        })
    }

    #[must_use]
    pub fn value(self) -> Rule {
        self.finish(RuleKind::Value)
    }

    #[must_use]
    pub fn references(self, entity: impl Into<String>) -> Rule {
        self.finish(RuleKind::References {
            entity: entity.into(),
            fallback: None,
        })
    }

    #[must_use]
    pub fn references_or(self, entity: impl Into<String>, fallback: impl Into<Value>) -> Rule {
        self.finish(RuleKind::References {
            entity: entity.into(),
            fallback: Some(fallback.into()),
        })
    }

    #[must_use]
    pub fn conditions<C, N>(self, field: impl Into<String>, cases: C) -> Rule
    where
        C: IntoIterator<Item = (&'static str, N)>,
        N: Into<TemplateNode>,
    {
        self.finish(RuleKind::Conditions {
            field: field.into(),
            cases: cases
                .into_iter()
                .map(|(label, node)| (label.to_string(), node.into()))
                .collect(),
            default: None,
        })
    }

    #[must_use]
    pub fn conditions_or<C, N>(
        self,
        field: impl Into<String>,
        cases: C,
        default: impl Into<TemplateNode>,
    ) -> Rule
    where
        C: IntoIterator<Item = (&'static str, N)>,
        N: Into<TemplateNode>,
    {
        self.finish(RuleKind::Conditions {
            field: field.into(),
            cases: cases
                .into_iter()
                .map(|(label, node)| (label.to_string(), node.into()))
                .collect(),
            default: Some(Box::new(default.into())),
        })
    }

    #[must_use]
    pub fn deep(self, finders: impl IntoIterator<Item = (Regex, Rule)>) -> Rule {
        self.finish(RuleKind::Deep {
            finders: finders.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn has_many(self, entity: impl Into<String>) -> Rule {
        self.finish(RuleKind::HasMany {
            entity: entity.into(),
        })
    }

    #[must_use]
    pub fn inherits<I>(self, fields: I) -> Rule
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.finish(RuleKind::Inherits {
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn increments(self, start: i64, step: i64) -> Rule {
        self.finish(RuleKind::Increments { start, step })
    }
}
