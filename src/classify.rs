//! Decides whether a rule's filter enumerates the mapping-value column.
//!
//! A rule is explicit when the first `PropertyName` naming the mapping-value
//! column sits in an equality context. Range, pattern and negation contexts
//! do not pin the column to a known set of values, so a style containing such
//! a rule cannot be used to narrow the mapping.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::StyleError;
use crate::rule::{Rule, SymbolizerKind};
use crate::xml_tree::{NodeId, Walk, XmlTree};

pub const NON_EXPLICIT_OPERATORS: &[&str] = &[
    "PropertyIsNotEqualTo",
    "PropertyIsLike",
    "PropertyIsBetween",
    "PropertyIsLessThan",
    "PropertyIsLessThanOrEqualTo",
    "PropertyIsGreaterThan",
    "PropertyIsGreaterThanOrEqualTo",
];

pub const NON_EXPLICIT_FUNCTIONS: &[&str] = &[
    "between",
    "greaterEqualThan",
    "greaterThan",
    "isLike",
    "lessThan",
    "lessEqualThan",
    "not",
    "notEqual",
];

/// How a rule without any filter is classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoFilterPolicy {
    /// An unfiltered rule renders every feature and is never explicit.
    #[default]
    NonExplicit,
    /// An unfiltered rule with a `TextSymbolizer` only labels features other
    /// rules already select, so it is treated as explicit.
    LabelRulesExplicit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleClassification {
    pub explicit: bool,
    /// Literals compared through a not-equal context.
    pub excluded_values: BTreeSet<String>,
}

impl RuleClassification {
    fn explicit() -> Self {
        Self {
            explicit: true,
            excluded_values: BTreeSet::new(),
        }
    }

    fn non_explicit() -> Self {
        Self::default()
    }
}

pub fn classify_rule(
    rule: &Rule,
    value_column: Option<&str>,
    policy: NoFilterPolicy,
) -> Result<RuleClassification, StyleError> {
    if rule.else_filter {
        return Ok(RuleClassification::non_explicit());
    }

    let Some(filter) = rule.filter.as_deref() else {
        let vacuous = policy == NoFilterPolicy::LabelRulesExplicit
            && rule.has_symbolizer(SymbolizerKind::Text);
        return Ok(if vacuous {
            RuleClassification::explicit()
        } else {
            RuleClassification::non_explicit()
        });
    };

    let Some(value_column) = value_column else {
        return Ok(RuleClassification::non_explicit());
    };

    let tree = XmlTree::parse_fragment("Filter", filter).map_err(|err| StyleError::Rule {
        message: format!("filter of rule '{}': {err}", rule.name),
    })?;
    Ok(classify_filter(&tree, value_column))
}

/// Classifies an already decoded filter tree.
pub fn classify_filter(tree: &XmlTree, value_column: &str) -> RuleClassification {
    let mut outcome = RuleClassification::non_explicit();
    tree.walk(|tree, id| {
        if tree.name(id) != "PropertyName" || tree.text(id) != value_column {
            return Walk::Descend;
        }
        outcome = classify_reference(tree, id);
        Walk::Stop
    });
    outcome
}

fn classify_reference(tree: &XmlTree, property: NodeId) -> RuleClassification {
    let Some(parent) = tree.parent(property) else {
        return RuleClassification::explicit();
    };

    let parent_name = tree.name(parent);
    let function_name = (parent_name == "Function")
        .then(|| tree.attribute(parent, "name"))
        .flatten();

    let not_equal = parent_name == "PropertyIsNotEqualTo" || function_name == Some("notEqual");
    let range_or_pattern = NON_EXPLICIT_OPERATORS.contains(&parent_name)
        || function_name.is_some_and(|name| NON_EXPLICIT_FUNCTIONS.contains(&name));
    let negated = tree.ancestors(property).any(|id| is_negation(tree, id));

    if not_equal || negated {
        let excluded = sibling_literals(tree, parent);
        debug!("mapping value excluded by negation: {excluded:?}");
        return RuleClassification {
            explicit: false,
            excluded_values: excluded,
        };
    }
    if range_or_pattern {
        return RuleClassification::non_explicit();
    }
    RuleClassification::explicit()
}

fn is_negation(tree: &XmlTree, id: NodeId) -> bool {
    match tree.name(id) {
        "Not" => true,
        "Function" => tree.attribute(id, "name") == Some("not"),
        _ => false,
    }
}

pub(crate) fn sibling_literals(tree: &XmlTree, parent: NodeId) -> BTreeSet<String> {
    tree.children_named(parent, "Literal")
        .map(|id| tree.text(id))
        .collect()
}
