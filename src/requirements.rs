//! Requirement sets extracted from styles and the algebra used to combine them.
//!
//! All merges here are unions (or min/max folds), so combining per-file
//! results is associative, commutative and idempotent; the order in which
//! style files are processed never changes the rebuilt mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Names of the columns typed `mapping_value` and `mapping_key` in a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingColumnNames {
    pub key: Option<String>,
    pub value: Option<String>,
}

impl MappingColumnNames {
    pub fn new(key: Option<&str>, value: Option<&str>) -> Self {
        Self {
            key: key.map(str::to_string),
            value: value.map(str::to_string),
        }
    }

    pub fn is_value_column(&self, column: &str) -> bool {
        self.value.as_deref() == Some(column)
    }
}

/// Upper scale bound of a rule or a whole style.
///
/// Variant order matters: folding with `max` gives the envelope semantics,
/// with `Unbounded` absorbing every finite value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaxScale {
    #[default]
    Unset,
    Finite(u64),
    Unbounded,
}

impl fmt::Display for MaxScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxScale::Unset => f.write_str("-"),
            MaxScale::Finite(value) => write!(f, "{value}"),
            MaxScale::Unbounded => f.write_str("inf"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScaleEnvelope {
    /// Smallest min scale denominator seen; `None` until a rule is observed.
    pub min: Option<u64>,
    pub max: MaxScale,
}

impl ScaleEnvelope {
    pub fn observe(self, min: u64, max: MaxScale) -> Self {
        self.merge(ScaleEnvelope {
            min: Some(min),
            max,
        })
    }

    pub fn merge(self, other: ScaleEnvelope) -> Self {
        let min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        ScaleEnvelope {
            min,
            max: self.max.max(other.max),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRequirements {
    pub mapping_columns: MappingColumnNames,
    /// Referenced column name to the literal samples compared against it.
    pub columns: BTreeMap<String, BTreeSet<String>>,
    /// Mapping values some rule depends on.
    pub mapping_values: BTreeSet<String>,
    /// Mapping values excluded through a not-equal predicate.
    pub implicit_filtered_values: BTreeSet<String>,
}

impl TableRequirements {
    pub fn new(mapping_columns: MappingColumnNames) -> Self {
        Self {
            mapping_columns,
            ..Self::default()
        }
    }

    pub fn add_column<I, S>(&mut self, name: &str, literals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .entry(name.to_string())
            .or_default()
            .extend(literals.into_iter().map(Into::into));
    }

    pub fn requires_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn merge(&self, other: &TableRequirements) -> TableRequirements {
        let mut merged = self.clone();
        // Both sides normally carry the same names; `max` keeps the result
        // independent of argument order when one side is unset.
        merged.mapping_columns = self
            .mapping_columns
            .clone()
            .max(other.mapping_columns.clone());
        for (name, literals) in &other.columns {
            merged.add_column(name, literals.iter().cloned());
        }
        merged
            .mapping_values
            .extend(other.mapping_values.iter().cloned());
        merged
            .implicit_filtered_values
            .extend(other.implicit_filtered_values.iter().cloned());
        merged
    }
}

/// Everything one style file tells us about its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStyle {
    pub source: PathBuf,
    pub requirements: TableRequirements,
    pub scale: ScaleEnvelope,
    /// No safe narrowing of mapping values is possible for this file.
    pub use_all_mapping_types: bool,
}

/// The union of any number of [`ParsedStyle`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedRequirements {
    pub requirements: TableRequirements,
    pub scale: ScaleEnvelope,
    pub use_all_mapping_types: bool,
    pub sources: BTreeSet<PathBuf>,
}

impl CombinedRequirements {
    pub fn from_styles<'a, I>(styles: I) -> Self
    where
        I: IntoIterator<Item = &'a ParsedStyle>,
    {
        styles
            .into_iter()
            .map(CombinedRequirements::from)
            .fold(CombinedRequirements::default(), |acc, next| acc.merge(&next))
    }

    pub fn merge(&self, other: &CombinedRequirements) -> CombinedRequirements {
        CombinedRequirements {
            requirements: self.requirements.merge(&other.requirements),
            scale: self.scale.merge(other.scale),
            use_all_mapping_types: self.use_all_mapping_types || other.use_all_mapping_types,
            sources: self.sources.union(&other.sources).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl From<&ParsedStyle> for CombinedRequirements {
    fn from(style: &ParsedStyle) -> Self {
        CombinedRequirements {
            requirements: style.requirements.clone(),
            scale: style.scale,
            use_all_mapping_types: style.use_all_mapping_types,
            sources: BTreeSet::from([style.source.clone()]),
        }
    }
}
