//! Rebuilds a mapping document from the requirements of its styles.
//!
//! Every plain table keeps only the columns its styles reference (plus the
//! always-kept column types) and, when all contributing styles filter the
//! mapping value explicitly, only the mapping values they ask for.
//! Generalized tables get a narrowed `sql_filter` and a tolerance derived
//! from the smallest scale their root table's styles render at.
//!
//! Requirements flow up generalization chains: a table (plain or
//! generalized) must serve every generalized table derived from it, so its
//! own styles are combined with those of all its descendants. A generalized
//! table is rebuilt from its root's combined requirements, which covers the
//! root itself and every generalized table sharing that root.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, warn};

use crate::column_type::guess_column_type;
use crate::error::MappingError;
use crate::lookup::TagLookup;
use crate::mapping::{
    ClassMapping, GeneralizedTable, MappingDocument, MappingTable, TableColumn, TableMapping,
};
use crate::requirements::{CombinedRequirements, ParsedStyle, TableRequirements};
use crate::sql_filter::synthesize_sql_filter;

/// imposm wildcard accepting any tag value.
pub const ANY_VALUE: &str = "__any__";

/// Table name (plain or generalized) to the styles rendering from it.
pub type StylesByTable = BTreeMap<String, Vec<ParsedStyle>>;

#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Narrow mapping values even when some style does not filter them.
    pub force_filtering: bool,
    pub allow_lookup: bool,
    /// Percentage of the minimum scale denominator used as tolerance.
    pub tolerance_scaling: Option<f64>,
    /// Column types kept regardless of style references.
    pub keep_column_types: Vec<String>,
}

/// Memoizes lookups so the same key or value is only asked for once per run.
struct CachedLookup<'a> {
    inner: &'a dyn TagLookup,
    keys: RefCell<HashMap<String, bool>>,
    values: RefCell<HashMap<String, Vec<String>>>,
}

impl<'a> CachedLookup<'a> {
    fn new(inner: &'a dyn TagLookup) -> Self {
        Self {
            inner,
            keys: RefCell::new(HashMap::new()),
            values: RefCell::new(HashMap::new()),
        }
    }
}

impl TagLookup for CachedLookup<'_> {
    fn key_exists(&self, key: &str) -> bool {
        if let Some(found) = self.keys.borrow().get(key) {
            return *found;
        }
        let found = self.inner.key_exists(key);
        self.keys.borrow_mut().insert(key.to_string(), found);
        found
    }

    fn keys_for_value(&self, value: &str) -> Vec<String> {
        if let Some(keys) = self.values.borrow().get(value) {
            return keys.clone();
        }
        let keys = self.inner.keys_for_value(value);
        self.values
            .borrow_mut()
            .insert(value.to_string(), keys.clone());
        keys
    }
}

struct Rebuilder<'a> {
    base: &'a MappingDocument,
    styles: &'a StylesByTable,
    options: &'a RebuildOptions,
    lookup: CachedLookup<'a>,
}

pub fn rebuild_mapping(
    base: &MappingDocument,
    styles: &StylesByTable,
    options: &RebuildOptions,
    lookup: &dyn TagLookup,
) -> Result<MappingDocument, MappingError> {
    let rebuilder = Rebuilder {
        base,
        styles,
        options,
        lookup: CachedLookup::new(lookup),
    };

    let mut tables = BTreeMap::new();
    for (name, table) in &base.tables {
        info!("Building table '{name}'");
        tables.insert(name.clone(), rebuilder.rebuild_table(name, table));
    }

    let mut generalized_tables = BTreeMap::new();
    for (name, generalized) in &base.generalized_tables {
        info!("Building generalized table '{name}'");
        generalized_tables.insert(
            name.clone(),
            rebuilder.rebuild_generalized(name, generalized)?,
        );
    }

    Ok(MappingDocument {
        tables,
        generalized_tables,
        areas: base.areas.clone(),
        tags: base.tags.clone(),
        extra: base.extra.clone(),
    })
}

impl Rebuilder<'_> {
    /// Own styles of `table` combined with those of its generalized
    /// descendants.
    fn combined_for(&self, table: &str) -> CombinedRequirements {
        std::iter::once(table.to_string())
            .chain(self.base.generalized_descendants(table))
            .filter_map(|name| self.styles.get(&name))
            .map(|styles| CombinedRequirements::from_styles(styles))
            .fold(CombinedRequirements::default(), |acc, next| acc.merge(&next))
    }

    fn narrowing(&self, combined: &CombinedRequirements) -> bool {
        !combined.use_all_mapping_types || self.options.force_filtering
    }

    fn rebuild_table(&self, name: &str, table: &MappingTable) -> MappingTable {
        let combined = self.combined_for(name);
        if combined.is_empty() {
            info!("- no styles for '{name}', table left unchanged");
            return table.clone();
        }

        let requirements = &combined.requirements;
        let mut rebuilt = table.clone();
        rebuilt.columns = self.select_columns(name, table, requirements);

        if self.narrowing(&combined) && !requirements.mapping_values.is_empty() {
            self.narrow_mappings(name, table, &mut rebuilt, requirements);
        } else {
            info!("- not every style filters the mapping value, all mapping values of '{name}' kept");
        }
        rebuilt
    }

    fn select_columns(
        &self,
        table_name: &str,
        table: &MappingTable,
        requirements: &TableRequirements,
    ) -> Vec<TableColumn> {
        if requirements.columns.is_empty() {
            return table.columns.clone();
        }

        let mut selected = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            if requirements.requires_column(&column.name)
                || self.options.keep_column_types.contains(&column.column_type)
            {
                selected.push(column.clone());
            } else {
                info!("- column '{}' of '{table_name}' excluded", column.name);
            }
        }

        for (name, literals) in &requirements.columns {
            if table.columns.iter().any(|column| &column.name == name) {
                continue;
            }
            warn!("- column '{name}' is used by a style but not defined in table '{table_name}'");
            if !self.options.allow_lookup {
                continue;
            }
            if self.lookup.key_exists(name) {
                let guessed = guess_column_type(literals);
                info!("- key '{name}' found, column added with guessed type '{guessed}'");
                let mut column = TableColumn::new(guessed.as_str(), name);
                column.key = Some(name.clone());
                selected.push(column);
            } else {
                info!("- key '{name}' not found, column excluded");
            }
        }
        selected
    }

    /// Narrows the flat mapping and every mapping group of `table`. Coverage
    /// is decided table-wide, so a value defined in one group is never looked
    /// up for another.
    fn narrow_mappings(
        &self,
        name: &str,
        table: &MappingTable,
        rebuilt: &mut MappingTable,
        requirements: &TableRequirements,
    ) {
        let required = &requirements.mapping_values;
        let mut covered: BTreeSet<&str> = BTreeSet::new();
        let mut has_wildcard = false;
        let defined = table
            .mapping
            .values()
            .chain(table.mappings.values().flat_map(|grouped| grouped.mapping.values()))
            .flatten();
        for value in defined {
            if value == ANY_VALUE {
                has_wildcard = true;
            } else if required.contains(value) {
                covered.insert(value);
            }
        }

        rebuilt.mapping = retain_required(name, &table.mapping, required);
        let mut groups: BTreeMap<String, TableMapping> = table
            .mappings
            .iter()
            .map(|(group, grouped)| {
                let label = format!("{name}/{group}");
                let mapping = retain_required(&label, &grouped.mapping, required);
                (group.clone(), TableMapping { mapping })
            })
            .collect();

        if !has_wildcard {
            for value in required.iter().filter(|v| !covered.contains(v.as_str())) {
                warn!("- mapping value '{value}' is used by a style but not defined in '{name}'");
                if !self.options.allow_lookup {
                    continue;
                }
                let keys = self.lookup.keys_for_value(value);
                if keys.is_empty() {
                    info!("- no key found for mapping value '{value}'");
                }
                for key in keys {
                    let group = table
                        .mappings
                        .iter()
                        .find(|(_, grouped)| grouped.mapping.contains_key(&key))
                        .or_else(|| table.mappings.iter().next())
                        .map(|(group, _)| group);
                    let target = match group {
                        Some(group) => match groups.get_mut(group) {
                            Some(grouped) => &mut grouped.mapping,
                            None => continue,
                        },
                        None => &mut rebuilt.mapping,
                    };
                    info!("- mapping value '{value}' added under class '{key}'");
                    let values = target.entry(key).or_default();
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                }
            }
        }

        groups.retain(|group, grouped| {
            if grouped.mapping.is_empty() {
                info!("- mapping group '{group}' of '{name}' excluded");
            }
            !grouped.mapping.is_empty()
        });
        rebuilt.mappings = groups;
    }

    fn rebuild_generalized(
        &self,
        name: &str,
        generalized: &GeneralizedTable,
    ) -> Result<GeneralizedTable, MappingError> {
        let root = self.base.resolve_root(name)?;
        let combined = self.combined_for(&root);
        if combined.is_empty() {
            info!("- no styles for '{name}' or its root '{root}', generalized table left unchanged");
            return Ok(generalized.clone());
        }

        let columns = self.base.mapping_columns(&root)?;
        let mut rebuilt = generalized.clone();
        rebuilt.sql_filter = synthesize_sql_filter(
            generalized.sql_filter.as_deref(),
            &columns,
            &combined.requirements.mapping_values,
            self.narrowing(&combined),
        );
        if let Some(filter) = &rebuilt.sql_filter {
            info!("- sql_filter of '{name}': {filter}");
        }

        if let (Some(min_scale), Some(scaling)) = (combined.scale.min, self.options.tolerance_scaling)
        {
            rebuilt.tolerance = min_scale as f64 * (scaling / 100.0);
            info!("- tolerance of '{name}': {}", rebuilt.tolerance);
        }
        Ok(rebuilt)
    }
}

/// Values of `mapping` that a style requires, plus wildcards.
fn retain_required(label: &str, mapping: &ClassMapping, required: &BTreeSet<String>) -> ClassMapping {
    let mut narrowed = ClassMapping::new();
    for (class, values) in mapping {
        for value in values {
            if value == ANY_VALUE || required.contains(value) {
                narrowed.entry(class.clone()).or_default().push(value.clone());
            } else {
                debug!("- mapping value '{class}:{value}' of '{label}' excluded");
            }
        }
    }
    narrowed
}

/// Removes ignored tables, and every generalized table depending on one.
pub fn without_tables(base: &MappingDocument, ignored: &BTreeSet<String>) -> MappingDocument {
    let mut pruned = base.clone();
    for name in ignored {
        if pruned.tables.remove(name).is_some() {
            info!("Table '{name}' ignored");
        }
        if pruned.generalized_tables.remove(name).is_some() {
            info!("Generalized table '{name}' ignored");
        }
    }

    let orphaned: Vec<String> = pruned
        .generalized_tables
        .keys()
        .filter(|name| pruned.resolve_root(name).is_err())
        .cloned()
        .collect();
    for name in orphaned {
        warn!("Generalized table '{name}' removed, its source table is ignored or missing");
        pruned.generalized_tables.remove(&name);
    }
    pruned
}

/// Generalized tables whose source chain does not end at a plain table.
pub fn validate_generalized_sources(document: &MappingDocument) -> Result<(), MappingError> {
    for name in document.generalized_tables.keys() {
        document.resolve_root(name)?;
    }
    Ok(())
}
