//! One full run: load the mapping, analyze every configured style, rebuild
//! and write the narrowed mapping next to the configured output directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::{info, warn};

use crate::config::{IGNORE_MARKER, RemapConfig};
use crate::extract::extract_requirements;
use crate::lookup::{DEFAULT_TAGFINDER_URL, NoLookup, TagLookup, TagfinderClient};
use crate::mapping::{MappingDocument, MappingFormat};
use crate::rebuild::{
    RebuildOptions, StylesByTable, rebuild_mapping, validate_generalized_sources, without_tables,
};
use crate::requirements::{CombinedRequirements, MappingColumnNames};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleFailure {
    pub table: String,
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    pub output_path: PathBuf,
    pub styles_parsed: usize,
    pub failures: Vec<StyleFailure>,
}

/// Where the rebuilt mapping is written: `<out_dir>/<prefix><file name>`.
pub fn output_path(config: &RemapConfig) -> Result<PathBuf> {
    let mapping = config.mapping_path()?;
    let file_name = mapping
        .file_name()
        .with_context(|| format!("mapping path {mapping:?} has no file name"))?;
    Ok(config.output_dir()?.join(format!(
        "{}{}",
        config.mapping_prefix,
        file_name.to_string_lossy()
    )))
}

pub fn execute(config: &RemapConfig, lookup_url: Option<&str>) -> Result<RemapReport> {
    config.validate()?;
    let mapping_path = config.mapping_path()?;
    let (document, format) = MappingDocument::load(mapping_path)
        .with_context(|| format!("Loading mapping {mapping_path:?}"))?;
    info!(
        "Loaded mapping {:?} with {} table(s) and {} generalized table(s)",
        mapping_path,
        document.tables.len(),
        document.generalized_tables.len()
    );

    let ignored = config.ignored_tables();
    let pruned = without_tables(&document, &ignored);
    validate_generalized_sources(&pruned)?;
    let dropped: BTreeSet<&String> = document
        .generalized_tables
        .keys()
        .filter(|name| !pruned.generalized_tables.contains_key(*name))
        .collect();
    let document = pruned;

    let mut report = RemapReport {
        output_path: output_path(config)?,
        ..RemapReport::default()
    };
    let mut styles = StylesByTable::new();

    let assignments = config
        .tables
        .iter()
        .chain(&config.generalized_tables)
        .filter(|(name, _)| !ignored.contains(*name));
    for (table, paths) in assignments {
        if dropped.contains(table) {
            warn!("Styles of generalized table '{table}' skipped, its source table is ignored");
            continue;
        }
        let columns = table_columns(&document, table)?;
        for path in paths.iter().filter(|p| p.as_os_str() != IGNORE_MARKER) {
            match extract_requirements(path, &columns, config.no_filter_policy) {
                Ok(parsed) => {
                    info!(
                        "{:?} -> '{table}': {} column(s), {} mapping value(s), scale {:?}..{}",
                        path,
                        parsed.requirements.columns.len(),
                        parsed.requirements.mapping_values.len(),
                        parsed.scale.min,
                        parsed.scale.max
                    );
                    report.styles_parsed += 1;
                    styles.entry(table.clone()).or_default().push(parsed);
                }
                Err(err) => {
                    warn!("Skipping style for '{table}': {err:#}");
                    report.failures.push(StyleFailure {
                        table: table.clone(),
                        path: path.clone(),
                        message: format!("{:#}", anyhow::Error::new(err)),
                    });
                }
            }
        }
    }

    if config.strict && !report.failures.is_empty() {
        bail!(
            "{} style file(s) could not be analyzed: {}",
            report.failures.len(),
            report
                .failures
                .iter()
                .map(|failure| failure.path.display())
                .join(", ")
        );
    }
    log_summaries(&styles);

    let options = RebuildOptions {
        force_filtering: config.force_filtering,
        allow_lookup: config.allow_research,
        tolerance_scaling: config.tolerance_scaling,
        keep_column_types: config.keep_columns.clone(),
    };
    let lookup: Box<dyn TagLookup> = if config.allow_research {
        Box::new(TagfinderClient::new(
            lookup_url.unwrap_or(DEFAULT_TAGFINDER_URL),
        ))
    } else {
        Box::new(NoLookup)
    };
    let rebuilt = rebuild_mapping(&document, &styles, &options, lookup.as_ref())?;

    write_mapping(&rebuilt, &report.output_path, format)?;
    info!(
        "Wrote mapping to {:?} ({} style(s), {} failure(s))",
        report.output_path,
        report.styles_parsed,
        report.failures.len()
    );
    Ok(report)
}

/// Mapping columns a style for `table` is analyzed against; a generalized
/// table uses those of its root table.
fn table_columns(document: &MappingDocument, table: &str) -> Result<MappingColumnNames> {
    if document.generalized_tables.contains_key(table) {
        let root = document.resolve_root(table)?;
        return Ok(document.mapping_columns(&root)?);
    }
    Ok(document.mapping_columns(table)?)
}

fn log_summaries(styles: &StylesByTable) {
    for (table, parsed) in styles {
        let combined = CombinedRequirements::from_styles(parsed);
        info!(
            "'{table}': {} style(s), columns [{}], mapping values [{}], all mapping types: {}",
            combined.sources.len(),
            combined.requirements.columns.keys().join(", "),
            combined.requirements.mapping_values.iter().join(", "),
            combined.use_all_mapping_types
        );
    }
}

fn write_mapping(document: &MappingDocument, path: &Path, format: MappingFormat) -> Result<()> {
    document
        .save(path, format)
        .with_context(|| format!("Writing mapping to {path:?}"))
}
