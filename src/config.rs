//! Run configuration: where the mapping lives, where the result goes and
//! which styles render each table.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::classify::NoFilterPolicy;
use crate::mapping::{MappingDocument, MappingFormat};

/// A style list containing this entry removes the table from the output.
pub const IGNORE_MARKER: &str = "ignore";

pub fn default_keep_columns() -> Vec<String> {
    ["geometry", "validated_geometry", "id", "member_id"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemapConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_out_path: Option<PathBuf>,
    #[serde(default)]
    pub mapping_prefix: String,
    /// Column types kept even when no style references them.
    #[serde(default = "default_keep_columns")]
    pub keep_columns: Vec<String>,
    #[serde(default)]
    pub force_filtering: bool,
    #[serde(default)]
    pub allow_research: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_scaling: Option<f64>,
    #[serde(default)]
    pub no_filter_policy: NoFilterPolicy,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<PathBuf>>,
    #[serde(default)]
    pub generalized_tables: BTreeMap<String, Vec<PathBuf>>,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            mapping_path: None,
            mapping_out_path: None,
            mapping_prefix: String::new(),
            keep_columns: default_keep_columns(),
            force_filtering: false,
            allow_research: false,
            tolerance_scaling: None,
            no_filter_policy: NoFilterPolicy::default(),
            strict: false,
            tables: BTreeMap::new(),
            generalized_tables: BTreeMap::new(),
        }
    }
}

impl RemapConfig {
    /// Loads a JSON or YAML configuration. Relative paths inside it are
    /// resolved against the directory holding the file.
    pub fn load(path: &Path) -> Result<Self> {
        let format = MappingFormat::from_path(path)
            .map_err(|_| anyhow!("configuration {path:?} must be a .json, .yaml or .yml file"))?;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading configuration {path:?}"))?;
        let mut config: RemapConfig = match format {
            MappingFormat::Json => serde_json::from_str(&raw)
                .with_context(|| format!("Parsing configuration {path:?}"))?,
            MappingFormat::Yaml => serde_yaml::from_str(&raw)
                .with_context(|| format!("Parsing configuration {path:?}"))?,
        };
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let format = MappingFormat::from_path(path)
            .map_err(|_| anyhow!("configuration {path:?} must be a .json, .yaml or .yml file"))?;
        let rendered = match format {
            MappingFormat::Json => {
                let mut json =
                    serde_json::to_string_pretty(self).context("Serializing configuration")?;
                json.push('\n');
                json
            }
            MappingFormat::Yaml => {
                serde_yaml::to_string(self).context("Serializing configuration")?
            }
        };
        fs::write(path, rendered).with_context(|| format!("Writing configuration {path:?}"))
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() && path.as_os_str() != IGNORE_MARKER {
                *path = base.join(&*path);
            }
        };
        self.mapping_path.iter_mut().for_each(resolve);
        self.mapping_out_path.iter_mut().for_each(resolve);
        self.tables
            .values_mut()
            .chain(self.generalized_tables.values_mut())
            .flatten()
            .for_each(resolve);
    }

    pub fn mapping_path(&self) -> Result<&Path> {
        self.mapping_path
            .as_deref()
            .ok_or_else(|| anyhow!("no mapping file configured (set mapping_path or pass --mapping)"))
    }

    pub fn output_dir(&self) -> Result<&Path> {
        self.mapping_out_path.as_deref().ok_or_else(|| {
            anyhow!("no output directory configured (set mapping_out_path or pass --out-dir)")
        })
    }

    /// Checks everything a run needs before any style is read.
    pub fn validate(&self) -> Result<()> {
        let mapping = self.mapping_path()?;
        ensure!(mapping.exists(), "mapping file {mapping:?} does not exist");
        ensure!(mapping.is_file(), "mapping path {mapping:?} is not a file");
        MappingFormat::from_path(mapping)?;

        let out_dir = self.output_dir()?;
        ensure!(out_dir.exists(), "output directory {out_dir:?} does not exist");
        ensure!(out_dir.is_dir(), "output path {out_dir:?} is not a directory");

        if let Some(scaling) = self.tolerance_scaling
            && !(scaling.is_finite() && scaling >= 0.0)
        {
            bail!("tolerance_scaling must be a non-negative percentage, got {scaling}");
        }
        if self.mapping_prefix.contains(['/', '\\']) {
            bail!("mapping_prefix '{}' must not contain path separators", self.mapping_prefix);
        }
        Ok(())
    }

    /// Tables (plain or generalized) whose style list carries the ignore marker.
    pub fn ignored_tables(&self) -> BTreeSet<String> {
        self.tables
            .iter()
            .chain(&self.generalized_tables)
            .filter(|(_, styles)| styles.iter().any(|p| p.as_os_str() == IGNORE_MARKER))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Skeleton listing every table of `document` with no styles assigned.
    pub fn skeleton(document: &MappingDocument, mapping_path: &Path, out_dir: &Path) -> Self {
        Self {
            mapping_path: Some(mapping_path.to_path_buf()),
            mapping_out_path: Some(out_dir.to_path_buf()),
            tables: document
                .tables
                .keys()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
            generalized_tables: document
                .generalized_tables
                .keys()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
            ..Self::default()
        }
    }
}
