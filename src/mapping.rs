//! imposm mapping document model and JSON/YAML persistence.
//!
//! Sections the rebuild never touches (`areas`, `tags`, unknown keys) are
//! held as opaque values and written back unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::MappingError;
use crate::requirements::MappingColumnNames;

pub use serde_yaml::Value as YamlValue;

pub const MAPPING_VALUE_TYPE: &str = "mapping_value";
pub const MAPPING_KEY_TYPE: &str = "mapping_key";

/// Class (tag key) to the tag values mapped into a table.
pub type ClassMapping = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingFormat {
    Json,
    Yaml,
}

impl MappingFormat {
    pub fn from_path(path: &Path) -> Result<Self, MappingError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(MappingFormat::Json),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Ok(MappingFormat::Yaml)
            }
            _ => Err(MappingError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    #[serde(rename = "type")]
    pub column_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, YamlValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub from_member: bool,
}

impl TableColumn {
    pub fn new(column_type: &str, name: &str) -> Self {
        Self {
            column_type: column_type.to_string(),
            name: name.to_string(),
            key: None,
            args: BTreeMap::new(),
            from_member: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    #[serde(default)]
    pub mapping: ClassMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFilter {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require: BTreeMap<String, YamlValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reject: BTreeMap<String, YamlValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub require_regexp: BTreeMap<String, YamlValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reject_regexp: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(rename = "type")]
    pub table_type: String,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mapping: ClassMapping,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mappings: BTreeMap<String, TableMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relation_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<TableFilter>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

impl MappingTable {
    pub fn mapping_columns(&self) -> MappingColumnNames {
        let find = |column_type: &str| {
            self.columns
                .iter()
                .rev()
                .find(|column| column.column_type == column_type)
                .map(|column| column.name.as_str())
        };
        MappingColumnNames::new(find(MAPPING_KEY_TYPE), find(MAPPING_VALUE_TYPE))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizedTable {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_filter: Option<String>,
    #[serde(default)]
    pub tolerance: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub tables: BTreeMap<String, MappingTable>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub generalized_tables: BTreeMap<String, GeneralizedTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub areas: Option<YamlValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<YamlValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

impl MappingDocument {
    pub fn load(path: &Path) -> Result<(Self, MappingFormat), MappingError> {
        let format = MappingFormat::from_path(path)?;
        let raw = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok((Self::parse(&raw, format)?, format))
    }

    pub fn parse(raw: &str, format: MappingFormat) -> Result<Self, MappingError> {
        let document = match format {
            MappingFormat::Json => serde_json::from_str(raw)?,
            MappingFormat::Yaml => serde_yaml::from_str(raw)?,
        };
        Ok(document)
    }

    /// Pretty-printed text in `format`; JSON is indented with four spaces.
    pub fn render(&self, format: MappingFormat) -> Result<String, MappingError> {
        match format {
            MappingFormat::Json => {
                let mut buffer = Vec::new();
                let formatter = PrettyFormatter::with_indent(b"    ");
                let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
                self.serialize(&mut serializer)?;
                buffer.push(b'\n');
                Ok(String::from_utf8_lossy(&buffer).into_owned())
            }
            MappingFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }

    pub fn save(&self, path: &Path, format: MappingFormat) -> Result<(), MappingError> {
        let rendered = self.render(format)?;
        fs::write(path, rendered).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn table(&self, name: &str) -> Result<&MappingTable, MappingError> {
        self.tables.get(name).ok_or_else(|| MappingError::UnknownTable {
            table: name.to_string(),
        })
    }

    pub fn mapping_columns(&self, table: &str) -> Result<MappingColumnNames, MappingError> {
        Ok(self.table(table)?.mapping_columns())
    }

    /// Follows `source` links from a generalized table to the plain table at
    /// the bottom of the chain.
    pub fn resolve_root(&self, generalized: &str) -> Result<String, MappingError> {
        let invalid = |reason: String| MappingError::InvalidGeneralizedSource {
            table: generalized.to_string(),
            reason,
        };

        let mut visited = BTreeSet::from([generalized.to_string()]);
        let mut current = self
            .generalized_tables
            .get(generalized)
            .ok_or_else(|| invalid("not a generalized table".to_string()))?;
        loop {
            let source = current.source.as_str();
            if self.tables.contains_key(source) {
                return Ok(source.to_string());
            }
            if !visited.insert(source.to_string()) {
                return Err(invalid(format!("cycle through '{source}'")));
            }
            current = self
                .generalized_tables
                .get(source)
                .ok_or_else(|| invalid(format!("unknown source table '{source}'")))?;
        }
    }

    /// Generalized tables whose source chain passes through `table` (a plain
    /// or generalized table), nearest first.
    pub fn generalized_descendants(&self, table: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut frontier = vec![table.to_string()];
        while let Some(current) = frontier.pop() {
            for (name, generalized) in &self.generalized_tables {
                if generalized.source == current && !found.contains(name) && name != table {
                    found.push(name.clone());
                    frontier.push(name.clone());
                }
            }
        }
        found
    }
}
