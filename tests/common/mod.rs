#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const ROADS_MAPPING: &str = r#"tags:
  load_all: true
areas:
  area_tags: [landuse]
tables:
  roads:
    type: linestring
    columns:
      - {type: id, name: osm_id}
      - {type: geometry, name: geometry}
      - {type: mapping_key, name: class}
      - {type: mapping_value, name: type}
      - {type: boolint, name: bridge, key: bridge}
      - {type: string, name: name, key: name}
      - {type: string, name: ref, key: ref}
    mapping:
      highway: [motorway, primary, secondary, footway]
      railway: [rail, tram]
  landuse:
    type: polygon
    columns:
      - {type: geometry, name: geometry}
      - {type: mapping_value, name: type}
    mapping:
      landuse: [forest, residential]
generalized_tables:
  roads_gen1:
    source: roads
    sql_filter: "type IN ('motorway', 'primary') AND ST_Length(geometry) > 50"
    tolerance: 20.0
"#;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file");
        path
    }

    pub fn mkdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }
}

/// Wraps rules in a minimal styled layer descriptor.
pub fn sld(rules: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sld:StyledLayerDescriptor xmlns:sld="http://www.opengis.net/sld" xmlns:ogc="http://www.opengis.net/ogc" version="1.0.0">
  <sld:NamedLayer>
    <sld:Name>layer</sld:Name>
    <sld:UserStyle>
      <sld:FeatureTypeStyle>
{rules}
      </sld:FeatureTypeStyle>
    </sld:UserStyle>
  </sld:NamedLayer>
</sld:StyledLayerDescriptor>
"#
    )
}

/// A line rule selecting `column = value` between the given scales.
pub fn equality_rule(column: &str, value: &str, min: u64, max: u64) -> String {
    format!(
        r#"        <sld:Rule>
          <sld:Name>{value}</sld:Name>
          <ogc:Filter>
            <ogc:PropertyIsEqualTo>
              <ogc:PropertyName>{column}</ogc:PropertyName>
              <ogc:Literal>{value}</ogc:Literal>
            </ogc:PropertyIsEqualTo>
          </ogc:Filter>
          <sld:MinScaleDenominator>{min}</sld:MinScaleDenominator>
          <sld:MaxScaleDenominator>{max}</sld:MaxScaleDenominator>
          <sld:LineSymbolizer/>
        </sld:Rule>
"#
    )
}
