mod common;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use sld_remap::mapping::{MappingDocument, MappingFormat};

use common::{ROADS_MAPPING, TestWorkspace, equality_rule, sld};

fn sld_remap() -> Command {
    Command::cargo_bin("sld-remap").expect("binary exists")
}

fn roads_style() -> String {
    let label = r#"        <sld:Rule>
          <ogc:Filter>
            <ogc:PropertyIsEqualTo>
              <ogc:PropertyName>type</ogc:PropertyName>
              <ogc:Literal>primary</ogc:Literal>
            </ogc:PropertyIsEqualTo>
          </ogc:Filter>
          <sld:MinScaleDenominator>1000</sld:MinScaleDenominator>
          <sld:MaxScaleDenominator>25000</sld:MaxScaleDenominator>
          <sld:TextSymbolizer>
            <sld:Label><ogc:PropertyName>name</ogc:PropertyName></sld:Label>
          </sld:TextSymbolizer>
        </sld:Rule>
"#;
    sld(&[
        equality_rule("type", "primary", 1000, 50_000),
        equality_rule("type", "motorway", 5000, 1_000_000),
        label.to_string(),
    ]
    .concat())
}

/// Mapping, styles and configuration for a run writing into `out/`.
fn prepare(workspace: &TestWorkspace, mapping_name: &str, mapping: &str) {
    workspace.write(mapping_name, mapping);
    workspace.write("styles/roads.sld", &roads_style());
    workspace.write(
        "styles/roads_gen1.sld",
        &sld(&equality_rule("type", "motorway", 100_000, 5_000_000)),
    );
    workspace.mkdir("out");
    workspace.write(
        "remap.yaml",
        &format!(
            "mapping_path: {mapping_name}\n\
             mapping_out_path: out\n\
             mapping_prefix: slim_\n\
             tolerance_scaling: 10\n\
             tables:\n  roads: [styles/roads.sld]\n  landuse: [ignore]\n\
             generalized_tables:\n  roads_gen1: [styles/roads_gen1.sld]\n"
        ),
    );
}

#[test]
fn remap_narrows_yaml_mapping() {
    let workspace = TestWorkspace::new();
    prepare(&workspace, "mapping.yml", ROADS_MAPPING);

    sld_remap()
        .current_dir(workspace.path())
        .args(["remap", "--config", "remap.yaml"])
        .assert()
        .success();

    let output = workspace.read("out/slim_mapping.yml");
    let document = MappingDocument::parse(&output, MappingFormat::Yaml).expect("parse output");

    assert!(!document.tables.contains_key("landuse"));
    assert!(document.tags.is_some());
    assert!(document.areas.is_some());

    let roads = &document.tables["roads"];
    let columns: Vec<&str> = roads.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["osm_id", "geometry", "type", "name"]);
    assert_eq!(roads.mapping.len(), 1);
    assert_eq!(roads.mapping["highway"], vec!["motorway", "primary"]);

    let gen1 = &document.generalized_tables["roads_gen1"];
    assert_eq!(
        gen1.sql_filter.as_deref(),
        Some("type IN ('motorway', 'primary') AND ST_Length(geometry) > 50")
    );
    assert_eq!(gen1.tolerance, 100.0);
}

#[test]
fn remap_keeps_json_format_and_honours_overrides() {
    let workspace = TestWorkspace::new();
    let json = MappingDocument::parse(ROADS_MAPPING, MappingFormat::Yaml)
        .expect("parse mapping")
        .render(MappingFormat::Json)
        .expect("render json");
    prepare(&workspace, "mapping.json", &json);
    workspace.mkdir("elsewhere");

    sld_remap()
        .current_dir(workspace.path())
        .args([
            "remap",
            "--config",
            "remap.yaml",
            "--out-dir",
            "elsewhere",
            "--prefix",
            "min_",
            "--tolerance-scaling",
            "50",
        ])
        .assert()
        .success();

    assert!(!workspace.path().join("out/slim_mapping.json").exists());
    let output = workspace.read("elsewhere/min_mapping.json");
    assert!(output.contains("\n    \"tables\""));
    let document = MappingDocument::parse(&output, MappingFormat::Json).expect("parse output");
    assert_eq!(document.generalized_tables["roads_gen1"].tolerance, 500.0);
}

#[test]
fn remap_skips_broken_style_unless_strict() {
    let workspace = TestWorkspace::new();
    prepare(&workspace, "mapping.yml", ROADS_MAPPING);
    workspace.write("styles/roads_gen1.sld", "<sld:StyledLayerDescriptor><sld:Rule>");

    sld_remap()
        .current_dir(workspace.path())
        .args(["remap", "--config", "remap.yaml"])
        .assert()
        .success()
        .stderr(contains("roads_gen1.sld"));
    let document = MappingDocument::parse(
        &workspace.read("out/slim_mapping.yml"),
        MappingFormat::Yaml,
    )
    .expect("parse output");
    // the generalized table still follows the styles of its root
    assert_eq!(document.generalized_tables["roads_gen1"].tolerance, 100.0);

    fs::remove_file(workspace.path().join("out/slim_mapping.yml")).expect("remove output");
    sld_remap()
        .current_dir(workspace.path())
        .args(["remap", "--config", "remap.yaml", "--strict"])
        .assert()
        .failure()
        .stderr(contains("could not be analyzed"));
    assert!(!workspace.path().join("out/slim_mapping.yml").exists());
}

#[test]
fn remap_skips_generalized_styles_of_an_ignored_root() {
    let workspace = TestWorkspace::new();
    prepare(&workspace, "mapping.yml", ROADS_MAPPING);
    workspace.write(
        "remap.yaml",
        "mapping_path: mapping.yml\n\
         mapping_out_path: out\n\
         strict: true\n\
         tables:\n  roads: [ignore]\n  landuse: [styles/landuse.sld]\n\
         generalized_tables:\n  roads_gen1: [styles/roads_gen1.sld]\n",
    );
    workspace.write(
        "styles/landuse.sld",
        &sld(&equality_rule("type", "forest", 0, 100_000)),
    );

    sld_remap()
        .current_dir(workspace.path())
        .args(["remap", "--config", "remap.yaml"])
        .assert()
        .success()
        .stderr(contains("roads_gen1"));

    let document = MappingDocument::parse(&workspace.read("out/mapping.yml"), MappingFormat::Yaml)
        .expect("parse output");
    assert!(!document.tables.contains_key("roads"));
    assert!(document.generalized_tables.is_empty());
    assert_eq!(document.tables["landuse"].mapping["landuse"], vec!["forest"]);
}

#[test]
fn remap_rejects_missing_mapping_and_output_dir() {
    let workspace = TestWorkspace::new();
    workspace.write(
        "remap.yaml",
        "mapping_path: missing.yml\nmapping_out_path: out\n",
    );
    sld_remap()
        .current_dir(workspace.path())
        .args(["remap", "--config", "remap.yaml"])
        .assert()
        .failure()
        .stderr(contains("error:").and(contains("does not exist")));

    workspace.write("missing.yml", ROADS_MAPPING);
    sld_remap()
        .current_dir(workspace.path())
        .args(["remap", "--config", "remap.yaml"])
        .assert()
        .failure()
        .stderr(contains("output directory"));
}

#[test]
fn inspect_prints_requirements_table() {
    let workspace = TestWorkspace::new();
    let style = workspace.write("roads.sld", &roads_style());

    sld_remap()
        .args([
            "inspect",
            style.to_str().expect("utf-8 path"),
            "--mapping-value-column",
            "type",
        ])
        .assert()
        .success()
        .stdout(
            contains("mapping values")
                .and(contains("name, type"))
                .and(contains("motorway, primary"))
                .and(contains("1000000")),
        );
}

#[test]
fn inspect_fails_on_non_sld_file() {
    let workspace = TestWorkspace::new();
    let style = workspace.write("roads.xml", &roads_style());
    sld_remap()
        .args(["inspect", style.to_str().expect("utf-8 path")])
        .assert()
        .failure()
        .stderr(contains(".sld"));
}

#[test]
fn init_writes_skeleton_and_refuses_to_overwrite() {
    let workspace = TestWorkspace::new();
    workspace.write("mapping.yml", ROADS_MAPPING);

    sld_remap()
        .current_dir(workspace.path())
        .args(["init", "--mapping", "mapping.yml", "--config", "remap.yaml"])
        .assert()
        .success();
    let skeleton = workspace.read("remap.yaml");
    assert!(skeleton.contains("roads_gen1: []"));
    assert!(skeleton.contains("landuse: []"));
    assert!(skeleton.contains("mapping.yml"));

    sld_remap()
        .current_dir(workspace.path())
        .args(["init", "--mapping", "mapping.yml", "--config", "remap.yaml"])
        .assert()
        .failure()
        .stderr(contains("--force"));

    sld_remap()
        .current_dir(workspace.path())
        .args([
            "init",
            "--mapping",
            "mapping.yml",
            "--config",
            "remap.yaml",
            "--force",
        ])
        .assert()
        .success();
}
