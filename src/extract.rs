//! Requirement extraction from a single SLD file.
//!
//! The generic tree is walked once in pre-order. `PropertyName` elements
//! contribute columns and literal samples, `VendorOption name="sortBy"`
//! contributes sort columns, and every `Rule` is decoded into a typed
//! [`Rule`] for scale aggregation and filter classification after the walk.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::classify::{NoFilterPolicy, classify_rule, sibling_literals};
use crate::error::StyleError;
use crate::requirements::{MappingColumnNames, ParsedStyle, ScaleEnvelope, TableRequirements};
use crate::rule::Rule;
use crate::xml_tree::{Walk, XmlTree};

pub const STYLE_EXTENSION: &str = "sld";

/// Reads and analyzes one style file.
pub fn extract_requirements(
    path: &Path,
    mapping_columns: &MappingColumnNames,
    policy: NoFilterPolicy,
) -> Result<ParsedStyle, StyleError> {
    let is_style = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(STYLE_EXTENSION));
    if !is_style {
        return Err(StyleError::Format {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(|source| StyleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    extract_from_bytes(path, bytes, mapping_columns, policy)
}

/// Analyzes style content already in memory; `source` only labels the result.
pub fn extract_from_bytes(
    source: &Path,
    bytes: impl Into<Vec<u8>>,
    mapping_columns: &MappingColumnNames,
    policy: NoFilterPolicy,
) -> Result<ParsedStyle, StyleError> {
    let tree = XmlTree::parse(bytes).map_err(|err| err.with_path(source))?;
    let value_column = mapping_columns.value.as_deref();

    let mut requirements = TableRequirements::new(mapping_columns.clone());
    let mut rules = Vec::new();

    tree.walk(|tree, id| {
        match tree.name(id) {
            "PropertyName" => {
                let column = tree.text(id);
                if column.is_empty() {
                    return Walk::Descend;
                }
                let literals = tree
                    .parent(id)
                    .map(|parent| sibling_literals(tree, parent))
                    .unwrap_or_default();
                if mapping_columns.is_value_column(&column) {
                    requirements.mapping_values.extend(literals.iter().cloned());
                }
                requirements.add_column(&column, literals);
            }
            "VendorOption" if tree.attribute(id, "name") == Some("sortBy") => {
                for column in sort_columns(&tree.text(id)) {
                    requirements.add_column(column, Vec::<String>::new());
                }
            }
            "Rule" => rules.push(Rule::decode(tree.inner_xml(id))),
            _ => {}
        }
        Walk::Descend
    });

    let mut scale = ScaleEnvelope::default();
    let mut all_explicit = !rules.is_empty();

    for decoded in rules {
        let rule = match decoded {
            Ok(rule) => rule,
            Err(err) => {
                warn!("{source:?}: skipping rule: {err}");
                all_explicit = false;
                continue;
            }
        };
        scale = scale.observe(rule.min_bound(), rule.max_bound());

        match classify_rule(&rule, value_column, policy) {
            Ok(outcome) => {
                debug!(
                    "{source:?}: rule '{}' explicit={}",
                    rule.name, outcome.explicit
                );
                all_explicit &= outcome.explicit;
                requirements
                    .implicit_filtered_values
                    .extend(outcome.excluded_values);
            }
            Err(err) => {
                warn!("{source:?}: {err}");
                all_explicit = false;
            }
        }
    }

    Ok(ParsedStyle {
        source: source.to_path_buf(),
        requirements,
        scale,
        use_all_mapping_types: !all_explicit,
    })
}

/// Column names of a GeoServer `sortBy` option such as `z_order D, name`.
fn sort_columns(option: &str) -> impl Iterator<Item = &str> {
    option
        .split(',')
        .filter_map(|part| part.split_whitespace().next())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::requirements::MaxScale;

    fn columns() -> MappingColumnNames {
        MappingColumnNames::new(Some("class"), Some("type"))
    }

    fn style(rules: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<StyledLayerDescriptor xmlns="http://www.opengis.net/sld" xmlns:ogc="http://www.opengis.net/ogc">
  <NamedLayer><UserStyle><FeatureTypeStyle>
    {rules}
  </FeatureTypeStyle></UserStyle></NamedLayer>
</StyledLayerDescriptor>"#
        )
    }

    fn equality_rule(value: &str, min: u64, max: Option<u64>) -> String {
        let max = max
            .map(|m| format!("<MaxScaleDenominator>{m}</MaxScaleDenominator>"))
            .unwrap_or_default();
        format!(
            "<Rule><Name>{value}</Name><ogc:Filter><ogc:PropertyIsEqualTo>\
             <ogc:PropertyName>type</ogc:PropertyName><ogc:Literal>{value}</ogc:Literal>\
             </ogc:PropertyIsEqualTo></ogc:Filter>\
             <MinScaleDenominator>{min}</MinScaleDenominator>{max}<LineSymbolizer/></Rule>"
        )
    }

    fn parse(content: &str) -> ParsedStyle {
        extract_from_bytes(
            Path::new("roads.sld"),
            content,
            &columns(),
            NoFilterPolicy::default(),
        )
        .expect("extract")
    }

    #[test]
    fn collects_columns_values_and_scale() {
        let rules = [
            equality_rule("primary", 2000, Some(100_000)),
            equality_rule("secondary", 500, Some(50_000)),
        ]
        .concat();
        let parsed = parse(&style(&rules));

        assert!(!parsed.use_all_mapping_types);
        assert_eq!(
            parsed.requirements.mapping_values,
            BTreeSet::from(["primary".to_string(), "secondary".to_string()])
        );
        assert_eq!(parsed.requirements.columns["type"].len(), 2);
        assert_eq!(parsed.scale.min, Some(500));
        assert_eq!(parsed.scale.max, MaxScale::Finite(100_000));
    }

    #[test]
    fn byte_order_mark_and_comments_do_not_change_requirements() {
        let rules = [
            equality_rule("primary", 2000, Some(100_000)),
            equality_rule("secondary", 500, Some(50_000)),
        ]
        .concat();
        let plain = parse(&style(&rules));

        let marked = parse(&format!("\u{feff}{}", style(&rules)));
        assert_eq!(marked.requirements, plain.requirements);
        assert_eq!(marked.scale, plain.scale);

        let commented = rules.replace(
            "<ogc:Literal>primary",
            "<ogc:Literal><!-- main roads -->primary",
        );
        let commented = parse(&style(&commented));
        assert_eq!(commented.requirements, plain.requirements);
        assert!(!commented.use_all_mapping_types);
    }

    #[test]
    fn unbounded_rule_makes_envelope_unbounded() {
        let rules = [
            equality_rule("a", 0, Some(100_000)),
            equality_rule("b", 0, None),
            equality_rule("c", 0, Some(50_000)),
        ]
        .concat();
        assert_eq!(parse(&style(&rules)).scale.max, MaxScale::Unbounded);
    }

    #[test]
    fn unfiltered_rule_keeps_all_mapping_types() {
        let rules = [
            equality_rule("primary", 0, Some(10_000)),
            "<Rule><LineSymbolizer/></Rule>".to_string(),
        ]
        .concat();
        assert!(parse(&style(&rules)).use_all_mapping_types);
    }

    #[test]
    fn style_without_rules_keeps_all_mapping_types() {
        let parsed = parse(&style(""));
        assert!(parsed.use_all_mapping_types);
        assert_eq!(parsed.scale, ScaleEnvelope::default());
    }

    #[test]
    fn records_sort_columns_and_other_literals() {
        let rules = r#"<Rule>
            <ogc:Filter><ogc:And>
              <ogc:PropertyIsEqualTo><ogc:PropertyName>type</ogc:PropertyName><ogc:Literal>primary</ogc:Literal></ogc:PropertyIsEqualTo>
              <ogc:PropertyIsEqualTo><ogc:PropertyName>bridge</ogc:PropertyName><ogc:Literal>1</ogc:Literal></ogc:PropertyIsEqualTo>
            </ogc:And></ogc:Filter>
            <LineSymbolizer/>
            <TextSymbolizer><Label><ogc:PropertyName>name</ogc:PropertyName></Label></TextSymbolizer>
            <VendorOption name="sortBy">z_order D, layer</VendorOption>
          </Rule>
          <Rule>
            <ogc:Filter><ogc:PropertyIsEqualTo><ogc:PropertyName>bridge</ogc:PropertyName><ogc:Literal>0</ogc:Literal></ogc:PropertyIsEqualTo></ogc:Filter>
          </Rule>"#;
        let parsed = parse(&style(rules));
        let columns: Vec<&str> = parsed
            .requirements
            .columns
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(columns, vec!["bridge", "layer", "name", "type", "z_order"]);
        assert_eq!(
            parsed.requirements.columns["bridge"],
            BTreeSet::from(["0".to_string(), "1".to_string()])
        );
        assert!(parsed.requirements.columns["name"].is_empty());
        // second rule never mentions the mapping value column
        assert!(parsed.use_all_mapping_types);
    }

    #[test]
    fn not_equal_literals_are_recorded_as_excluded() {
        let rules = "<Rule><ogc:Filter><ogc:PropertyIsNotEqualTo>\
             <ogc:PropertyName>type</ogc:PropertyName><ogc:Literal>footway</ogc:Literal>\
             </ogc:PropertyIsNotEqualTo></ogc:Filter></Rule>";
        let parsed = parse(&style(rules));
        assert!(parsed.use_all_mapping_types);
        assert!(
            parsed
                .requirements
                .implicit_filtered_values
                .contains("footway")
        );
    }

    #[test]
    fn undecodable_rule_blocks_narrowing() {
        let rules = [
            equality_rule("primary", 0, Some(10_000)),
            "<Rule><MinScaleDenominator>huge</MinScaleDenominator></Rule>".to_string(),
        ]
        .concat();
        let parsed = parse(&style(&rules));
        assert!(parsed.use_all_mapping_types);
        assert!(parsed.requirements.mapping_values.contains("primary"));
    }

    #[test]
    fn rejects_wrong_extension_and_malformed_xml() {
        let err = extract_requirements(
            Path::new("roads.xml"),
            &columns(),
            NoFilterPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StyleError::Format { .. }));

        let err = extract_from_bytes(
            Path::new("broken.sld"),
            "<StyledLayerDescriptor><Rule>",
            &columns(),
            NoFilterPolicy::default(),
        )
        .unwrap_err();
        match err {
            StyleError::Parse { path, .. } => assert_eq!(path, Path::new("broken.sld")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = extract_requirements(
            Path::new("/nonexistent/roads.sld"),
            &columns(),
            NoFilterPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StyleError::Io { .. }));
    }
}
