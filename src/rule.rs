//! Typed view of an SLD `Rule`.
//!
//! A rule is decoded in two steps: the generic tree captures the rule's inner
//! bytes, then [`Rule::decode`] re-wraps them as a standalone `<Rule>`
//! document and converts the handful of elements that matter. Everything else
//! inside the rule is ignored.

use std::fmt;

use crate::error::StyleError;
use crate::requirements::MaxScale;
use crate::xml_tree::{NodeId, XmlTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolizerKind {
    Point,
    Line,
    Polygon,
    Text,
    Raster,
}

impl SymbolizerKind {
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "PointSymbolizer" => Some(SymbolizerKind::Point),
            "LineSymbolizer" => Some(SymbolizerKind::Line),
            "PolygonSymbolizer" => Some(SymbolizerKind::Polygon),
            "TextSymbolizer" => Some(SymbolizerKind::Text),
            "RasterSymbolizer" => Some(SymbolizerKind::Raster),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SymbolizerKind::Point => "point",
            SymbolizerKind::Line => "line",
            SymbolizerKind::Polygon => "polygon",
            SymbolizerKind::Text => "text",
            SymbolizerKind::Raster => "raster",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub title: String,
    pub abstract_text: String,
    pub min_scale: Option<u64>,
    pub max_scale: Option<u64>,
    /// Inner bytes of the `Filter` element, if the rule has one.
    pub filter: Option<Vec<u8>>,
    pub else_filter: bool,
    pub symbolizers: Vec<SymbolizerKind>,
}

impl Rule {
    /// Decodes the inner content of a `Rule` element.
    pub fn decode(inner: &[u8]) -> Result<Rule, StyleError> {
        let tree = XmlTree::parse_fragment("Rule", inner).map_err(|err| StyleError::Rule {
            message: err.to_string(),
        })?;
        Rule::from_tree(&tree, tree.root())
    }

    /// Converts a `Rule` node of an already built tree.
    pub fn from_tree(tree: &XmlTree, rule: NodeId) -> Result<Rule, StyleError> {
        let mut decoded = Rule::default();
        for child in tree.children(rule) {
            match tree.name(child) {
                "Name" => decoded.name = tree.text(child),
                "Title" => decoded.title = tree.text(child),
                "Abstract" => decoded.abstract_text = tree.text(child),
                "MinScaleDenominator" => {
                    decoded.min_scale = Some(parse_scale(&tree.text(child))?);
                }
                "MaxScaleDenominator" => {
                    decoded.max_scale = Some(parse_scale(&tree.text(child))?);
                }
                "Filter" => decoded.filter = Some(tree.inner_xml(child).to_vec()),
                "ElseFilter" => decoded.else_filter = true,
                other => {
                    if let Some(kind) = SymbolizerKind::from_element(other) {
                        decoded.symbolizers.push(kind);
                    }
                }
            }
        }
        Ok(decoded)
    }

    /// Lower bound used for scale aggregation; a missing bound means the rule
    /// is active down to the largest scale.
    pub fn min_bound(&self) -> u64 {
        self.min_scale.unwrap_or(0)
    }

    /// A missing or zero `MaxScaleDenominator` means no ceiling.
    pub fn max_bound(&self) -> MaxScale {
        match self.max_scale {
            None | Some(0) => MaxScale::Unbounded,
            Some(value) => MaxScale::Finite(value),
        }
    }

    pub fn has_symbolizer(&self, kind: SymbolizerKind) -> bool {
        self.symbolizers.contains(&kind)
    }
}

/// Accepts `50000`, `50000.0` and `5.0E4`; fractional parts are dropped.
fn parse_scale(raw: &str) -> Result<u64, StyleError> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value.trunc() as u64),
        _ => Err(StyleError::Rule {
            message: format!("invalid scale denominator '{trimmed}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rule_fragment() {
        let inner = br#"
            <se:Name>motorway</se:Name>
            <se:Title>Motorways</se:Title>
            <ogc:Filter><ogc:PropertyIsEqualTo><ogc:PropertyName>type</ogc:PropertyName><ogc:Literal>motorway</ogc:Literal></ogc:PropertyIsEqualTo></ogc:Filter>
            <se:MinScaleDenominator>500</se:MinScaleDenominator>
            <se:MaxScaleDenominator>5.0E4</se:MaxScaleDenominator>
            <se:LineSymbolizer><se:Stroke/></se:LineSymbolizer>
            <se:TextSymbolizer><se:Label>name</se:Label></se:TextSymbolizer>
        "#;
        let rule = Rule::decode(inner).expect("decode rule");
        assert_eq!(rule.name, "motorway");
        assert_eq!(rule.title, "Motorways");
        assert_eq!(rule.min_scale, Some(500));
        assert_eq!(rule.max_bound(), MaxScale::Finite(50_000));
        assert!(rule.filter.as_deref().is_some_and(|f| f.starts_with(b"<ogc:PropertyIsEqualTo>")));
        assert_eq!(
            rule.symbolizers,
            vec![SymbolizerKind::Line, SymbolizerKind::Text]
        );
        assert!(rule.has_symbolizer(SymbolizerKind::Text));
    }

    #[test]
    fn missing_or_zero_max_scale_is_unbounded() {
        let rule = Rule::decode(b"<Name>a</Name>").expect("decode");
        assert_eq!(rule.max_bound(), MaxScale::Unbounded);
        assert_eq!(rule.min_bound(), 0);
        assert!(rule.filter.is_none());

        let zero = Rule::decode(b"<MaxScaleDenominator>0</MaxScaleDenominator>").expect("decode");
        assert_eq!(zero.max_bound(), MaxScale::Unbounded);
    }

    #[test]
    fn notes_else_filter() {
        let rule = Rule::decode(b"<ElseFilter/><PointSymbolizer/>").expect("decode");
        assert!(rule.else_filter);
        assert_eq!(rule.symbolizers, vec![SymbolizerKind::Point]);
    }

    #[test]
    fn rejects_bad_scale_and_broken_markup() {
        assert!(matches!(
            Rule::decode(b"<MinScaleDenominator>large</MinScaleDenominator>"),
            Err(StyleError::Rule { .. })
        ));
        assert!(matches!(
            Rule::decode(b"<Filter><PropertyName>x</Filter>"),
            Err(StyleError::Rule { .. })
        ));
    }
}
