//! Plain-text tables for the `inspect` command.

use std::fmt::{self, Write as _};

use itertools::Itertools;

use crate::requirements::ParsedStyle;

pub const INSPECT_HEADERS: [&str; 7] = [
    "file",
    "columns",
    "mapping values",
    "excluded values",
    "min scale",
    "max scale",
    "all types",
];

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Adds a row; missing cells render empty and extra cells are dropped.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| cell_width(h)).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell_width(cell));
            }
        }
        widths
    }
}

impl fmt::Display for TextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat((*w).max(3))).collect();
        writeln!(f, "{}", format_line(&self.headers, &widths))?;
        writeln!(f, "{}", format_line(&rule, &widths))?;
        for row in &self.rows {
            writeln!(f, "{}", format_line(row, &widths))?;
        }
        Ok(())
    }
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, (cell, &width)) in cells.iter().zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let flat = flatten(cell);
        let _ = write!(line, "{flat:<width$}");
    }
    line.truncate(line.trim_end().len());
    line
}

fn flatten(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}

fn cell_width(cell: &str) -> usize {
    cell.chars().count()
}

fn list(values: impl IntoIterator<Item = impl fmt::Display>) -> String {
    let joined = values.into_iter().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

/// One row per analyzed style file.
pub fn inspect_table(styles: &[ParsedStyle]) -> TextTable {
    let mut table = TextTable::new(INSPECT_HEADERS);
    for style in styles {
        let requirements = &style.requirements;
        table.push_row(vec![
            style.source.display().to_string(),
            list(requirements.columns.keys()),
            list(&requirements.mapping_values),
            list(&requirements.implicit_filtered_values),
            style
                .scale
                .min
                .map_or_else(|| "-".to_string(), |min| min.to_string()),
            style.scale.max.to_string(),
            if style.use_all_mapping_types { "yes" } else { "no" }.to_string(),
        ]);
    }
    table
}
