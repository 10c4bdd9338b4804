//! Rewrites the `sql_filter` of a generalized table.
//!
//! The existing filter is lexed just far enough to find its top-level
//! `AND`/`OR` boundaries (ignoring parenthesized groups, string literals and
//! the `AND` of a `BETWEEN`). Clauses mentioning the mapping key or value
//! column are dropped and replaced by a single `IN` clause over the required
//! mapping values.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::requirements::MappingColumnNames;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    QuotedIdent,
    Literal,
    Open,
    Close,
    Symbol,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

impl Connector {
    fn as_sql(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

#[derive(Debug, Clone)]
struct Clause<'a> {
    /// Connector joining this clause to the previous one.
    connector: Option<Connector>,
    text: &'a str,
    tokens: Vec<Token>,
}

fn tokenize(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        let byte = bytes[pos];
        let kind = match byte {
            b if b.is_ascii_whitespace() => {
                pos += 1;
                continue;
            }
            b'\'' | b'"' => {
                pos = quoted_end(bytes, pos, byte);
                if byte == b'\'' {
                    TokenKind::Literal
                } else {
                    TokenKind::QuotedIdent
                }
            }
            b'(' => {
                pos += 1;
                TokenKind::Open
            }
            b')' => {
                pos += 1;
                TokenKind::Close
            }
            b if is_word_byte(b) => {
                while pos < bytes.len() && is_word_byte(bytes[pos]) {
                    pos += 1;
                }
                TokenKind::Word
            }
            _ => {
                pos += 1;
                while pos < bytes.len() && !sql.is_char_boundary(pos) {
                    pos += 1;
                }
                TokenKind::Symbol
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }
    tokens
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.' || byte >= 0x80
}

/// End offset of a quoted run starting at `start`; a doubled quote is an
/// escaped quote. Unterminated runs extend to the end of input.
fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    bytes.len()
}

fn keyword(sql: &str, token: &Token) -> Option<&'static str> {
    if token.kind != TokenKind::Word {
        return None;
    }
    let word = &sql[token.start..token.end];
    ["AND", "OR", "BETWEEN"]
        .into_iter()
        .find(|kw| word.eq_ignore_ascii_case(kw))
}

fn split_clauses(sql: &str) -> Vec<Clause<'_>> {
    let tokens = tokenize(sql);
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut pending_between = false;
    let mut connector = None;
    let mut current: Vec<Token> = Vec::new();

    let mut flush = |connector: Option<Connector>, current: &mut Vec<Token>| {
        if let (Some(first), Some(last)) = (current.first(), current.last()) {
            clauses.push(Clause {
                connector,
                text: &sql[first.start..last.end],
                tokens: std::mem::take(current),
            });
        }
    };

    for token in tokens {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 {
            match keyword(sql, &token) {
                Some("BETWEEN") => pending_between = true,
                Some("AND") if pending_between => pending_between = false,
                Some(kw @ ("AND" | "OR")) => {
                    flush(connector, &mut current);
                    connector = Some(if kw == "AND" {
                        Connector::And
                    } else {
                        Connector::Or
                    });
                    continue;
                }
                _ => {}
            }
        }
        current.push(token);
    }
    flush(connector, &mut current);
    clauses
}

fn references_column(sql: &str, clause: &Clause<'_>, column: &str) -> bool {
    clause.tokens.iter().any(|token| {
        let raw = &sql[token.start..token.end];
        match token.kind {
            TokenKind::Word => raw
                .rsplit('.')
                .next()
                .is_some_and(|name| name.eq_ignore_ascii_case(column)),
            TokenKind::QuotedIdent => raw.trim_matches('"') == column,
            _ => false,
        }
    })
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Builds `<value_column> IN ('a', 'b')` over the values in sorted order.
pub fn in_clause(column: &str, values: &BTreeSet<String>) -> String {
    format!(
        "{column} IN ({})",
        values.iter().map(|value| quote_literal(value)).join(", ")
    )
}

/// Returns the filter a generalized table should carry.
///
/// Without narrowing (or without required values or a value column) the
/// original filter is returned verbatim.
pub fn synthesize_sql_filter(
    original: Option<&str>,
    columns: &MappingColumnNames,
    required_values: &BTreeSet<String>,
    narrow: bool,
) -> Option<String> {
    let value_column = match columns.value.as_deref() {
        Some(column) if narrow && !required_values.is_empty() => column,
        _ => return original.map(str::to_string),
    };

    let fresh = in_clause(value_column, required_values);
    let Some(original) = original.filter(|sql| !sql.trim().is_empty()) else {
        return Some(fresh);
    };

    let mapping_columns: Vec<&str> = [columns.key.as_deref(), columns.value.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    let kept: Vec<Clause<'_>> = split_clauses(original)
        .into_iter()
        .filter(|clause| {
            !mapping_columns
                .iter()
                .any(|column| references_column(original, clause, column))
        })
        .collect();

    if kept.is_empty() {
        return Some(fresh);
    }

    let mut rest = String::new();
    for (idx, clause) in kept.iter().enumerate() {
        if idx > 0 {
            let connector = clause.connector.unwrap_or(Connector::And);
            rest.push(' ');
            rest.push_str(connector.as_sql());
            rest.push(' ');
        }
        rest.push_str(clause.text);
    }
    let has_or = kept
        .iter()
        .skip(1)
        .any(|clause| clause.connector == Some(Connector::Or));

    Some(if has_or {
        format!("{fresh} AND ({rest})")
    } else {
        format!("{fresh} AND {rest}")
    })
}
