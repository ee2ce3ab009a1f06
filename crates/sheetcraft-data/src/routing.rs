//! Sheet-name routing: which logical table a sheet contributes to.
//!
//! A sheet's display name carries its route as `<Table>` with an optional
//! `|SubTable` suffix, e.g. `Weapons <Item>|Melee`. Text outside the angle
//! brackets is free-form. A name starting with [`WILDCARD`] defers the route
//! to the sheet's top-left cell, which uses the same syntax.

use serde::{Deserialize, Serialize};

/// Marks a sheet whose route lives in cell (0, 0).
pub const WILDCARD: char = '*';

/// Which merge rules a workbook's sheets follow. Decided by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableFamily {
    /// Header rows declare fields; data rows are keyed by `Id`.
    Ordinary,
    /// One `name | type | marker | value` entry per row, merged into a
    /// single row.
    Global,
    /// One string column per language, keyed by `Id`.
    Localization,
}

/// Resolved destination of a sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetRoute {
    pub table: String,
    /// Empty for the default partition.
    pub sub_table: String,
}

impl SheetRoute {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            sub_table: String::new(),
        }
    }

    pub fn with_sub_table(mut self, sub_table: &str) -> Self {
        self.sub_table = sub_table.to_string();
        self
    }

    pub fn is_default_partition(&self) -> bool {
        self.sub_table.is_empty()
    }
}

/// Why a sheet could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No `<Table>` marker; the sheet is not meant for import.
    #[error("'{text}' has no <Table> marker")]
    NoTableMarker { text: String },

    /// The text between the angle brackets is not an identifier.
    #[error("'{name}' is not a valid table name")]
    InvalidTableName { name: String },

    /// Brackets or sub-table suffix are malformed.
    #[error("malformed route '{text}': {reason}")]
    Malformed { text: String, reason: &'static str },

    /// A wildcard sheet whose top-left cell is empty.
    #[error("wildcard sheet '{sheet}' has an empty top-left cell")]
    WildcardWithoutCell { sheet: String },
}

fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parse `<Table>` and an optional `|SubTable` out of `text`.
pub fn parse_route(text: &str) -> Result<SheetRoute, RouteError> {
    let Some(open) = text.find('<') else {
        return Err(RouteError::NoTableMarker {
            text: text.to_string(),
        });
    };
    let after_open = &text[open + 1..];
    let Some(close) = after_open.find('>') else {
        return Err(RouteError::Malformed {
            text: text.to_string(),
            reason: "missing '>'",
        });
    };

    let name = after_open[..close].trim();
    if !is_valid_table_name(name) {
        return Err(RouteError::InvalidTableName {
            name: name.to_string(),
        });
    }
    let route = SheetRoute::new(name);

    let rest = after_open[close + 1..].trim_start();
    let Some(sep) = rest.chars().next().filter(|c| matches!(c, '|' | '｜')) else {
        return Ok(route);
    };
    let sub_table = rest[sep.len_utf8()..].trim();
    if sub_table.is_empty() {
        return Err(RouteError::Malformed {
            text: text.to_string(),
            reason: "empty sub-table after '|'",
        });
    }
    Ok(route.with_sub_table(sub_table))
}

pub fn is_wildcard(sheet_name: &str) -> bool {
    sheet_name.trim_start().starts_with(WILDCARD)
}

/// Route a sheet by its display name, reading the top-left cell for
/// wildcard sheets.
pub fn resolve_route(sheet_name: &str, top_left: Option<&str>) -> Result<SheetRoute, RouteError> {
    if !is_wildcard(sheet_name) {
        return parse_route(sheet_name);
    }
    match top_left.map(str::trim).filter(|cell| !cell.is_empty()) {
        Some(cell) => parse_route(cell),
        None => Err(RouteError::WildcardWithoutCell {
            sheet: sheet_name.to_string(),
        }),
    }
}
