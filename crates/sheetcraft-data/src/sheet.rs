//! Decoding raw sheets into assembler contributions.
//!
//! Ordinary sheet layout (`header_rows` defaults to 4):
//!
//! | row | content |
//! |-----|---------|
//! | 0 | title / comment (wildcard sheets: the route) |
//! | 1 | type annotation per column |
//! | 2 | export marker per column |
//! | 3 | field name per column |
//! | 4.. | data |
//!
//! Localization sheets use row 1 for names (`Id` then language codes) and
//! start data at row 2. Global sheets list one `name | type | marker | value`
//! entry per row after the title row.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assembler::{FieldDecl, GlobalEntry, RawRow, TableAssembler, ID_FIELD};
use crate::config::ImportConfig;
use crate::error::{AssembleError, Issue, IssueKind};
use crate::id::SheetOrigin;
use crate::routing::{resolve_route, SheetRoute, TableFamily};

const TYPE_ROW: usize = 1;
const MARKER_ROW: usize = 2;
const NAME_ROW: usize = 3;

const LOCALIZATION_NAME_ROW: usize = 1;
const LOCALIZATION_HEADER_ROWS: usize = 2;

const GLOBAL_HEADER_ROWS: usize = 1;

/// One sheet as delivered by the spreadsheet reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSheet {
    pub name: String,
    /// Row-major cell text.
    pub rows: Vec<Vec<String>>,
}

impl RawSheet {
    pub fn new(name: &str, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }

    /// Build from string slices, mainly for tests and fixtures.
    pub fn from_rows(name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        Self::new(name, rows)
    }

    /// Cell text, or `""` outside the sheet.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// One spreadsheet file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    pub file_name: String,
    pub sheets: Vec<RawSheet>,
}

impl Workbook {
    pub fn new(file_name: &str, sheets: Vec<RawSheet>) -> Self {
        Self {
            file_name: file_name.to_string(),
            sheets,
        }
    }
}

/// Route one sheet and feed its content into the assembler. Returns every
/// issue raised along the way.
pub fn decode_sheet(
    assembler: &TableAssembler,
    config: &ImportConfig,
    file_name: &str,
    family: TableFamily,
    sheet: &RawSheet,
) -> Vec<Issue> {
    let origin = SheetOrigin::new(file_name, &sheet.name);
    let top_left = sheet.rows.first().and_then(|r| r.first()).map(String::as_str);
    let route = match resolve_route(&sheet.name, top_left) {
        Ok(route) => route,
        Err(e) => {
            debug!(%origin, error = %e, "sheet skipped");
            return vec![Issue::new(e).at(&origin)];
        }
    };
    debug!(%origin, table = %route.table, sub_table = %route.sub_table, ?family, "sheet routed");

    match family {
        TableFamily::Ordinary => {
            let decls = (0..sheet.width())
                .map(|column| {
                    FieldDecl::new(
                        sheet.cell(NAME_ROW, column),
                        column,
                        sheet.cell(TYPE_ROW, column),
                        config.is_export_marker(sheet.cell(MARKER_ROW, column)),
                    )
                })
                .collect();
            decode_keyed(assembler, &origin, &route, family, sheet, decls, config.header_rows)
        }
        TableFamily::Localization => {
            let decls = (0..sheet.width())
                .map(|column| {
                    let name = sheet.cell(LOCALIZATION_NAME_ROW, column).trim();
                    let annotation = if name == ID_FIELD { "string!" } else { "string" };
                    FieldDecl::new(name, column, annotation, true)
                })
                .collect();
            decode_keyed(
                assembler,
                &origin,
                &route,
                family,
                sheet,
                decls,
                LOCALIZATION_HEADER_ROWS,
            )
        }
        TableFamily::Global => decode_global(assembler, config, &origin, &route, sheet),
    }
}

/// Once a table is broken the rest of the sheet is rejected anyway.
fn stops_sheet(e: &AssembleError) -> bool {
    e.is_table_fatal() || matches!(e, AssembleError::TableBroken { .. })
}

fn decode_keyed(
    assembler: &TableAssembler,
    origin: &SheetOrigin,
    route: &SheetRoute,
    family: TableFamily,
    sheet: &RawSheet,
    decls: Vec<FieldDecl>,
    header_rows: usize,
) -> Vec<Issue> {
    let declared = match assembler.add_fields(origin, route, family, &decls) {
        Ok(declared) => declared,
        Err(e) => return vec![Issue::new(e).at(origin)],
    };

    let mut issues = Vec::new();
    for line in header_rows..sheet.rows.len() {
        let mut row = RawRow::new(line);
        for field in &declared {
            let text = sheet.cell(line, field.column);
            if !text.trim().is_empty() {
                row = row.with_cell(&field.name, field.column, text);
            }
        }
        // Text in skipped columns alone does not make a data row.
        if row.cells.is_empty() {
            continue;
        }
        if let Err(e) = assembler.add_row(origin, route, row) {
            let stop = stops_sheet(&e);
            let (at, at_line) = e
                .dropped_row()
                .map(|(dropped, dropped_line)| (dropped.clone(), dropped_line))
                .unwrap_or_else(|| (origin.clone(), line));
            issues.push(Issue::new(e).at(&at).row(at_line));
            if stop {
                break;
            }
        }
    }
    issues
}

fn decode_global(
    assembler: &TableAssembler,
    config: &ImportConfig,
    origin: &SheetOrigin,
    route: &SheetRoute,
    sheet: &RawSheet,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    if !route.is_default_partition() {
        debug!(%origin, sub_table = %route.sub_table, "global sheet partition suffix ignored");
    }

    for line in GLOBAL_HEADER_ROWS..sheet.rows.len() {
        let name = sheet.cell(line, 0).trim();
        if name.is_empty() {
            continue;
        }
        let entry = GlobalEntry {
            line,
            name: name.to_string(),
            annotation: sheet.cell(line, 1).to_string(),
            exported: config.is_export_marker(sheet.cell(line, 2)),
            value: sheet.cell(line, 3).to_string(),
        };
        if let Err(e) = assembler.add_global_entry(origin, &route.table, entry) {
            let stop = stops_sheet(&e);
            issues.push(Issue::new(IssueKind::Rejected(e)).at(origin).row(line));
            if stop {
                break;
            }
        }
    }
    issues
}
