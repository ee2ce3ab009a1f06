use sheetcraft_core::GrammarError;
use std::fmt;

use crate::id::{RowId, SheetOrigin};
use crate::routing::{RouteError, TableFamily};

// ===========================================================================
// Assembly errors
// ===========================================================================

/// Rejections raised while merging sheets into tables.
///
/// Table-fatal variants (see [`AssembleError::is_table_fatal`]) move the
/// table to the broken state; every later contribution to that table is
/// rejected with [`AssembleError::TableBroken`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    /// The table already broke; the contribution was dropped.
    #[error("table '{table}' is broken")]
    TableBroken { table: String },

    /// Two declarations of one field disagree on type.
    #[error("field '{field}' of table '{table}' declared as '{existing}' and '{incoming}'")]
    SchemaConflict {
        table: String,
        field: String,
        existing: String,
        incoming: String,
    },

    /// A sheet declared fields but no `Id`.
    #[error("table '{table}' declares no 'Id' field")]
    MissingId { table: String },

    /// `Id` is nullable, a container, or not an integer/string kind.
    #[error(
        "'Id' of table '{table}' has type '{identity}'; expected a non-nullable integer or string"
    )]
    InvalidId { table: String, identity: String },

    /// A field annotation did not parse.
    #[error("field '{field}' of table '{table}': {source}")]
    Grammar {
        table: String,
        field: String,
        #[source]
        source: GrammarError,
    },

    /// The same field name appears twice in one sheet's header.
    #[error("field '{field}' declared twice in one sheet of table '{table}'")]
    DuplicateField { table: String, field: String },

    /// Sheets of two different families route to one table.
    #[error("table '{table}' is claimed by both {first:?} and {second:?} sheets")]
    FamilyConflict {
        table: String,
        first: TableFamily,
        second: TableFamily,
    },

    /// Two rows of one partition share an id. The row from the earliest
    /// `(file, sheet, line)` is kept.
    #[error(
        "duplicate id {id} in table '{table}' (partition '{sub_table}'): \
         row {dropped_line} of {dropped} dropped, row {kept_line} of {kept} kept"
    )]
    DuplicateId {
        table: String,
        sub_table: String,
        id: RowId,
        kept: SheetOrigin,
        kept_line: usize,
        dropped: SheetOrigin,
        dropped_line: usize,
    },

    /// A data row left its `Id` cell blank.
    #[error("row {line} of table '{table}' has no id")]
    MissingRowId { table: String, line: usize },

    /// A data row's `Id` cell does not hold a usable id.
    #[error("row {line} of table '{table}' has invalid id '{text}'")]
    InvalidRowId {
        table: String,
        line: usize,
        text: String,
    },

    /// A global entry name was defined more than once.
    #[error("global key '{key}' of table '{table}' defined more than once")]
    DuplicateGlobalKey { table: String, key: String },

    /// A row arrived for a table that has no declared fields.
    #[error("table '{table}' has no declared fields")]
    UnknownTable { table: String },
}

impl AssembleError {
    /// Whether this error breaks the whole table rather than one row.
    pub fn is_table_fatal(&self) -> bool {
        matches!(
            self,
            AssembleError::SchemaConflict { .. }
                | AssembleError::MissingId { .. }
                | AssembleError::InvalidId { .. }
                | AssembleError::Grammar { .. }
                | AssembleError::DuplicateField { .. }
                | AssembleError::FamilyConflict { .. }
        )
    }

    /// The sheet row the error should be reported against, when it is not
    /// the row being contributed. A duplicate id can displace a stored row
    /// from a later sheet; that row is the one dropped.
    pub fn dropped_row(&self) -> Option<(&SheetOrigin, usize)> {
        match self {
            AssembleError::DuplicateId {
                dropped,
                dropped_line,
                ..
            } => Some((dropped, *dropped_line)),
            _ => None,
        }
    }

    /// Name of the table the error concerns.
    pub fn table(&self) -> &str {
        match self {
            AssembleError::TableBroken { table }
            | AssembleError::SchemaConflict { table, .. }
            | AssembleError::MissingId { table }
            | AssembleError::InvalidId { table, .. }
            | AssembleError::Grammar { table, .. }
            | AssembleError::DuplicateField { table, .. }
            | AssembleError::FamilyConflict { table, .. }
            | AssembleError::DuplicateId { table, .. }
            | AssembleError::MissingRowId { table, .. }
            | AssembleError::InvalidRowId { table, .. }
            | AssembleError::DuplicateGlobalKey { table, .. }
            | AssembleError::UnknownTable { table } => table,
        }
    }
}

// ===========================================================================
// Issues
// ===========================================================================

/// What went wrong with one piece of input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueKind {
    /// A cell only partly parsed; the value was kept with defaults.
    #[error("field '{field}': could not parse '{leftover}'")]
    CellLeftover { field: String, leftover: String },

    /// A contribution was rejected by the assembler.
    #[error(transparent)]
    Rejected(#[from] AssembleError),

    /// A sheet could not be routed and was skipped.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The workbook is an editor lock file.
    #[error("ignored lock file")]
    IgnoredFile,

    /// One custom type alias is declared with different shapes.
    #[error("custom type '{alias}' has conflicting shapes '{first}' and '{second}'")]
    AliasConflict {
        alias: String,
        first: String,
        second: String,
    },
}

/// A data-quality finding, located as precisely as the input allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// `None` for findings about the merged result.
    pub origin: Option<SheetOrigin>,
    pub row: Option<usize>,
    pub column: Option<usize>,
    pub kind: IssueKind,
}

impl Issue {
    pub fn new(kind: impl Into<IssueKind>) -> Self {
        Self {
            origin: None,
            row: None,
            column: None,
            kind: kind.into(),
        }
    }

    pub fn at(mut self, origin: &SheetOrigin) -> Self {
        self.origin = Some(origin.clone());
        self
    }

    pub fn row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    /// Whether the issue reports a table breaking.
    pub fn is_table_fatal(&self) -> bool {
        matches!(&self.kind, IssueKind::Rejected(e) if e.is_table_fatal())
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "{origin}")?;
            match (self.row, self.column) {
                (Some(row), Some(column)) => write!(f, " R{}C{}", row + 1, column + 1)?,
                (Some(row), None) => write!(f, " R{}", row + 1)?,
                (None, Some(column)) => write!(f, " C{}", column + 1)?,
                (None, None) => {}
            }
            f.write_str(": ")?;
        }
        write!(f, "{}", self.kind)
    }
}
