//! Sheetcraft Data -- turns spreadsheet workbooks into validated tables.
//!
//! # Pipeline
//!
//! 1. **Route** -- [`routing`] maps each sheet to a logical table (and an
//!    optional sub-table) from its display name.
//! 2. **Decode** -- [`sheet`] reads header rows into field declarations and
//!    data rows into raw cells, following the workbook's [`routing::TableFamily`].
//! 3. **Assemble** -- [`assembler::TableAssembler`] merges contributions from
//!    every sheet, rejecting schema conflicts and duplicate ids.
//! 4. **Freeze** -- cells are parsed against the merged schema and the open
//!    tables become a [`tableset::TableSet`], exportable with `bitcode`.
//!
//! [`ingest::ingest_workbooks`] runs the whole pipeline, one rayon task per
//! workbook.
//!
//! # Key Types
//!
//! - [`config::ImportConfig`] -- Header layout, export markers and file-family
//!   prefixes, loadable from RON, TOML or JSON.
//! - [`ingest::ImportReport`] -- Validated tables, broken tables and issues.
//! - [`error::AssembleError`] -- Why a contribution or a table was rejected.

pub mod assembler;
pub mod config;
pub mod error;
pub mod id;
pub mod ingest;
pub mod routing;
pub mod sheet;
pub mod tableset;

pub use config::{ConfigError, ImportConfig};
pub use error::{AssembleError, Issue, IssueKind};
pub use id::{RowId, SheetOrigin};
pub use ingest::{ingest_workbooks, ImportReport};
pub use routing::{RouteError, SheetRoute, TableFamily};
pub use sheet::{RawSheet, Workbook};
pub use tableset::{
    BrokenTable, DecodeError, EmittedField, ExportError, RowRecord, TableRows, TableSet,
    ValidatedTable,
};
