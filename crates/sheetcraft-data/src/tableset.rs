//! Validated output of an import run and its binary export.
//!
//! A [`TableSet`] is immutable once built. [`TableSet::to_bytes`] encodes it
//! with `bitcode` behind a versioned header so consumers can reject data
//! written by an incompatible importer before decoding the payload.

use serde::{Deserialize, Serialize};
use sheetcraft_core::{StructuralValue, TypeIdentity, TypeInfo};
use std::collections::BTreeMap;

use crate::error::AssembleError;
use crate::id::RowId;
use crate::routing::TableFamily;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying an exported table set.
pub const TABLESET_MAGIC: u32 = 0x5C7A_0001;

/// Current export format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while exporting a table set.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while reading an exported table set.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", TABLESET_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("table set from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("header announces {expected} tables, payload holds {found}")]
    CountMismatch { expected: u32, found: usize },
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A field as emitted to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedField {
    pub name: String,
    pub type_info: TypeInfo,
    pub identity: TypeIdentity,
    /// Rank in declaration order across all contributing sheets.
    pub order: usize,
}

/// One row; `values` line up with the table's emitted fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: RowId,
    pub values: Vec<StructuralValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableRows {
    /// Only the default partition exists.
    Flat(Vec<RowRecord>),
    /// Named sub-tables in name order; the default partition is `""`.
    Partitioned(Vec<(String, Vec<RowRecord>)>),
    /// The single row of a global table.
    Singleton(Vec<StructuralValue>),
}

impl TableRows {
    /// Every keyed row across partitions. Empty for a singleton.
    pub fn records(&self) -> Vec<&RowRecord> {
        match self {
            TableRows::Flat(rows) => rows.iter().collect(),
            TableRows::Partitioned(parts) => parts.iter().flat_map(|(_, rows)| rows).collect(),
            TableRows::Singleton(_) => Vec::new(),
        }
    }

    /// Rows of one sub-table (`""` for the default partition).
    pub fn partition(&self, sub_table: &str) -> Option<&[RowRecord]> {
        match self {
            TableRows::Flat(rows) if sub_table.is_empty() => Some(rows.as_slice()),
            TableRows::Partitioned(parts) => parts
                .iter()
                .find(|(name, _)| name == sub_table)
                .map(|(_, rows)| rows.as_slice()),
            _ => None,
        }
    }
}

/// A table that passed every schema check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedTable {
    pub name: String,
    pub family: TableFamily,
    pub fields: Vec<EmittedField>,
    pub rows: TableRows,
}

impl ValidatedTable {
    /// Position of a field within `fields` and each row's `values`.
    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }

    pub fn field(&self, name: &str) -> Option<&EmittedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order.
    pub fn declaration_order(&self) -> Vec<&str> {
        let mut fields: Vec<&EmittedField> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.order);
        fields.into_iter().map(|f| f.name.as_str()).collect()
    }

    pub fn row(&self, id: &RowId) -> Option<&RowRecord> {
        self.rows.records().into_iter().find(|r| &r.id == id)
    }

    pub fn row_count(&self) -> usize {
        match &self.rows {
            TableRows::Singleton(_) => 1,
            rows => rows.records().len(),
        }
    }

    /// Value of `field` in the row keyed `id`.
    pub fn value(&self, id: &RowId, field: &str) -> Option<&StructuralValue> {
        let at = self.position(field)?;
        self.row(id)?.values.get(at)
    }

    /// Value of `field` in a global table's single row.
    pub fn global(&self, field: &str) -> Option<&StructuralValue> {
        let at = self.position(field)?;
        match &self.rows {
            TableRows::Singleton(values) => values.get(at),
            _ => None,
        }
    }
}

/// A table dropped because of a table-fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenTable {
    pub name: String,
    pub cause: AssembleError,
}

// ---------------------------------------------------------------------------
// TableSet
// ---------------------------------------------------------------------------

/// Header prepended to every exported table set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSetHeader {
    pub magic: u32,
    pub version: u32,
    pub table_count: u32,
}

impl TableSetHeader {
    pub fn new(table_count: u32) -> Self {
        Self {
            magic: TABLESET_MAGIC,
            version: FORMAT_VERSION,
            table_count,
        }
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.magic != TABLESET_MAGIC {
            return Err(DecodeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DecodeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TableSetSnapshot {
    header: TableSetHeader,
    tables: Vec<ValidatedTable>,
}

/// Every validated table of an import run, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSet {
    tables: Vec<ValidatedTable>,
}

impl TableSet {
    pub fn new(mut tables: Vec<ValidatedTable>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tables }
    }

    pub fn tables(&self) -> &[ValidatedTable] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&ValidatedTable> {
        self.tables
            .binary_search_by(|t| t.name.as_str().cmp(name))
            .ok()
            .map(|at| &self.tables[at])
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Every custom composite shape used by an emitted field, keyed by
    /// identity. Element types are taken with nullability cleared, so
    /// `Reward?` and `Reward!` share one entry.
    pub fn custom_types(&self) -> BTreeMap<TypeIdentity, TypeInfo> {
        let mut types = BTreeMap::new();
        for field in self.tables.iter().flat_map(|t| &t.fields) {
            let element = field.type_info.element_type().with_nullable(false);
            if element.is_custom() && element.field_count() > 0 {
                types.entry(element.identity()).or_insert(element);
            }
        }
        types
    }

    /// Encode with a versioned header.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let snapshot = TableSetSnapshot {
            header: TableSetHeader::new(self.tables.len() as u32),
            tables: self.tables.clone(),
        };
        bitcode::serialize(&snapshot).map_err(|e| ExportError::Encode(e.to_string()))
    }

    /// Decode bytes written by [`TableSet::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let snapshot: TableSetSnapshot =
            bitcode::deserialize(data).map_err(|e| DecodeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        if snapshot.header.table_count as usize != snapshot.tables.len() {
            return Err(DecodeError::CountMismatch {
                expected: snapshot.header.table_count,
                found: snapshot.tables.len(),
            });
        }
        Ok(Self::new(snapshot.tables))
    }

    /// Pretty JSON dump for inspection.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&self.tables)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcraft_core::{parse_type, BaseKind};

    fn item_table() -> ValidatedTable {
        let id = parse_type("int32").unwrap();
        let reward = parse_type("Reward{int32 id, int16 count}[]").unwrap();
        ValidatedTable {
            name: "Item".into(),
            family: TableFamily::Ordinary,
            fields: vec![
                EmittedField {
                    name: "Id".into(),
                    identity: id.identity(),
                    type_info: id,
                    order: 0,
                },
                EmittedField {
                    name: "Rewards".into(),
                    identity: reward.identity(),
                    type_info: reward,
                    order: 1,
                },
            ],
            rows: TableRows::Flat(vec![RowRecord {
                id: RowId::Int(1),
                values: vec![
                    StructuralValue::from(1i32),
                    StructuralValue::List(vec![StructuralValue::Object(vec![
                        7i32.into(),
                        2i16.into(),
                    ])]),
                ],
            }]),
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    #[test]
    fn lookups() {
        let set = TableSet::new(vec![item_table()]);
        let table = set.get("Item").unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.position("Rewards"), Some(1));
        assert_eq!(table.value(&RowId::Int(1), "Id"), Some(&1i32.into()));
        assert!(set.get("Skill").is_none());
        assert_eq!(table.declaration_order(), vec!["Id", "Rewards"]);
    }

    #[test]
    fn partitions() {
        let rows = TableRows::Partitioned(vec![
            ("Bow".into(), vec![]),
            (
                "Melee".into(),
                vec![RowRecord {
                    id: RowId::Int(3),
                    values: vec![],
                }],
            ),
        ]);
        assert_eq!(rows.records().len(), 1);
        assert_eq!(rows.partition("Melee").unwrap().len(), 1);
        assert!(rows.partition("").is_none());
    }

    #[test]
    fn custom_types_collects_element_shapes() {
        let set = TableSet::new(vec![item_table()]);
        let types = set.custom_types();
        assert_eq!(types.len(), 1);
        let (identity, info) = types.iter().next().unwrap();
        assert_eq!(info.alias.as_deref(), Some("Reward"));
        assert_eq!(info.container, sheetcraft_core::ContainerKind::None);
        assert!(identity.as_str().starts_with("xReward{"));
        assert_eq!(info.fields()[0].kind, BaseKind::Int16);
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    #[test]
    fn header_validation() {
        assert!(TableSetHeader::new(0).validate().is_ok());

        let mut header = TableSetHeader::new(0);
        header.magic = 0xDEAD_BEEF;
        assert!(matches!(
            header.validate(),
            Err(DecodeError::InvalidMagic(0xDEAD_BEEF))
        ));

        let mut header = TableSetHeader::new(0);
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(header.validate(), Err(DecodeError::FutureVersion(_))));

        let mut header = TableSetHeader::new(0);
        header.version = 0;
        assert!(matches!(
            header.validate(),
            Err(DecodeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn bytes_round_trip() {
        let set = TableSet::new(vec![item_table()]);
        let bytes = set.to_bytes().unwrap();
        assert_eq!(TableSet::from_bytes(&bytes).unwrap(), set);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            TableSet::from_bytes(&[1, 2, 3]),
            Err(DecodeError::Decode(_))
        ));
    }

    #[test]
    fn json_dump_names_tables() {
        let json = TableSet::new(vec![item_table()]).to_json().unwrap();
        assert!(json.contains("\"Item\""));
        assert!(json.contains("\"Rewards\""));
    }
}
