//! Cross-sheet table assembler.
//!
//! Sheets contribute field declarations and rows to logical tables by name.
//! Contributions may arrive from many threads in any order; the assembler
//! keeps one lock for the table map (held only for lookups) and one lock per
//! table (held for a single contribution).
//!
//! Each table is `Open` until a table-fatal [`AssembleError`] moves it to
//! `Broken`. A broken table keeps its first cause and rejects everything
//! afterwards. [`TableAssembler::finish`] freezes the tables into a
//! [`TableSet`], parsing every stored cell against the merged schema so that
//! forward-referenced custom types resolve regardless of arrival order.

use sheetcraft_core::{
    default_value, parse_type, parse_value, StructuralValue, TypeIdentity, TypeInfo,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::error::{AssembleError, Issue, IssueKind};
use crate::id::{FieldSite, RowId, SheetOrigin};
use crate::routing::{SheetRoute, TableFamily};
use crate::tableset::{BrokenTable, EmittedField, RowRecord, TableRows, TableSet, ValidatedTable};

/// Name of the primary-key field.
pub const ID_FIELD: &str = "Id";

/// Names with this prefix are internal and never typed or emitted.
pub const HIDDEN_PREFIX: &str = "__";

/// Whether a header name is skipped before typing.
pub fn is_skipped_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.starts_with(HIDDEN_PREFIX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===========================================================================
// Contribution types
// ===========================================================================

/// One header column as written in the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub column: usize,
    pub annotation: String,
    pub exported: bool,
}

impl FieldDecl {
    pub fn new(name: &str, column: usize, annotation: &str, exported: bool) -> Self {
        Self {
            name: name.trim().to_string(),
            column,
            annotation: annotation.to_string(),
            exported,
        }
    }
}

/// A typed header column accepted by [`TableAssembler::add_fields`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredField {
    pub name: String,
    pub column: usize,
    pub type_info: TypeInfo,
    pub exported: bool,
}

/// Raw text of one non-blank cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellText {
    pub column: usize,
    pub text: String,
}

/// One data row as read from a sheet, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// Zero-based sheet row.
    pub line: usize,
    pub cells: BTreeMap<String, CellText>,
}

impl RawRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: BTreeMap::new(),
        }
    }

    pub fn with_cell(mut self, field: &str, column: usize, text: &str) -> Self {
        self.cells.insert(
            field.to_string(),
            CellText {
                column,
                text: text.to_string(),
            },
        );
        self
    }
}

/// One `name | type | marker | value` row of a global sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub line: usize,
    pub name: String,
    pub annotation: String,
    pub exported: bool,
    pub value: String,
}

/// Everything [`TableAssembler::finish`] produces.
#[derive(Debug, Clone)]
pub struct AssembleOutput {
    pub tables: TableSet,
    pub broken: Vec<BrokenTable>,
    /// Findings raised while freezing (cell leftovers, alias conflicts).
    pub issues: Vec<Issue>,
}

// ===========================================================================
// Table state
// ===========================================================================

#[derive(Debug, Clone)]
struct FieldSlot {
    type_info: TypeInfo,
    identity: TypeIdentity,
    site: FieldSite,
    exported: bool,
}

#[derive(Debug, Clone)]
struct RowEntry {
    origin: SheetOrigin,
    line: usize,
    id: RowId,
    cells: BTreeMap<String, CellText>,
}

#[derive(Debug, Clone)]
struct GlobalValue {
    origin: SheetOrigin,
    line: usize,
    text: String,
}

#[derive(Debug, Clone, Default)]
struct Partition {
    rows: Vec<RowEntry>,
    index: HashMap<RowId, usize>,
}

#[derive(Debug, Clone)]
enum TableStatus {
    Open,
    Broken(AssembleError),
}

#[derive(Debug, Clone)]
struct TableState {
    name: String,
    family: TableFamily,
    status: TableStatus,
    fields: BTreeMap<String, FieldSlot>,
    partitions: BTreeMap<String, Partition>,
    globals: BTreeMap<String, GlobalValue>,
}

impl TableState {
    fn new(name: &str, family: TableFamily) -> Self {
        Self {
            name: name.to_string(),
            family,
            status: TableStatus::Open,
            fields: BTreeMap::new(),
            partitions: BTreeMap::new(),
            globals: BTreeMap::new(),
        }
    }

    /// Reject the contribution if the table is broken or of another family.
    fn check_open(&mut self, family: TableFamily) -> Result<(), AssembleError> {
        if let TableStatus::Broken(_) = self.status {
            return Err(AssembleError::TableBroken {
                table: self.name.clone(),
            });
        }
        if family != self.family {
            let (first, second) = if self.family < family {
                (self.family, family)
            } else {
                (family, self.family)
            };
            return Err(self.break_with(AssembleError::FamilyConflict {
                table: self.name.clone(),
                first,
                second,
            }));
        }
        Ok(())
    }

    /// Move to `Broken`. The first cause is kept; the accumulated content is
    /// dropped since it is never emitted.
    fn break_with(&mut self, cause: AssembleError) -> AssembleError {
        if let TableStatus::Open = self.status {
            warn!(table = %self.name, %cause, "table broken");
            self.status = TableStatus::Broken(cause.clone());
            self.fields.clear();
            self.partitions.clear();
            self.globals.clear();
        }
        cause
    }

    fn type_field(&mut self, name: &str, annotation: &str) -> Result<TypeInfo, AssembleError> {
        parse_type(annotation).map_err(|source| {
            self.break_with(AssembleError::Grammar {
                table: self.name.clone(),
                field: name.to_string(),
                source,
            })
        })
    }

    /// Merge one typed declaration into the schema.
    fn merge_field(
        &mut self,
        name: &str,
        type_info: TypeInfo,
        site: FieldSite,
        exported: bool,
    ) -> Result<(), AssembleError> {
        let identity = type_info.identity();
        let Some(slot) = self.fields.get_mut(name) else {
            self.fields.insert(
                name.to_string(),
                FieldSlot {
                    type_info,
                    identity,
                    site,
                    exported,
                },
            );
            return Ok(());
        };

        if slot.identity != identity {
            if !slot.type_info.is_compatible(&type_info) {
                // Order the pair so the cause does not depend on arrival order.
                let (existing, incoming) = if slot.identity <= identity {
                    (slot.identity.to_string(), identity.to_string())
                } else {
                    (identity.to_string(), slot.identity.to_string())
                };
                let cause = AssembleError::SchemaConflict {
                    table: self.name.clone(),
                    field: name.to_string(),
                    existing,
                    incoming,
                };
                return Err(self.break_with(cause));
            }
            // Forward reference: the declaration carrying fields wins.
            if slot.type_info.field_count() < type_info.field_count() {
                slot.type_info = type_info;
                slot.identity = identity;
            }
        }
        slot.site = slot.site.clone().min(site);
        slot.exported |= exported;
        Ok(())
    }

    fn id_field(&self) -> Option<&FieldSlot> {
        self.fields.get(ID_FIELD)
    }
}

fn is_valid_id_type(ty: &TypeInfo) -> bool {
    !ty.is_container() && ty.kind.is_id_capable() && !ty.nullable
}

// ===========================================================================
// TableAssembler
// ===========================================================================

/// Shared accumulator for every sheet of one import run.
#[derive(Debug, Default)]
pub struct TableAssembler {
    tables: Mutex<HashMap<String, Arc<Mutex<TableState>>>>,
}

impl TableAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, name: &str, family: TableFamily) -> Arc<Mutex<TableState>> {
        let mut tables = lock(&self.tables);
        Arc::clone(tables.entry(name.to_string()).or_insert_with(|| {
            debug!(table = name, ?family, "table created");
            Arc::new(Mutex::new(TableState::new(name, family)))
        }))
    }

    fn existing(&self, name: &str) -> Option<Arc<Mutex<TableState>>> {
        lock(&self.tables).get(name).map(Arc::clone)
    }

    /// Whether the named table exists and is broken.
    pub fn is_broken(&self, table: &str) -> bool {
        self.existing(table).is_some_and(|state| {
            matches!(lock(&state).status, TableStatus::Broken(_))
        })
    }

    /// Number of tables seen so far, broken ones included.
    pub fn table_count(&self) -> usize {
        lock(&self.tables).len()
    }

    /// Merge one sheet's header into its table.
    ///
    /// Names that are blank or start with `__` are skipped before typing.
    /// On success the typed columns of this sheet are returned for row
    /// decoding. Any returned error that is table-fatal has already broken
    /// the table.
    pub fn add_fields(
        &self,
        origin: &SheetOrigin,
        route: &SheetRoute,
        family: TableFamily,
        decls: &[FieldDecl],
    ) -> Result<Vec<DeclaredField>, AssembleError> {
        let table = self.get_or_create(&route.table, family);
        let mut state = lock(&table);
        state.check_open(family)?;

        let mut seen = HashSet::new();
        let mut declared = Vec::with_capacity(decls.len());
        for decl in decls.iter().filter(|d| !is_skipped_name(&d.name)) {
            if !seen.insert(decl.name.as_str()) {
                let cause = AssembleError::DuplicateField {
                    table: route.table.clone(),
                    field: decl.name.clone(),
                };
                return Err(state.break_with(cause));
            }
            let type_info = state.type_field(&decl.name, &decl.annotation)?;
            declared.push(DeclaredField {
                name: decl.name.clone(),
                column: decl.column,
                type_info,
                exported: decl.exported || decl.name == ID_FIELD,
            });
        }

        match declared.iter().find(|f| f.name == ID_FIELD) {
            None => {
                let cause = AssembleError::MissingId {
                    table: route.table.clone(),
                };
                return Err(state.break_with(cause));
            }
            Some(id) if !is_valid_id_type(&id.type_info) => {
                let cause = AssembleError::InvalidId {
                    table: route.table.clone(),
                    identity: id.type_info.identity().to_string(),
                };
                return Err(state.break_with(cause));
            }
            Some(_) => {}
        }

        for field in &declared {
            let site = FieldSite {
                origin: origin.clone(),
                position: field.column,
            };
            state.merge_field(&field.name, field.type_info.clone(), site, field.exported)?;
        }
        Ok(declared)
    }

    /// Append one data row to its table and partition.
    ///
    /// A duplicate id keeps the row from the earliest `(file, sheet, line)`
    /// and reports the other, which may be the stored row, with
    /// [`AssembleError::DuplicateId`].
    pub fn add_row(
        &self,
        origin: &SheetOrigin,
        route: &SheetRoute,
        row: RawRow,
    ) -> Result<(), AssembleError> {
        let table = self.existing(&route.table).ok_or_else(|| AssembleError::UnknownTable {
            table: route.table.clone(),
        })?;
        let mut state = lock(&table);
        if let TableStatus::Broken(_) = state.status {
            return Err(AssembleError::TableBroken {
                table: route.table.clone(),
            });
        }
        let id_type = match state.id_field() {
            Some(slot) => slot.type_info.clone(),
            None => {
                return Err(AssembleError::UnknownTable {
                    table: route.table.clone(),
                });
            }
        };

        let id_text = row
            .cells
            .get(ID_FIELD)
            .map(|cell| cell.text.trim())
            .unwrap_or_default();
        if id_text.is_empty() {
            return Err(AssembleError::MissingRowId {
                table: route.table.clone(),
                line: row.line,
            });
        }
        let parsed = parse_value(id_text, &id_type);
        let id = parsed
            .value
            .as_scalar()
            .filter(|_| parsed.is_clean())
            .and_then(RowId::from_value)
            .ok_or_else(|| AssembleError::InvalidRowId {
                table: route.table.clone(),
                line: row.line,
                text: id_text.to_string(),
            })?;

        let entry = RowEntry {
            origin: origin.clone(),
            line: row.line,
            id: id.clone(),
            cells: row.cells,
        };
        let partition = state.partitions.entry(route.sub_table.clone()).or_default();
        if let Some(&at) = partition.index.get(&id) {
            let existing = &mut partition.rows[at];
            let earlier = (&entry.origin, entry.line) < (&existing.origin, existing.line);
            let dropped = if earlier {
                std::mem::replace(existing, entry)
            } else {
                entry
            };
            return Err(AssembleError::DuplicateId {
                table: route.table.clone(),
                sub_table: route.sub_table.clone(),
                id,
                kept: existing.origin.clone(),
                kept_line: existing.line,
                dropped: dropped.origin,
                dropped_line: dropped.line,
            });
        }
        partition.index.insert(id, partition.rows.len());
        partition.rows.push(entry);
        Ok(())
    }

    /// Merge one entry of a global sheet into the table's single row.
    pub fn add_global_entry(
        &self,
        origin: &SheetOrigin,
        table: &str,
        entry: GlobalEntry,
    ) -> Result<(), AssembleError> {
        let shared = self.get_or_create(table, TableFamily::Global);
        let mut state = lock(&shared);
        state.check_open(TableFamily::Global)?;

        let name = entry.name.trim();
        if is_skipped_name(name) {
            return Ok(());
        }
        let type_info = state.type_field(name, &entry.annotation)?;
        let site = FieldSite {
            origin: origin.clone(),
            position: entry.line,
        };
        state.merge_field(name, type_info, site, entry.exported)?;

        let value = GlobalValue {
            origin: origin.clone(),
            line: entry.line,
            text: entry.value,
        };
        match state.globals.get_mut(name) {
            None => {
                state.globals.insert(name.to_string(), value);
                Ok(())
            }
            Some(existing) => {
                if (&value.origin, value.line) < (&existing.origin, existing.line) {
                    *existing = value;
                }
                Err(AssembleError::DuplicateGlobalKey {
                    table: table.to_string(),
                    key: name.to_string(),
                })
            }
        }
    }

    /// Freeze every table. Broken tables are reported with their cause;
    /// open tables are validated and emitted.
    pub fn finish(self) -> AssembleOutput {
        let tables = self
            .tables
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let mut states: Vec<TableState> = tables
            .into_values()
            .map(|shared| match Arc::try_unwrap(shared) {
                Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
                Err(shared) => lock(&shared).clone(),
            })
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));

        let mut validated = Vec::new();
        let mut broken = Vec::new();
        let mut issues = Vec::new();
        for state in states {
            if let TableStatus::Broken(cause) = &state.status {
                broken.push(BrokenTable {
                    name: state.name.clone(),
                    cause: cause.clone(),
                });
                continue;
            }
            validated.push(freeze_table(state, &mut issues));
        }

        let tables = TableSet::new(validated);
        issues.extend(alias_conflicts(&tables));
        AssembleOutput {
            tables,
            broken,
            issues,
        }
    }
}

// ===========================================================================
// Freezing
// ===========================================================================

/// Emitted fields sorted by kind then name, each carrying its rank in
/// declaration-site order.
fn emitted_fields(fields: &BTreeMap<String, FieldSlot>) -> Vec<EmittedField> {
    let mut visible: Vec<(&String, &FieldSlot)> = fields
        .iter()
        .filter(|(name, slot)| slot.exported || name.as_str() == ID_FIELD)
        .collect();
    visible.sort_by(|a, b| a.1.site.cmp(&b.1.site).then_with(|| a.0.cmp(b.0)));

    let mut emitted: Vec<EmittedField> = visible
        .into_iter()
        .enumerate()
        .map(|(order, (name, slot))| EmittedField {
            name: name.clone(),
            type_info: slot.type_info.clone(),
            identity: slot.identity.clone(),
            order,
        })
        .collect();
    emitted.sort_by(|a, b| {
        a.type_info
            .kind
            .cmp(&b.type_info.kind)
            .then_with(|| a.name.cmp(&b.name))
    });
    emitted
}

/// Parse one stored cell against the merged field type.
fn parse_cell(
    field: &EmittedField,
    cell: Option<&CellText>,
    origin: &SheetOrigin,
    line: usize,
    issues: &mut Vec<Issue>,
) -> StructuralValue {
    let Some(cell) = cell else {
        return default_value(&field.type_info);
    };
    let parsed = parse_value(&cell.text, &field.type_info);
    if !parsed.is_clean() {
        warn!(%origin, line, field = %field.name, leftover = parsed.leftover, "cell leftover");
        issues.push(
            Issue::new(IssueKind::CellLeftover {
                field: field.name.clone(),
                leftover: parsed.leftover.to_string(),
            })
            .at(origin)
            .row(line)
            .column(cell.column),
        );
    }
    parsed.value
}

fn freeze_rows(
    mut rows: Vec<RowEntry>,
    fields: &[EmittedField],
    issues: &mut Vec<Issue>,
) -> Vec<RowRecord> {
    rows.sort_by(|a, b| (&a.origin, a.line).cmp(&(&b.origin, b.line)));
    rows.into_iter()
        .map(|row| RowRecord {
            values: fields
                .iter()
                .map(|f| parse_cell(f, row.cells.get(&f.name), &row.origin, row.line, issues))
                .collect(),
            id: row.id,
        })
        .collect()
}

fn freeze_table(state: TableState, issues: &mut Vec<Issue>) -> ValidatedTable {
    let fields = emitted_fields(&state.fields);

    let rows = if state.family == TableFamily::Global {
        let values = fields
            .iter()
            .map(|f| match state.globals.get(&f.name) {
                Some(global) => {
                    let cell = CellText {
                        column: 3,
                        text: global.text.clone(),
                    };
                    parse_cell(f, Some(&cell), &global.origin, global.line, issues)
                }
                None => default_value(&f.type_info),
            })
            .collect();
        TableRows::Singleton(values)
    } else {
        let mut partitions: Vec<(String, Vec<RowRecord>)> = state
            .partitions
            .into_iter()
            .map(|(sub_table, partition)| (sub_table, freeze_rows(partition.rows, &fields, issues)))
            .collect();
        let flat = match partitions.first() {
            None => true,
            Some((sub_table, _)) => partitions.len() == 1 && sub_table.is_empty(),
        };
        if flat {
            TableRows::Flat(partitions.pop().map(|(_, rows)| rows).unwrap_or_default())
        } else {
            TableRows::Partitioned(partitions)
        }
    };

    ValidatedTable {
        name: state.name,
        family: state.family,
        fields,
        rows,
    }
}

/// One issue per alias that appears with more than one shape.
fn alias_conflicts(tables: &TableSet) -> Vec<Issue> {
    let mut by_alias: BTreeMap<String, Vec<TypeIdentity>> = BTreeMap::new();
    for (identity, info) in tables.custom_types() {
        if let Some(alias) = &info.alias {
            by_alias.entry(alias.clone()).or_default().push(identity);
        }
    }
    by_alias
        .into_iter()
        .filter(|(_, shapes)| shapes.len() > 1)
        .map(|(alias, shapes)| {
            Issue::new(IssueKind::AliasConflict {
                alias,
                first: shapes[0].to_string(),
                second: shapes[1].to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(file: &str) -> SheetOrigin {
        SheetOrigin::new(file, "<Item>")
    }

    fn decls(fields: &[(&str, &str)]) -> Vec<FieldDecl> {
        fields
            .iter()
            .enumerate()
            .map(|(column, (name, annotation))| FieldDecl::new(name, column, annotation, true))
            .collect()
    }

    fn add(
        assembler: &TableAssembler,
        file: &str,
        fields: &[(&str, &str)],
    ) -> Result<Vec<DeclaredField>, AssembleError> {
        assembler.add_fields(
            &origin(file),
            &SheetRoute::new("Item"),
            TableFamily::Ordinary,
            &decls(fields),
        )
    }

    fn row(line: usize, id: &str) -> RawRow {
        RawRow::new(line).with_cell(ID_FIELD, 0, id)
    }

    // -----------------------------------------------------------------------
    // Field merging
    // -----------------------------------------------------------------------

    #[test]
    fn disjoint_sheets_merge() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32"), ("A", "int32")]).unwrap();
        add(&assembler, "b.xlsx", &[("Id", "int32"), ("B", "string")]).unwrap();

        let out = assembler.finish();
        let table = out.tables.get("Item").unwrap();
        assert_eq!(table.declaration_order(), vec!["Id", "A", "B"]);
        assert!(out.broken.is_empty());
    }

    #[test]
    fn conflict_breaks_in_either_order() {
        let mut causes = Vec::new();
        for files in [["a.xlsx", "b.xlsx"], ["b.xlsx", "a.xlsx"]] {
            let assembler = TableAssembler::new();
            let annotations = |file: &str| if file == "a.xlsx" { "int32" } else { "float32" };
            for file in files {
                let _ = add(&assembler, file, &[("Id", "int32"), ("A", annotations(file))]);
            }
            assert!(assembler.is_broken("Item"));
            let out = assembler.finish();
            assert!(out.tables.get("Item").is_none());
            causes.push(out.broken[0].cause.clone());
        }
        assert_eq!(causes[0], causes[1]);
        assert!(matches!(causes[0], AssembleError::SchemaConflict { .. }));
    }

    #[test]
    fn forward_reference_takes_fielded_shape() {
        for order in [[0, 1], [1, 0]] {
            let assembler = TableAssembler::new();
            let sheets = [
                ("a.xlsx", "Reward[]"),
                ("b.xlsx", "Reward{int32 id, int16 count}[]"),
            ];
            for i in order {
                let (file, annotation) = sheets[i];
                add(&assembler, file, &[("Id", "int32"), ("Rewards", annotation)]).unwrap();
            }
            let out = assembler.finish();
            let field = out.tables.get("Item").unwrap().field("Rewards").unwrap().clone();
            assert_eq!(field.type_info.field_count(), 2);
        }
    }

    #[test]
    fn declaration_order_uses_earliest_site() {
        let assembler = TableAssembler::new();
        add(
            &assembler,
            "b.xlsx",
            &[("Id", "int32"), ("Late", "int32"), ("Shared", "int32")],
        )
        .unwrap();
        add(&assembler, "a.xlsx", &[("Shared", "int32"), ("Id", "int32")]).unwrap();

        let out = assembler.finish();
        let table = out.tables.get("Item").unwrap();
        assert_eq!(table.declaration_order(), vec!["Shared", "Id", "Late"]);
    }

    #[test]
    fn emitted_fields_sorted_by_kind_then_name() {
        let assembler = TableAssembler::new();
        add(
            &assembler,
            "a.xlsx",
            &[("Id", "int32"), ("Name", "string"), ("Alive", "bool"), ("Age", "int32")],
        )
        .unwrap();
        let out = assembler.finish();
        let names: Vec<&str> = out
            .tables
            .get("Item")
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["Alive", "Age", "Id", "Name"]);
    }

    // -----------------------------------------------------------------------
    // Table-fatal errors
    // -----------------------------------------------------------------------

    #[test]
    fn missing_id_breaks() {
        let assembler = TableAssembler::new();
        let err = add(&assembler, "a.xlsx", &[("A", "int32")]).unwrap_err();
        assert!(matches!(err, AssembleError::MissingId { .. }));
        assert!(assembler.is_broken("Item"));
    }

    #[test]
    fn invalid_id_kinds() {
        for annotation in ["string", "int32[]", "float32", "int32?"] {
            let assembler = TableAssembler::new();
            let err = add(&assembler, "a.xlsx", &[("Id", annotation)]).unwrap_err();
            assert!(
                matches!(err, AssembleError::InvalidId { .. }),
                "{annotation}: {err}"
            );
        }
        let assembler = TableAssembler::new();
        assert!(add(&assembler, "a.xlsx", &[("Id", "string!")]).is_ok());
    }

    #[test]
    fn grammar_error_breaks() {
        let assembler = TableAssembler::new();
        let err = add(&assembler, "a.xlsx", &[("Id", "int32"), ("A", "int32[")]).unwrap_err();
        assert!(matches!(err, AssembleError::Grammar { ref field, .. } if field == "A"));
        assert!(err.is_table_fatal());
    }

    #[test]
    fn hidden_fields_skipped_before_typing() {
        let assembler = TableAssembler::new();
        let declared = add(
            &assembler,
            "a.xlsx",
            &[("Id", "int32"), ("__internal", "not a type ["), ("", "")],
        )
        .unwrap();
        assert_eq!(declared.len(), 1);

        let out = assembler.finish();
        assert!(out.tables.get("Item").unwrap().field("__internal").is_none());
    }

    #[test]
    fn unexported_fields_hidden_but_id_kept() {
        let assembler = TableAssembler::new();
        let fields = vec![
            FieldDecl::new("Id", 0, "int32", false),
            FieldDecl::new("Secret", 1, "int32", false),
            FieldDecl::new("Shown", 2, "int32", true),
        ];
        assembler
            .add_fields(&origin("a.xlsx"), &SheetRoute::new("Item"), TableFamily::Ordinary, &fields)
            .unwrap();
        let out = assembler.finish();
        let table = out.tables.get("Item").unwrap();
        assert!(table.field("Id").is_some());
        assert!(table.field("Shown").is_some());
        assert!(table.field("Secret").is_none());
    }

    #[test]
    fn duplicate_field_in_one_sheet_breaks() {
        let assembler = TableAssembler::new();
        let err = add(
            &assembler,
            "a.xlsx",
            &[("Id", "int32"), ("A", "int32"), ("A", "int32")],
        )
        .unwrap_err();
        assert!(matches!(err, AssembleError::DuplicateField { .. }));
    }

    #[test]
    fn family_conflict_breaks() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32")]).unwrap();
        let err = assembler
            .add_global_entry(
                &origin("Global.xlsx"),
                "Item",
                GlobalEntry {
                    line: 1,
                    name: "Max".into(),
                    annotation: "int32".into(),
                    exported: true,
                    value: "3".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, AssembleError::FamilyConflict { .. }));
        assert!(assembler.is_broken("Item"));
    }

    #[test]
    fn broken_table_rejects_everything() {
        let assembler = TableAssembler::new();
        let _ = add(&assembler, "a.xlsx", &[("A", "int32")]);
        let err = add(&assembler, "b.xlsx", &[("Id", "int32")]).unwrap_err();
        assert!(matches!(err, AssembleError::TableBroken { .. }));

        let err = assembler
            .add_row(&origin("b.xlsx"), &SheetRoute::new("Item"), row(4, "1"))
            .unwrap_err();
        assert!(matches!(err, AssembleError::TableBroken { .. }));

        let out = assembler.finish();
        assert!(matches!(out.broken[0].cause, AssembleError::MissingId { .. }));
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_id_keeps_first_row() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32"), ("A", "int32")]).unwrap();
        let route = SheetRoute::new("Item");
        assembler
            .add_row(&origin("a.xlsx"), &route, row(4, "1").with_cell("A", 1, "10"))
            .unwrap();
        let err = assembler
            .add_row(&origin("a.xlsx"), &route, row(5, "1").with_cell("A", 1, "20"))
            .unwrap_err();
        assert!(matches!(err, AssembleError::DuplicateId { id: RowId::Int(1), .. }));
        assert!(!err.is_table_fatal());
        assert!(!assembler.is_broken("Item"));

        let out = assembler.finish();
        let table = out.tables.get("Item").unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.value(&RowId::Int(1), "A"), Some(&10i32.into()));
    }

    #[test]
    fn duplicate_id_prefers_earlier_file() {
        let assembler = TableAssembler::new();
        add(&assembler, "b.xlsx", &[("Id", "int32"), ("A", "int32")]).unwrap();
        let route = SheetRoute::new("Item");
        assembler
            .add_row(&origin("b.xlsx"), &route, row(4, "1").with_cell("A", 1, "20"))
            .unwrap();
        assert!(assembler
            .add_row(&origin("a.xlsx"), &route, row(4, "1").with_cell("A", 1, "10"))
            .is_err());

        let out = assembler.finish();
        let table = out.tables.get("Item").unwrap();
        assert_eq!(table.value(&RowId::Int(1), "A"), Some(&10i32.into()));
    }

    #[test]
    fn displaced_duplicate_names_the_dropped_row() {
        let assembler = TableAssembler::new();
        add(&assembler, "b.xlsx", &[("Id", "int32")]).unwrap();
        let route = SheetRoute::new("Item");
        assembler.add_row(&origin("b.xlsx"), &route, row(7, "1")).unwrap();
        let err = assembler
            .add_row(&origin("a.xlsx"), &route, row(4, "1"))
            .unwrap_err();

        assert_eq!(err.dropped_row(), Some((&origin("b.xlsx"), 7)));
        match err {
            AssembleError::DuplicateId { kept, kept_line, .. } => {
                assert_eq!((kept, kept_line), (origin("a.xlsx"), 4));
            }
            other => panic!("expected duplicate id, got {other:?}"),
        }
    }

    #[test]
    fn late_duplicate_names_itself_as_dropped() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32")]).unwrap();
        let route = SheetRoute::new("Item");
        assembler.add_row(&origin("a.xlsx"), &route, row(4, "1")).unwrap();
        let err = assembler
            .add_row(&origin("a.xlsx"), &route, row(9, "1"))
            .unwrap_err();
        assert_eq!(err.dropped_row(), Some((&origin("a.xlsx"), 9)));
    }

    #[test]
    fn same_id_in_different_partitions() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32")]).unwrap();
        let melee = SheetRoute::new("Item").with_sub_table("Melee");
        let bow = SheetRoute::new("Item").with_sub_table("Bow");
        assembler.add_row(&origin("a.xlsx"), &melee, row(4, "1")).unwrap();
        assembler.add_row(&origin("a.xlsx"), &bow, row(4, "1")).unwrap();

        let out = assembler.finish();
        match &out.tables.get("Item").unwrap().rows {
            TableRows::Partitioned(parts) => {
                let names: Vec<&str> = parts.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["Bow", "Melee"]);
            }
            other => panic!("expected partitions, got {other:?}"),
        }
    }

    #[test]
    fn row_id_errors() {
        let assembler = TableAssembler::new();
        let route = SheetRoute::new("Item");
        assert!(matches!(
            assembler.add_row(&origin("a.xlsx"), &route, row(4, "1")),
            Err(AssembleError::UnknownTable { .. })
        ));

        add(&assembler, "a.xlsx", &[("Id", "int32"), ("A", "int32")]).unwrap();
        assert!(matches!(
            assembler.add_row(&origin("a.xlsx"), &route, RawRow::new(4).with_cell("A", 1, "3")),
            Err(AssembleError::MissingRowId { line: 4, .. })
        ));
        assert!(matches!(
            assembler.add_row(&origin("a.xlsx"), &route, row(5, "abc")),
            Err(AssembleError::InvalidRowId { line: 5, .. })
        ));
    }

    #[test]
    fn rows_ordered_by_origin_then_line() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32")]).unwrap();
        let route = SheetRoute::new("Item");
        assembler.add_row(&origin("b.xlsx"), &route, row(4, "30")).unwrap();
        assembler.add_row(&origin("a.xlsx"), &route, row(5, "20")).unwrap();
        assembler.add_row(&origin("a.xlsx"), &route, row(4, "10")).unwrap();

        let out = assembler.finish();
        let ids: Vec<RowId> = out
            .tables
            .get("Item")
            .unwrap()
            .rows
            .records()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(ids, vec![RowId::Int(10), RowId::Int(20), RowId::Int(30)]);
    }

    #[test]
    fn leftover_becomes_issue() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32"), ("Tags", "int32[]")]).unwrap();
        assembler
            .add_row(
                &origin("a.xlsx"),
                &SheetRoute::new("Item"),
                row(4, "1").with_cell("Tags", 1, "1|x|3"),
            )
            .unwrap();

        let out = assembler.finish();
        assert_eq!(out.issues.len(), 1);
        let issue = &out.issues[0];
        assert_eq!((issue.row, issue.column), (Some(4), Some(1)));
        assert!(matches!(
            &issue.kind,
            IssueKind::CellLeftover { leftover, .. } if leftover == "x"
        ));
        assert_eq!(
            out.tables.get("Item").unwrap().value(&RowId::Int(1), "Tags"),
            Some(&StructuralValue::List(vec![1i32.into(), 0i32.into(), 3i32.into()]))
        );
    }

    #[test]
    fn alias_with_two_shapes_reported() {
        let assembler = TableAssembler::new();
        add(
            &assembler,
            "a.xlsx",
            &[("Id", "int32"), ("A", "Pos{int32 x}"), ("B", "Pos{int32 x, int32 y}")],
        )
        .unwrap();
        let out = assembler.finish();
        assert!(out
            .issues
            .iter()
            .any(|i| matches!(&i.kind, IssueKind::AliasConflict { alias, .. } if alias == "Pos")));
    }

    // -----------------------------------------------------------------------
    // Global entries
    // -----------------------------------------------------------------------

    fn global(line: usize, name: &str, annotation: &str, value: &str) -> GlobalEntry {
        GlobalEntry {
            line,
            name: name.into(),
            annotation: annotation.into(),
            exported: true,
            value: value.into(),
        }
    }

    #[test]
    fn global_duplicate_key_rejected() {
        let assembler = TableAssembler::new();
        let o = origin("Global.xlsx");
        assembler.add_global_entry(&o, "Const", global(1, "Max", "int32", "3")).unwrap();
        let err = assembler
            .add_global_entry(&o, "Const", global(2, "Max", "int32", "4"))
            .unwrap_err();
        assert!(matches!(err, AssembleError::DuplicateGlobalKey { .. }));
        assert!(!assembler.is_broken("Const"));

        let out = assembler.finish();
        assert_eq!(out.tables.get("Const").unwrap().global("Max"), Some(&3i32.into()));
    }

    #[test]
    fn global_type_conflict_breaks() {
        let assembler = TableAssembler::new();
        let o = origin("Global.xlsx");
        assembler.add_global_entry(&o, "Const", global(1, "Max", "int32", "3")).unwrap();
        let err = assembler
            .add_global_entry(&o, "Const", global(2, "Max", "string", "x"))
            .unwrap_err();
        assert!(matches!(err, AssembleError::SchemaConflict { .. }));
        assert!(assembler.is_broken("Const"));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_rows_all_land() {
        let assembler = TableAssembler::new();
        add(&assembler, "a.xlsx", &[("Id", "int32")]).unwrap();
        let route = SheetRoute::new("Item");

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let assembler = &assembler;
                let route = &route;
                scope.spawn(move || {
                    let o = origin(&format!("w{worker}.xlsx"));
                    for i in 0..50 {
                        let id = (worker * 100 + i).to_string();
                        assembler.add_row(&o, route, row(4 + i, &id)).unwrap();
                    }
                });
            }
        });

        let out = assembler.finish();
        assert_eq!(out.tables.get("Item").unwrap().row_count(), 200);
    }
}
