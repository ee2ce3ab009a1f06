//! Workbook ingestion: fan workbooks out over the rayon pool, feed every
//! sheet into one shared [`TableAssembler`] and freeze the result.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::assembler::TableAssembler;
use crate::config::ImportConfig;
use crate::error::{Issue, IssueKind};
use crate::id::SheetOrigin;
use crate::sheet::{decode_sheet, Workbook};
use crate::tableset::{BrokenTable, TableSet};

/// Outcome of one import run.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub tables: TableSet,
    /// Tables dropped by a table-fatal error, with the first cause.
    pub broken: Vec<BrokenTable>,
    /// Row-level rejections, skipped sheets and data-quality findings, in
    /// workbook order.
    pub issues: Vec<Issue>,
}

impl ImportReport {
    /// No broken table and no issue.
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty() && self.issues.is_empty()
    }
}

fn ingest_workbook(
    assembler: &TableAssembler,
    config: &ImportConfig,
    workbook: &Workbook,
) -> Vec<Issue> {
    let Some(family) = config.family_of(&workbook.file_name) else {
        debug!(file = %workbook.file_name, "workbook ignored");
        let origin = SheetOrigin::new(&workbook.file_name, "");
        return vec![Issue::new(IssueKind::IgnoredFile).at(&origin)];
    };
    workbook
        .sheets
        .iter()
        .flat_map(|sheet| decode_sheet(assembler, config, &workbook.file_name, family, sheet))
        .collect()
}

/// Import every workbook into one validated table set.
///
/// With `config.parallel` each workbook is one rayon task; otherwise they
/// run in order on the calling thread. The resulting tables do not depend
/// on which mode or in which order the workbooks complete.
pub fn ingest_workbooks(workbooks: &[Workbook], config: &ImportConfig) -> ImportReport {
    let assembler = TableAssembler::new();

    let mut issues: Vec<Issue> = if config.parallel {
        workbooks
            .par_iter()
            .flat_map_iter(|workbook| ingest_workbook(&assembler, config, workbook))
            .collect()
    } else {
        workbooks
            .iter()
            .flat_map(|workbook| ingest_workbook(&assembler, config, workbook))
            .collect()
    };

    let output = assembler.finish();
    issues.extend(output.issues);

    info!(
        workbooks = workbooks.len(),
        tables = output.tables.len(),
        broken = output.broken.len(),
        issues = issues.len(),
        "import finished"
    );

    ImportReport {
        tables: output.tables,
        broken: output.broken,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::RawSheet;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn item_workbook(file: &str, ids: &[&str]) -> Workbook {
        let mut rows: Vec<Vec<String>> = [
            ["items", ""],
            ["int32", "string"],
            ["c", "c"],
            ["Id", "Name"],
        ]
        .iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect();
        for id in ids {
            rows.push(vec![id.to_string(), format!("item {id}")]);
        }
        Workbook::new(file, vec![RawSheet::new("<Item>", rows)])
    }

    #[test]
    fn parallel_and_sequential_agree() {
        init_tracing();
        let workbooks = vec![
            item_workbook("a.xlsx", &["1", "2"]),
            item_workbook("b.xlsx", &["3"]),
            item_workbook("c.xlsx", &["4", "5", "6"]),
        ];
        let parallel = ingest_workbooks(&workbooks, &ImportConfig::default());
        let sequential = ingest_workbooks(
            &workbooks,
            &ImportConfig {
                parallel: false,
                ..ImportConfig::default()
            },
        );
        assert!(parallel.is_clean());
        assert_eq!(parallel.tables, sequential.tables);
        assert_eq!(parallel.tables.get("Item").unwrap().row_count(), 6);
    }

    #[test]
    fn lock_files_are_ignored() {
        init_tracing();
        let report = ingest_workbooks(
            &[item_workbook("~$a.xlsx", &["1"])],
            &ImportConfig::default(),
        );
        assert!(report.tables.is_empty());
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(report.issues[0].kind, IssueKind::IgnoredFile));
    }

    #[test]
    fn duplicate_ids_across_workbooks() {
        init_tracing();
        let report = ingest_workbooks(
            &[item_workbook("a.xlsx", &["1"]), item_workbook("b.xlsx", &["1"])],
            &ImportConfig::default(),
        );
        assert!(report.broken.is_empty());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.tables.get("Item").unwrap().row_count(), 1);
    }
}
