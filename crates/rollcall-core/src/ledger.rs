//! Attendance ledger: a flat CSV file rewritten whole on every save.
//!
//! Columns are `Boss,Subordinate,Attendance`; the attendance marker is `P`
//! for present and empty otherwise. Each (identity, member) pair appears at
//! most once.

use crate::types::Mark;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEADER: [&str; 3] = ["Boss", "Subordinate", "Attendance"];
const PRESENT_MARKER: &str = "P";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt ledger {path} at row {row}: {reason}")]
    Corrupt {
        path: PathBuf,
        /// 1-based data row (the header is row 0).
        row: usize,
        reason: String,
    },
}

/// One persisted attendance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub identity: String,
    pub member: String,
    pub present: bool,
}

/// CSV shape of a row. Field names are the column headers.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    #[serde(rename = "Boss")]
    boss: String,
    #[serde(rename = "Subordinate")]
    subordinate: String,
    #[serde(rename = "Attendance")]
    attendance: String,
}

/// In-memory ledger keyed by (identity, member), preserving row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerTable {
    rows: Vec<AttendanceRecord>,
    index: HashMap<(String, String), usize>,
}

impl LedgerTable {
    /// Insert or overwrite the row for the record's (identity, member) pair.
    /// Existing rows keep their position; new rows are appended.
    pub fn put(&mut self, record: AttendanceRecord) {
        let key = (record.identity.clone(), record.member.clone());
        match self.index.get(&key) {
            Some(&pos) => self.rows[pos] = record,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(record);
            }
        }
    }

    /// Apply one identity's marks. Pairs not mentioned are left untouched.
    pub fn apply(&mut self, identity: &str, marks: &[Mark]) {
        for mark in marks {
            self.put(AttendanceRecord {
                identity: identity.to_string(),
                member: mark.member.clone(),
                present: mark.present,
            });
        }
    }

    pub fn get(&self, identity: &str, member: &str) -> Option<&AttendanceRecord> {
        self.index
            .get(&(identity.to_string(), member.to_string()))
            .map(|&pos| &self.rows[pos])
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Handle to the ledger file. Saves are full read-modify-write transactions;
/// callers must not run two saves concurrently.
#[derive(Debug, Clone)]
pub struct AttendanceLedger {
    path: PathBuf,
}

impl AttendanceLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole ledger. A missing file is an empty ledger.
    pub fn load(&self) -> Result<LedgerTable, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerTable::default());
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut table = LedgerTable::default();

        // Only the exact three-column header is accepted; a save rewrites every column.
        let header = reader
            .headers()
            .map_err(|e| self.corrupt(0, e.to_string()))?;
        if header.is_empty() {
            return Ok(table);
        }
        if !header.iter().eq(HEADER) {
            let found = header.iter().collect::<Vec<_>>().join(",");
            return Err(self.corrupt(
                0,
                format!("expected header {}, found {found}", HEADER.join(",")),
            ));
        }

        for (idx, row) in reader.deserialize::<LedgerRow>().enumerate() {
            let row_no = idx + 1;
            let row = row.map_err(|e| self.corrupt(row_no, e.to_string()))?;
            let present = match row.attendance.trim() {
                PRESENT_MARKER => true,
                "" => false,
                other => {
                    return Err(self.corrupt(row_no, format!("unknown attendance marker {other:?}")));
                }
            };
            if row.boss.is_empty() || row.subordinate.is_empty() {
                return Err(self.corrupt(row_no, "empty identity or member".to_string()));
            }
            if let Some(earlier) = table.get(&row.boss, &row.subordinate) {
                tracing::warn!(
                    identity = %row.boss,
                    member = %row.subordinate,
                    row = row_no,
                    replaced_present = earlier.present,
                    path = %self.path.display(),
                    "duplicate ledger row; keeping the later one"
                );
            }
            table.put(AttendanceRecord {
                identity: row.boss,
                member: row.subordinate,
                present,
            });
        }

        Ok(table)
    }

    /// Merge one identity's marks into the persisted ledger.
    ///
    /// Loads the full ledger, overwrites or inserts each (identity, member)
    /// pair from `marks`, and rewrites the whole file atomically. A corrupt
    /// ledger aborts the save without touching the file.
    pub fn upsert(&self, identity: &str, marks: &[Mark]) -> Result<LedgerTable, LedgerError> {
        let mut table = self.load()?;
        table.apply(identity, marks);
        self.store(&table)?;
        tracing::info!(
            identity,
            marks = marks.len(),
            present = marks.iter().filter(|m| m.present).count(),
            rows = table.len(),
            path = %self.path.display(),
            "attendance saved"
        );
        Ok(table)
    }

    /// Replace the file contents with `table`, via a sibling temp file and rename.
    pub fn store(&self, table: &LedgerTable) -> Result<(), LedgerError> {
        let tmp_path = self.temp_path();
        let io_err = |source: std::io::Error| LedgerError::Io {
            path: tmp_path.clone(),
            source,
        };

        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        writer.write_record(HEADER).map_err(|e| io_err(e.into()))?;
        for record in table.records() {
            writer
                .serialize(LedgerRow {
                    boss: record.identity.clone(),
                    subordinate: record.member.clone(),
                    attendance: if record.present { PRESENT_MARKER } else { "" }.to_string(),
                })
                .map_err(|e| io_err(e.into()))?;
        }

        let mut file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
        file.flush().map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attendance.csv".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn corrupt(&self, row: usize, reason: String) -> LedgerError {
        LedgerError::Corrupt {
            path: self.path.clone(),
            row,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_in(dir: &tempfile::TempDir) -> AttendanceLedger {
        AttendanceLedger::new(dir.path().join("attendance.csv"))
    }

    fn rows(table: &LedgerTable) -> Vec<(&str, &str, bool)> {
        table
            .records()
            .iter()
            .map(|r| (r.identity.as_str(), r.member.as_str(), r.present))
            .collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ledger_in(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_then_partial_update_preserves_omitted_member() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);

        ledger
            .upsert("A", &[Mark::new("m1", true), Mark::new("m2", false)])
            .unwrap();
        assert_eq!(
            rows(&ledger.load().unwrap()),
            vec![("A", "m1", true), ("A", "m2", false)]
        );

        ledger.upsert("A", &[Mark::new("m1", false)]).unwrap();
        assert_eq!(
            rows(&ledger.load().unwrap()),
            vec![("A", "m1", false), ("A", "m2", false)]
        );
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .upsert("A", &[Mark::new("m1", true), Mark::new("m2", false)])
            .unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "Boss,Subordinate,Attendance\nA,m1,P\nA,m2,\n");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let marks = [Mark::new("x", true), Mark::new("y", false)];

        ledger.upsert("Boss", &marks).unwrap();
        let once = std::fs::read_to_string(ledger.path()).unwrap();
        ledger.upsert("Boss", &marks).unwrap();
        let twice = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_other_identities_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.upsert("A", &[Mark::new("m1", true)]).unwrap();
        ledger.upsert("B", &[Mark::new("m1", false), Mark::new("m9", true)]).unwrap();
        ledger.upsert("A", &[Mark::new("m1", false)]).unwrap();

        assert_eq!(
            rows(&ledger.load().unwrap()),
            vec![("A", "m1", false), ("B", "m1", false), ("B", "m9", true)]
        );
    }

    #[test]
    fn test_names_with_commas_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .upsert("Smith, Alice", &[Mark::new("Doe, \"JJ\"", true)])
            .unwrap();
        let table = ledger.load().unwrap();
        assert!(table.get("Smith, Alice", "Doe, \"JJ\"").unwrap().present);
    }

    #[test]
    fn test_missing_column_is_corrupt_and_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let original = "Boss,Subordinate\nA,m1\n";
        std::fs::write(ledger.path(), original).unwrap();

        let err = ledger.upsert("A", &[Mark::new("m1", true)]).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { row: 0, .. }));
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), original);
    }

    #[test]
    fn test_extra_column_is_corrupt_and_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let original = "Boss,Subordinate,Attendance,Note\nB,x,P,late\n";
        std::fs::write(ledger.path(), original).unwrap();

        let err = ledger.upsert("A", &[Mark::new("m1", true)]).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { row: 0, .. }));
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), original);
    }

    #[test]
    fn test_renamed_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(ledger.path(), "Boss,Member,Attendance\nA,m1,P\n").unwrap();
        assert!(matches!(
            ledger.load(),
            Err(LedgerError::Corrupt { row: 0, .. })
        ));
    }

    #[test]
    fn test_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(ledger.path(), "").unwrap();
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_rows_collapse_to_later_one() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(
            ledger.path(),
            "Boss,Subordinate,Attendance\nB,x,P\nB,y,P\nB,x,\n",
        )
        .unwrap();

        let table = ledger.load().unwrap();
        assert_eq!(rows(&table), vec![("B", "x", false), ("B", "y", true)]);
    }

    #[test]
    fn test_unknown_marker_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(
            ledger.path(),
            "Boss,Subordinate,Attendance\nA,m1,P\nA,m2,maybe\n",
        )
        .unwrap();
        assert!(matches!(
            ledger.load(),
            Err(LedgerError::Corrupt { row: 2, .. })
        ));
    }

    #[test]
    fn test_ragged_row_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(ledger.path(), "Boss,Subordinate,Attendance\nA,m1\n").unwrap();
        assert!(matches!(ledger.load(), Err(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::write(ledger.path(), "Boss,Subordinate,Attendance\n").unwrap();
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn test_table_repeated_member_last_wins() {
        let mut table = LedgerTable::default();
        table.apply("A", &[Mark::new("m", true), Mark::new("m", false)]);
        assert_eq!(rows(&table), vec![("A", "m", false)]);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.upsert("A", &[Mark::new("m", true)]).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["attendance.csv"]);
    }
}
