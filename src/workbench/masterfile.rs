// Access to the masterfile, whatever its storage format.

use std::path::{Path, PathBuf};

use crate::workbench::io_common::{detect_format, MasterfileFormat};
use crate::workbench::io_csv::CsvMasterfile;
use crate::workbench::io_excel::ExcelMasterfile;
use crate::workbench::*;

/// Reading and writing the rows of a masterfile.
///
/// Implementations load the whole table in memory: masterfiles hold one row
/// per participant and stay small.
pub trait MasterfileBackend {
    fn path(&self) -> &Path;

    /// The current content. A masterfile that does not exist yet is empty.
    fn read_table(&self) -> WorkbenchResult<Table>;

    /// Replaces the content, and returns the path that was written.
    fn write_table(&self, table: &Table) -> WorkbenchResult<PathBuf>;

    /// Appends records in a single read-merge-write pass.
    fn append_records(&self, records: &[Record]) -> WorkbenchResult<PathBuf> {
        let mut table = self.read_table()?;
        for record in records.iter() {
            table.merge_record(record);
        }
        debug!(
            "append_records: {:?}: {} records, {} columns",
            self.path(),
            records.len(),
            table.headers.len()
        );
        self.write_table(&table)
    }
}

/// Opens a masterfile with the backend matching its format.
pub fn open_masterfile(
    path: &Path,
    sheet: Option<&str>,
) -> WorkbenchResult<Box<dyn MasterfileBackend>> {
    let format = detect_format(path)?;
    debug!("open_masterfile: {:?} format: {:?}", path, format);
    let backend: Box<dyn MasterfileBackend> = match format {
        MasterfileFormat::Csv => Box::new(CsvMasterfile::new(path)),
        MasterfileFormat::Xls | MasterfileFormat::Xlsx => {
            Box::new(ExcelMasterfile::new(path, format, sheet))
        }
    };
    Ok(backend)
}

/// True if the masterfile already has a row for this participant.
///
/// Not finding the participant is a normal outcome, only an unreadable
/// masterfile is an error.
pub fn is_duplicate(backend: &dyn MasterfileBackend, participant_id: &str) -> WorkbenchResult<bool> {
    let table = backend.read_table()?;
    let found = table.contains_participant(participant_id);
    debug!(
        "is_duplicate: {:?} in {:?}: {}",
        participant_id.trim(),
        backend.path(),
        found
    );
    Ok(found)
}
