use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, DataType, Range, Reader};
use rust_xlsxwriter::Workbook;

use crate::workbench::io_common::MasterfileFormat;
use crate::workbench::*;

/// The sheet used when none is configured and the workbook has one.
pub const DEFAULT_SHEET: &str = "Data";

/// A masterfile stored in a spreadsheet.
///
/// Reading accepts both xls and xlsx. Writing always produces xlsx: the
/// workbook is written again with the values of all its sheets.
pub struct ExcelMasterfile {
    path: PathBuf,
    format: MasterfileFormat,
    sheet: Option<String>,
}

impl ExcelMasterfile {
    pub fn new(path: &Path, format: MasterfileFormat, sheet: Option<&str>) -> ExcelMasterfile {
        ExcelMasterfile {
            path: path.to_path_buf(),
            format,
            sheet: sheet.map(|s| s.to_string()),
        }
    }

    /// Where the masterfile is saved. Legacy xls files cannot be written and
    /// are saved as xlsx next to the original.
    pub fn output_path(&self) -> PathBuf {
        match self.format {
            MasterfileFormat::Xls => self.path.with_extension("xlsx"),
            _ => self.path.clone(),
        }
    }

    // The workbook holding the current content. Once an xls masterfile has
    // been saved, its xlsx copy is the one that is up to date.
    fn source_path(&self) -> PathBuf {
        let out = self.output_path();
        if out != self.path && out.exists() {
            debug!("source_path: reading {:?} in place of {:?}", out, self.path);
            return out;
        }
        self.path.clone()
    }

    // The configured sheet, else `Data`, else the first one.
    fn sheet_name(&self, names: &[String]) -> WorkbenchResult<String> {
        if let Some(wanted) = &self.sheet {
            return match names.iter().find(|n| *n == wanted) {
                Some(n) => Ok(n.clone()),
                None => MissingWorksheetSnafu {
                    path: self.path.display().to_string(),
                    sheet: wanted.clone(),
                }
                .fail(),
            };
        }
        if let Some(n) = names.iter().find(|n| n.as_str() == DEFAULT_SHEET) {
            return Ok(n.clone());
        }
        names.first().cloned().context(EmptyWorkbookSnafu {
            path: self.path.display().to_string(),
        })
    }
}

impl MasterfileBackend for ExcelMasterfile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> WorkbenchResult<Table> {
        let source = self.source_path();
        if !source.exists() {
            debug!("read_table: {:?} does not exist yet", source);
            return Ok(Table::default());
        }
        let p = source.display().to_string();
        let mut workbook =
            open_workbook_auto(&source).context(OpeningMasterfileSnafu { path: p.clone() })?;
        let names: Vec<String> = workbook.sheet_names().to_vec();
        let sheet = self.sheet_name(&names)?;
        debug!("read_table: path: {:?} worksheet: {:?}", source, sheet);
        let wrange = workbook
            .worksheet_range(&sheet)
            .context(MissingWorksheetSnafu {
                path: p.clone(),
                sheet: sheet.clone(),
            })?
            .context(OpeningMasterfileSnafu { path: p })?;
        Ok(grid_to_table(range_to_grid(&wrange)))
    }

    fn write_table(&self, table: &Table) -> WorkbenchResult<PathBuf> {
        // Every sheet is kept, the masterfile sheet is replaced by the table.
        let mut sheets: Vec<(String, Vec<Vec<Cell>>)> = Vec::new();
        let source = self.source_path();
        let target_sheet = if source.exists() {
            let mut workbook = open_workbook_auto(&source).context(OpeningMasterfileSnafu {
                path: source.display().to_string(),
            })?;
            let names: Vec<String> = workbook.sheet_names().to_vec();
            let target = self.sheet_name(&names)?;
            for (name, wrange) in workbook.worksheets() {
                sheets.push((name, range_to_grid(&wrange)));
            }
            target
        } else {
            self.sheet.clone().unwrap_or_else(|| DEFAULT_SHEET.to_string())
        };

        let grid = table_to_grid(table);
        match sheets.iter_mut().find(|(n, _)| *n == target_sheet) {
            Some(entry) => entry.1 = grid,
            None => sheets.push((target_sheet.clone(), grid)),
        }

        let out = self.output_path();
        let out_s = out.display().to_string();
        let mut workbook = Workbook::new();
        for (name, grid) in sheets.iter() {
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(name)
                .context(WritingWorkbookSnafu { path: out_s.clone() })?;
            for (r, row) in grid.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    let (r, c) = (r as u32, c as u16);
                    let written = match cell {
                        Cell::Empty => continue,
                        Cell::Text(s) => worksheet.write_string(r, c, s),
                        Cell::Number(f) => worksheet.write_number(r, c, *f),
                        Cell::Bool(b) => worksheet.write_boolean(r, c, *b),
                    };
                    written.context(WritingWorkbookSnafu { path: out_s.clone() })?;
                }
            }
        }
        workbook
            .save(&out)
            .context(WritingWorkbookSnafu { path: out_s })?;
        info!(
            "Wrote {} rows to sheet {} of {}",
            table.rows.len(),
            target_sheet,
            io_common::simplify_file_name(&out)
        );
        Ok(out)
    }
}

fn read_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::Empty => Cell::Empty,
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Float(f) => Cell::Number(*f),
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::Bool(b) => Cell::Bool(*b),
        // Dates are kept as their serial number.
        DataType::DateTime(f) => Cell::Number(*f),
        DataType::Error(e) => {
            warn!("read_cell: error cell {:?}", e);
            Cell::Empty
        }
        #[allow(unreachable_patterns)]
        other => Cell::Text(format!("{:?}", other)),
    }
}

/// The cells of a worksheet, starting from A1.
fn range_to_grid(wrange: &Range<DataType>) -> Vec<Vec<Cell>> {
    let (row_start, col_start) = match wrange.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Vec::new(),
    };
    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); row_start];
    for row in wrange.rows() {
        let mut cells: Vec<Cell> = vec![Cell::Empty; col_start];
        cells.extend(row.iter().map(read_cell));
        grid.push(cells);
    }
    grid
}

// The header is the first non-blank row. Blank rows above it and blank
// columns left of the data are not part of the table.
fn grid_to_table(mut grid: Vec<Vec<Cell>>) -> Table {
    let is_blank = |r: &Vec<Cell>| r.iter().all(|c| c.is_empty());
    let first_row = match grid.iter().position(|r| !is_blank(r)) {
        Some(idx) => idx,
        None => return Table::default(),
    };
    grid.drain(..first_row);
    let first_col = grid
        .iter()
        .filter_map(|r| r.iter().position(|c| !c.is_empty()))
        .min()
        .unwrap_or(0);
    if first_col > 0 {
        for row in grid.iter_mut() {
            row.drain(..first_col.min(row.len()));
        }
    }
    let header_row = grid.remove(0);
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    // Trailing blank lines are not rows.
    while grid
        .last()
        .map(|r| r.iter().all(|c| c.is_empty()))
        .unwrap_or(false)
    {
        grid.pop();
    }
    Table {
        headers,
        rows: grid,
    }
}

fn table_to_grid(table: &Table) -> Vec<Vec<Cell>> {
    let mut grid: Vec<Vec<Cell>> = vec![table
        .headers
        .iter()
        .map(|h| Cell::Text(h.clone()))
        .collect()];
    grid.extend(table.rows.iter().cloned());
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Xlsx};

    fn record(pid: &str, fields: &[(&str, &str)]) -> Record {
        Record {
            participant_id: pid.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn create_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("master.xlsx");
        let m = ExcelMasterfile::new(&p, MasterfileFormat::Xlsx, None);
        assert_eq!(m.read_table().unwrap(), Table::default());

        let out = m.append_records(&[record("P001", &[("Demo_age", "31")])]).unwrap();
        assert_eq!(out, p);
        let out = m
            .append_records(&[record("P002", &[("NASA_q1", "4")])])
            .unwrap();
        assert_eq!(out, p);

        let table = m.read_table().unwrap();
        assert_eq!(table.headers, vec!["participant_id", "Demo_age", "NASA_q1"]);
        assert_eq!(table.rows.len(), 2);
        assert!(table.contains_participant("P001"));
        assert!(table.contains_participant("P002"));
        assert!(!table.contains_participant("P003"));
    }

    #[test]
    fn keeps_other_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("master.xlsx");
        let mut wb = Workbook::new();
        let notes = wb.add_worksheet();
        notes.set_name("Notes").unwrap();
        notes.write_string(0, 0, "keep me").unwrap();
        let data = wb.add_worksheet();
        data.set_name("Data").unwrap();
        data.write_string(0, 0, "id").unwrap();
        data.write_number(1, 0, 7.0).unwrap();
        wb.save(&p).unwrap();

        let m = ExcelMasterfile::new(&p, MasterfileFormat::Xlsx, None);
        assert!(is_duplicate(&m, "7").unwrap());
        m.append_records(&[record("8", &[])]).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&p).unwrap();
        assert_eq!(workbook.sheet_names().to_vec(), vec!["Notes", "Data"]);
        let notes = workbook.worksheet_range("Notes").unwrap().unwrap();
        assert_eq!(
            notes.get_value((0, 0)),
            Some(&DataType::String("keep me".to_string()))
        );
        let table = m.read_table().unwrap();
        assert_eq!(table.headers, vec!["id"]);
        assert!(table.contains_participant("8"));
    }

    #[test]
    fn configured_sheet_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("master.xlsx");
        let mut wb = Workbook::new();
        wb.add_worksheet().write_string(0, 0, "participant_id").unwrap();
        wb.save(&p).unwrap();

        let m = ExcelMasterfile::new(&p, MasterfileFormat::Xlsx, Some("Results"));
        assert!(matches!(
            m.read_table(),
            Err(WorkbenchError::MissingWorksheet { .. })
        ));
    }

    #[test]
    fn corrupted_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("master.xlsx");
        std::fs::write(&p, "not a zip").unwrap();
        let m = ExcelMasterfile::new(&p, MasterfileFormat::Xlsx, None);
        assert!(matches!(
            is_duplicate(&m, "P001"),
            Err(WorkbenchError::OpeningMasterfile { .. })
        ));
    }

    #[test]
    fn xls_is_saved_as_xlsx() {
        let m = ExcelMasterfile::new(Path::new("/data/master.xls"), MasterfileFormat::Xls, None);
        assert_eq!(m.output_path(), PathBuf::from("/data/master.xlsx"));
    }

    #[test]
    fn xls_commits_accumulate_in_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("master.xls");
        let m = ExcelMasterfile::new(&p, MasterfileFormat::Xls, None);

        let out = m.append_records(&[record("P001", &[("Demo_age", "31")])]).unwrap();
        assert_eq!(out, dir.path().join("master.xlsx"));
        assert!(is_duplicate(&m, "P001").unwrap());

        m.append_records(&[record("P002", &[("Demo_age", "40")])]).unwrap();
        let table = m.read_table().unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(table.contains_participant("P001"));
        assert!(table.contains_participant("P002"));
    }

    #[test]
    fn existing_xlsx_next_to_xls_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let xlsx = dir.path().join("master.xlsx");
        let mut wb = Workbook::new();
        let data = wb.add_worksheet();
        data.set_name("Data").unwrap();
        data.write_string(0, 0, "participant_id").unwrap();
        data.write_string(1, 0, "P007").unwrap();
        wb.save(&xlsx).unwrap();

        let m = ExcelMasterfile::new(&dir.path().join("master.xls"), MasterfileFormat::Xls, None);
        assert!(is_duplicate(&m, "P007").unwrap());
        m.append_records(&[record("P008", &[])]).unwrap();
        let table = m.read_table().unwrap();
        assert!(table.contains_participant("P007"));
        assert!(table.contains_participant("P008"));
    }

    #[test]
    fn header_below_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("master.xlsx");
        let mut wb = Workbook::new();
        let data = wb.add_worksheet();
        data.write_string(1, 1, "participant_id").unwrap();
        data.write_string(1, 2, "Demo_age").unwrap();
        data.write_string(2, 1, "P001").unwrap();
        data.write_number(2, 2, 31.0).unwrap();
        wb.save(&p).unwrap();

        let m = ExcelMasterfile::new(&p, MasterfileFormat::Xlsx, None);
        let table = m.read_table().unwrap();
        assert_eq!(table.headers, vec!["participant_id", "Demo_age"]);
        assert_eq!(table.rows.len(), 1);
        assert!(is_duplicate(&m, "P001").unwrap());

        m.append_records(&[record("P002", &[("Demo_age", "40")])]).unwrap();
        let table = m.read_table().unwrap();
        assert_eq!(table.headers, vec!["participant_id", "Demo_age"]);
        assert!(table.contains_participant("P001"));
        assert!(table.contains_participant("P002"));
    }
}
