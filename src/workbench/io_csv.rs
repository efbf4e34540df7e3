// Primitives for reading and writing CSV files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::workbench::*;

/// A masterfile stored as a CSV file. All the cells are text.
pub struct CsvMasterfile {
    path: PathBuf,
}

impl CsvMasterfile {
    pub fn new(path: &Path) -> CsvMasterfile {
        CsvMasterfile {
            path: path.to_path_buf(),
        }
    }
}

impl MasterfileBackend for CsvMasterfile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> WorkbenchResult<Table> {
        let is_empty = match fs::metadata(&self.path) {
            Ok(m) => m.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(e).context(ReadingFileSnafu {
                    path: self.path.display().to_string(),
                })
            }
        };
        if is_empty {
            debug!("read_table: {:?} is empty or missing", self.path);
            return Ok(Table::default());
        }
        let (mut headers, rows) = read_rows(&self.path)?;
        widen_headers(&mut headers, &rows);
        let rows = rows
            .into_iter()
            .map(|r| {
                r.into_iter()
                    .map(|s| if s.is_empty() { Cell::Empty } else { Cell::Text(s) })
                    .collect()
            })
            .collect();
        Ok(Table { headers, rows })
    }

    fn write_table(&self, table: &Table) -> WorkbenchResult<PathBuf> {
        let p = self.path.display().to_string();
        // Written next to the masterfile first, so that a failure does not
        // leave a truncated file behind.
        let tmp_path = self.path.with_extension("csv.tmp");
        let res = write_rows(&tmp_path, table, &p).and_then(|_| {
            fs::rename(&tmp_path, &self.path).context(WritingFileSnafu { path: p.clone() })
        });
        if let Err(e) = res {
            if tmp_path.exists() {
                if let Err(rm) = fs::remove_file(&tmp_path) {
                    warn!("Could not remove {}: {}", tmp_path.display(), rm);
                }
            }
            return Err(e);
        }
        info!(
            "Wrote {} rows to {}",
            table.rows.len(),
            io_common::simplify_file_name(&self.path)
        );
        Ok(self.path.clone())
    }
}

// Rows longer than the header keep all their cells.
fn write_rows(path: &Path, table: &Table, p: &str) -> WorkbenchResult<()> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .context(ParsingCsvSnafu { path: p })?;
    wtr.write_record(&table.headers)
        .context(ParsingCsvSnafu { path: p })?;
    for row in table.rows.iter() {
        let width = table.headers.len().max(row.len());
        let cells: Vec<String> = (0..width)
            .map(|idx| row.get(idx).map(|c| c.to_string()).unwrap_or_default())
            .collect();
        wtr.write_record(&cells)
            .context(ParsingCsvSnafu { path: p })?;
    }
    wtr.flush().context(WritingFileSnafu { path: p })
}

/// Names the cells of rows longer than the header, `column_<n>` for the
/// n-th column, so that a rewrite keeps them.
fn widen_headers(headers: &mut Vec<String>, rows: &[Vec<String>]) {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if width <= headers.len() {
        return;
    }
    warn!(
        "Masterfile rows have {} cells but the header only {}, naming the extra columns",
        width,
        headers.len()
    );
    for idx in headers.len()..width {
        let mut name = format!("column_{}", idx + 1);
        while headers.contains(&name) {
            name.push('_');
        }
        headers.push(name);
    }
}

/// Reads a CSV file with a header row. Short rows are accepted.
pub fn read_rows(path: &Path) -> WorkbenchResult<(Vec<String>, Vec<Vec<String>>)> {
    let p = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(ParsingCsvSnafu { path: p.clone() })?;
    let headers: Vec<String> = rdr
        .headers()
        .context(ParsingCsvSnafu { path: p.clone() })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let line = line_r.context(ParsingCsvSnafu { path: p.clone() })?;
        debug!("read_rows: lineno: {:?} row: {:?}", idx + 2, line);
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    Ok((headers, rows))
}

/// Reads the extract file of one questionnaire.
pub fn read_data_file(path: &Path, participant_id: &str) -> WorkbenchResult<Option<DataFile>> {
    let file_name = io_common::simplify_file_name(path);
    let survey_type = match survey_type_of(participant_id, &file_name) {
        Some(s) => s,
        None => return Ok(None),
    };
    let (headers, rows) = read_rows(path)?;
    Ok(Some(DataFile {
        file_name,
        survey_type,
        headers,
        rows,
    }))
}
