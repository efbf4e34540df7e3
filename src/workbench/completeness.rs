// Scanning of the participant folders.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::workbench::io_csv::read_data_file;
use crate::workbench::*;

/// The extract files of a folder, sorted by file name.
pub fn list_extract_files(folder: &Path) -> WorkbenchResult<Vec<PathBuf>> {
    let entries = fs::read_dir(folder).context(ReadingFileSnafu {
        path: folder.display().to_string(),
    })?;
    let mut res: Vec<PathBuf> = Vec::new();
    for entry_r in entries {
        let entry = entry_r.context(ReadingFileSnafu {
            path: folder.display().to_string(),
        })?;
        let path = entry.path();
        if path.is_file() && io_common::simplify_file_name(&path).ends_with(EXTRACT_SUFFIX) {
            res.push(path);
        }
    }
    res.sort();
    Ok(res)
}

/// Checks the folder of a participant, and returns the extract files that
/// were read along with the verdict.
///
/// A missing folder is not an error: the participant is reported incomplete.
pub fn scan_participant(
    source: &Path,
    participant_id: &str,
    templates: &[QuestionnaireTemplate],
) -> WorkbenchResult<(CompletenessReport, Vec<DataFile>)> {
    let folder = source.join(participant_id);
    if !folder.is_dir() {
        debug!("scan_participant: {:?} not found", folder);
        return Ok((folder_not_found(participant_id, templates), Vec::new()));
    }
    let mut data_files: Vec<DataFile> = Vec::new();
    for path in list_extract_files(&folder)? {
        if let Some(data_file) = read_data_file(&path, participant_id)? {
            data_files.push(data_file);
        }
    }
    let report = check_completeness(participant_id, templates, &data_files);
    Ok((report, data_files))
}

/// The completeness of all the participant folders of a source folder.
#[derive(Debug, Default)]
pub struct MissingDataReport {
    /// One line per participant folder, sorted by name.
    pub lines: Vec<String>,
    pub complete: usize,
    pub incomplete: usize,
}

impl MissingDataReport {
    pub fn total(&self) -> usize {
        self.complete + self.incomplete
    }
}

impl Display for MissingDataReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} complete, {} incomplete (out of {} total)",
            self.complete,
            self.incomplete,
            self.total()
        )
    }
}

pub fn missing_data_report(
    source: &Path,
    templates: &[QuestionnaireTemplate],
) -> WorkbenchResult<MissingDataReport> {
    if !source.is_dir() {
        whatever!("Source folder not found: {}", source.display())
    }
    let entries = fs::read_dir(source).context(ReadingFileSnafu {
        path: source.display().to_string(),
    })?;
    let mut folders: Vec<String> = Vec::new();
    for entry_r in entries {
        let entry = entry_r.context(ReadingFileSnafu {
            path: source.display().to_string(),
        })?;
        if entry.path().is_dir() {
            folders.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    if folders.is_empty() {
        whatever!("No participant folders found in {}", source.display())
    }
    folders.sort();

    let mut report = MissingDataReport::default();
    for pid in folders.iter() {
        match scan_participant(source, pid, templates) {
            Ok((check, _)) if check.is_complete() => {
                report.complete += 1;
                report.lines.push(format!(
                    " {}: Complete ({} files)",
                    pid,
                    check.data_files.len()
                ));
            }
            Ok((check, _)) => {
                report.incomplete += 1;
                report
                    .lines
                    .push(format!(" {}: INCOMPLETE - {}", pid, check.issues().join(", ")));
            }
            Err(e) => {
                warn!("Could not check {}: {}", pid, e);
                report.incomplete += 1;
                report.lines.push(format!(" {}: INCOMPLETE - {}", pid, e));
            }
        }
    }
    info!("Missing data report: {}", report);
    Ok(report)
}
