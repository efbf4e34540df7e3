// Extraction of the questionnaire data into the masterfile.
//
// Extraction runs in two steps: a plan is computed without touching the
// masterfile, shown to the user, and then committed in a single write.

use std::collections::HashSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use survey_core::builder::build_record;

use crate::workbench::*;

/// What the user accepts to extract anyway.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// Participants already in the masterfile get a second row.
    pub allow_duplicates: bool,
    /// Participants with missing questionnaires or empty fields are
    /// extracted with what is available.
    pub allow_incomplete: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub enum PlanStatus {
    Ready(Record),
    Duplicate,
    Incomplete(Vec<String>),
    Failed(String),
}

#[derive(PartialEq, Debug, Clone)]
pub struct PlannedParticipant {
    pub participant_id: String,
    pub status: PlanStatus,
    /// Problems that were overridden by the options.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub masterfile: PathBuf,
    pub entries: Vec<PlannedParticipant>,
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Where the masterfile was written. Differs from the configured path
    /// for legacy xls files.
    pub path: PathBuf,
    pub written: usize,
}

impl ExtractionPlan {
    pub fn records(&self) -> Vec<&Record> {
        self.entries
            .iter()
            .filter_map(|e| match &e.status {
                PlanStatus::Ready(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.records().len()
    }

    /// The rows that would be added, field by field.
    pub fn preview(&self) -> String {
        let mut res = String::new();
        let _ = writeln!(res, "Preview of extraction into {}", self.masterfile.display());
        for e in self.entries.iter() {
            match &e.status {
                PlanStatus::Ready(record) => {
                    let _ = writeln!(
                        res,
                        "{}: ready ({} fields)",
                        e.participant_id,
                        record.fields.len()
                    );
                    for (field, value) in record.columns() {
                        let _ = writeln!(res, "  {} = {}", field, value);
                    }
                    for w in e.warnings.iter() {
                        let _ = writeln!(res, "  warning: {}", w);
                    }
                }
                PlanStatus::Duplicate => {
                    let _ = writeln!(res, "{}: already in masterfile, skipped", e.participant_id);
                }
                PlanStatus::Incomplete(issues) => {
                    let _ = writeln!(
                        res,
                        "{}: incomplete data, skipped - {}",
                        e.participant_id,
                        issues.join(", ")
                    );
                }
                PlanStatus::Failed(reason) => {
                    let _ = writeln!(res, "{}: failed - {}", e.participant_id, reason);
                }
            }
        }
        res
    }

    /// The final message after `written` participants were extracted.
    pub fn summary(&self, written: usize) -> String {
        let mut res = format!(
            "Extracted {} of {} participants successfully!",
            written,
            self.entries.len()
        );
        let mut section = |title: &str, lines: Vec<String>| {
            if !lines.is_empty() {
                res.push_str(&format!("\n\n{}:\n{}", title, lines.join("\n")));
            }
        };
        section(
            "Skipped (already in masterfile)",
            self.entries
                .iter()
                .filter(|e| e.status == PlanStatus::Duplicate)
                .map(|e| e.participant_id.clone())
                .collect(),
        );
        section(
            "Incomplete data",
            self.entries
                .iter()
                .filter_map(|e| match &e.status {
                    PlanStatus::Incomplete(issues) => {
                        Some(format!("{}: {}", e.participant_id, issues.join(", ")))
                    }
                    _ => None,
                })
                .collect(),
        );
        section(
            "Failed",
            self.entries
                .iter()
                .filter_map(|e| match &e.status {
                    PlanStatus::Failed(reason) => Some(format!("{}: {}", e.participant_id, reason)),
                    _ => None,
                })
                .collect(),
        );
        res
    }
}

/// Computes the rows to add for each participant. The masterfile is only
/// read.
pub fn plan_extraction(
    backend: &dyn MasterfileBackend,
    source: &Path,
    participants: &[String],
    templates: &[QuestionnaireTemplate],
    options: &ExtractionOptions,
) -> WorkbenchResult<ExtractionPlan> {
    if !source.is_dir() {
        whatever!("Source folder not found: {}", source.display())
    }
    let table = backend.read_table()?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries: Vec<PlannedParticipant> = Vec::new();

    for raw_pid in participants.iter() {
        let pid = match validate_participant_id(raw_pid) {
            Ok(pid) => pid,
            Err(e) => {
                entries.push(PlannedParticipant {
                    participant_id: raw_pid.trim().to_string(),
                    status: PlanStatus::Failed(e.to_string()),
                    warnings: Vec::new(),
                });
                continue;
            }
        };
        if !seen.insert(pid.clone()) {
            debug!("plan_extraction: {} listed twice", pid);
            continue;
        }
        let entry = plan_participant(&table, source, &pid, templates, options);
        debug!("plan_extraction: {}: {:?}", pid, entry.status);
        entries.push(entry);
    }

    Ok(ExtractionPlan {
        masterfile: backend.path().to_path_buf(),
        entries,
    })
}

fn plan_participant(
    table: &Table,
    source: &Path,
    pid: &str,
    templates: &[QuestionnaireTemplate],
    options: &ExtractionOptions,
) -> PlannedParticipant {
    let mut warnings: Vec<String> = Vec::new();
    let entry = |status: PlanStatus, warnings: Vec<String>| PlannedParticipant {
        participant_id: pid.to_string(),
        status,
        warnings,
    };

    if table.contains_participant(pid) {
        if !options.allow_duplicates {
            return entry(PlanStatus::Duplicate, warnings);
        }
        warnings.push("already in masterfile, a second row is added".to_string());
    }

    let (report, data_files) = match scan_participant(source, pid, templates) {
        Ok(res) => res,
        Err(e) => return entry(PlanStatus::Failed(e.to_string()), warnings),
    };
    // Nothing can be extracted without data, whatever the options.
    if !report.folder_found || data_files.is_empty() {
        let reason = report.issues().join(", ");
        return entry(PlanStatus::Failed(reason), warnings);
    }
    if !report.is_complete() {
        if !options.allow_incomplete {
            return entry(PlanStatus::Incomplete(report.issues()), warnings);
        }
        warnings.extend(report.issues());
    }
    entry(PlanStatus::Ready(build_record(pid, &data_files)), warnings)
}

/// Writes the ready records of a plan to the masterfile.
pub fn commit_extraction(
    backend: &dyn MasterfileBackend,
    plan: &ExtractionPlan,
) -> WorkbenchResult<ExtractionOutcome> {
    let records: Vec<Record> = plan.records().into_iter().cloned().collect();
    let path = backend.append_records(&records)?;
    info!(
        "Extracted {} participants into {}",
        records.len(),
        path.display()
    );
    Ok(ExtractionOutcome {
        path,
        written: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbench::io_csv::CsvMasterfile;
    use std::fs;

    fn write_extract(source: &Path, pid: &str, survey_type: &str, content: &str) {
        let folder = source.join(pid);
        fs::create_dir_all(&folder).unwrap();
        fs::write(
            folder.join(format!("{}_{}{}", pid, survey_type, EXTRACT_SUFFIX)),
            content,
        )
        .unwrap();
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data");
        fs::create_dir(&source).unwrap();
        write_extract(&source, "P001", "Demo", "File,age\nP001_Demo.pdf,31\n");
        write_extract(&source, "P002", "Demo", "File,age\nP002_Demo.pdf,45\n");
        let master = dir.path().join("master.csv");
        fs::write(&master, "participant_id,Demo_age\nP001,31\n").unwrap();
        (dir, source, master)
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_rejected_unless_allowed() {
        let (_dir, source, master) = setup();
        let m = CsvMasterfile::new(&master);
        let templates = vec![QuestionnaireTemplate::new("Demo", "demo.pdf", 1)];

        let plan = plan_extraction(
            &m,
            &source,
            &ids(&["P001", "P002"]),
            &templates,
            &ExtractionOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.entries[0].status, PlanStatus::Duplicate);
        assert_eq!(plan.ready_count(), 1);

        let options = ExtractionOptions {
            allow_duplicates: true,
            ..Default::default()
        };
        let plan = plan_extraction(&m, &source, &ids(&["P001"]), &templates, &options).unwrap();
        assert_eq!(plan.ready_count(), 1);
        assert_eq!(plan.entries[0].warnings.len(), 1);
    }

    #[test]
    fn preview_does_not_touch_the_masterfile() {
        let (_dir, source, master) = setup();
        let before = fs::read(&master).unwrap();
        let m = CsvMasterfile::new(&master);
        let plan = plan_extraction(
            &m,
            &source,
            &ids(&["P002"]),
            &[],
            &ExtractionOptions::default(),
        )
        .unwrap();
        let preview = plan.preview();
        assert!(preview.contains("P002: ready (1 fields)"));
        assert!(preview.contains("  Demo_age = 45"));
        assert_eq!(fs::read(&master).unwrap(), before);
    }

    #[test]
    fn commit_appends_ready_rows() {
        let (_dir, source, master) = setup();
        write_extract(&source, "P003", "NASA", "File,q1\nP003_NASA.pdf,4\n");
        let m = CsvMasterfile::new(&master);
        let plan = plan_extraction(
            &m,
            &source,
            &ids(&["P001", "P002", "P003", "P002", "P404"]),
            &[],
            &ExtractionOptions::default(),
        )
        .unwrap();
        assert_eq!(plan.entries.len(), 4);
        let outcome = commit_extraction(&m, &plan).unwrap();
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.path, master);
        assert_eq!(
            fs::read_to_string(&master).unwrap(),
            "participant_id,Demo_age,NASA_q1\nP001,31,\nP002,45,\nP003,,4\n"
        );
        let summary = plan.summary(outcome.written);
        assert!(summary.starts_with("Extracted 2 of 4 participants successfully!"));
        assert!(summary.contains("Skipped (already in masterfile):\nP001"));
        assert!(summary.contains("Failed:\nP404: Folder not found: P404"));
    }

    #[test]
    fn incomplete_blocks_unless_allowed() {
        let (_dir, source, master) = setup();
        let m = CsvMasterfile::new(&master);
        let templates = vec![
            QuestionnaireTemplate::new("Demo", "demo.pdf", 1),
            QuestionnaireTemplate::new("NASA", "nasa.pdf", 1),
        ];
        let plan = plan_extraction(
            &m,
            &source,
            &ids(&["P002"]),
            &templates,
            &ExtractionOptions::default(),
        )
        .unwrap();
        assert_eq!(
            plan.entries[0].status,
            PlanStatus::Incomplete(vec!["Missing NASA".to_string()])
        );

        let options = ExtractionOptions {
            allow_incomplete: true,
            ..Default::default()
        };
        let plan = plan_extraction(&m, &source, &ids(&["P002"]), &templates, &options).unwrap();
        assert_eq!(plan.ready_count(), 1);
        assert_eq!(plan.entries[0].warnings, vec!["Missing NASA".to_string()]);
    }
}
