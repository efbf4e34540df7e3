mod config;
pub mod builder;
use log::debug;

use std::collections::{HashMap, HashSet};
use std::path::Path;

pub use crate::config::*;

// **** Participant lists ****

/// Splits free text into participant identifiers. Commas and line breaks
/// both separate identifiers, blank entries are dropped.
///
/// The order is kept and duplicates are not removed, see
/// [`unique_participant_ids`].
pub fn parse_participant_ids(text: &str) -> Vec<String> {
    text.split(|c| c == ',' || c == '\n' || c == '\r')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Removes the duplicated identifiers, keeping the first occurence.
pub fn unique_participant_ids<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut res: Vec<String> = Vec::new();
    for pid in ids {
        if seen.insert(pid.clone()) {
            res.push(pid);
        }
    }
    res
}

/// Checks that an identifier can be used as a folder name.
pub fn validate_participant_id(participant_id: &str) -> Result<String, SurveyErrors> {
    let pid = participant_id.trim();
    if pid.is_empty() {
        return Err(SurveyErrors::EmptyParticipantId);
    }
    if pid.contains('/') || pid.contains('\\') || pid == "." || pid == ".." {
        return Err(SurveyErrors::InvalidParticipantId(pid.to_string()));
    }
    Ok(pid.to_string())
}

// **** Folder generation ****

/// Lists the copies to make in the folder of a participant.
///
/// Templates without a path are ignored. The copies are named
/// `<pid>_<type><ext>` where the extension is the one of the template.
pub fn plan_folder(
    participant_id: &str,
    templates: &[QuestionnaireTemplate],
) -> Result<FolderPlan, SurveyErrors> {
    let pid = validate_participant_id(participant_id)?;
    let mut copies: Vec<PlannedCopy> = Vec::new();
    for (idx, t) in templates.iter().enumerate() {
        let source = t.template_path.trim();
        if source.is_empty() {
            debug!("plan_folder: skipping template {} without path", idx);
            continue;
        }
        let ext = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        for survey_type in t.survey_types(idx) {
            copies.push(PlannedCopy {
                source: source.to_string(),
                file_name: format!("{}_{}{}", pid, survey_type, ext),
            });
        }
    }
    if copies.is_empty() {
        return Err(SurveyErrors::NoQuestionnaires);
    }
    Ok(FolderPlan {
        participant_id: pid,
        copies,
    })
}

// **** Completeness ****

/// The questionnaire types expected from every participant, in configuration
/// order, with the index of the template they come from.
pub fn expected_survey_types(templates: &[QuestionnaireTemplate]) -> Vec<(String, usize)> {
    templates
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_blank())
        .flat_map(|(idx, t)| t.survey_types(idx).into_iter().map(move |s| (s, idx)))
        .collect()
}

/// Recovers the questionnaire type from the name of an extract file.
///
/// Returns None if the file is not an extract file.
pub fn survey_type_of(participant_id: &str, file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(EXTRACT_SUFFIX)?;
    let prefix = format!("{}_", participant_id);
    let survey_type = stem.strip_prefix(prefix.as_str()).unwrap_or(stem);
    if survey_type.is_empty() {
        None
    } else {
        Some(survey_type.to_string())
    }
}

/// The report for a participant whose folder does not exist.
pub fn folder_not_found(
    participant_id: &str,
    templates: &[QuestionnaireTemplate],
) -> CompletenessReport {
    let questionnaires = expected_survey_types(templates)
        .into_iter()
        .map(|(survey_type, _)| TypeCheck {
            survey_type,
            status: TypeStatus::Missing,
        })
        .collect();
    CompletenessReport {
        participant: Participant {
            id: participant_id.to_string(),
            questionnaires,
        },
        folder_found: false,
        data_files: Vec::new(),
        unexpected_files: Vec::new(),
    }
}

/// Checks the extract files of a participant against the configured
/// questionnaires.
///
/// Without any configured questionnaire, every extract file found counts as
/// a present type and no field is required.
pub fn check_completeness(
    participant_id: &str,
    templates: &[QuestionnaireTemplate],
    data_files: &[DataFile],
) -> CompletenessReport {
    let mut data_file_names: Vec<String> = data_files.iter().map(|d| d.file_name.clone()).collect();
    data_file_names.sort();

    let by_type: HashMap<&str, &DataFile> = data_files
        .iter()
        .map(|d| (d.survey_type.as_str(), d))
        .collect();

    let expected = expected_survey_types(templates);
    let questionnaires: Vec<TypeCheck> = if expected.is_empty() {
        let mut sorted: Vec<&DataFile> = data_files.iter().collect();
        sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        sorted
            .iter()
            .map(|d| TypeCheck {
                survey_type: d.survey_type.clone(),
                status: TypeStatus::Present {
                    file_name: d.file_name.clone(),
                    missing_fields: Vec::new(),
                },
            })
            .collect()
    } else {
        expected
            .iter()
            .map(|(survey_type, idx)| {
                let status = match by_type.get(survey_type.as_str()) {
                    Some(d) => TypeStatus::Present {
                        file_name: d.file_name.clone(),
                        missing_fields: missing_fields(d, &templates[*idx].required_fields),
                    },
                    None => TypeStatus::Missing,
                };
                TypeCheck {
                    survey_type: survey_type.clone(),
                    status,
                }
            })
            .collect()
    };

    let unexpected_files: Vec<String> = if expected.is_empty() {
        Vec::new()
    } else {
        let expected_types: HashSet<&str> = expected.iter().map(|(s, _)| s.as_str()).collect();
        let mut res: Vec<String> = data_files
            .iter()
            .filter(|d| !expected_types.contains(d.survey_type.as_str()))
            .map(|d| d.file_name.clone())
            .collect();
        res.sort();
        res
    };

    debug!(
        "check_completeness: {}: {} types, {} files, {} unexpected",
        participant_id,
        questionnaires.len(),
        data_file_names.len(),
        unexpected_files.len()
    );

    CompletenessReport {
        participant: Participant {
            id: participant_id.to_string(),
            questionnaires,
        },
        folder_found: true,
        data_files: data_file_names,
        unexpected_files,
    }
}

// A required column is missing if it is not in the header, or if no data row
// has a value for it.
fn missing_fields(data_file: &DataFile, required: &[String]) -> Vec<String> {
    let required: Vec<&str> = if required.is_empty() {
        data_file
            .headers
            .iter()
            .map(|h| h.as_str())
            .filter(|h| *h != IGNORED_FIELD)
            .collect()
    } else {
        required.iter().map(|s| s.as_str()).collect()
    };
    required
        .into_iter()
        .filter(|col| match data_file.headers.iter().position(|h| h == col) {
            Some(idx) => !data_file
                .rows
                .iter()
                .any(|r| r.get(idx).map(|v| !v.trim().is_empty()).unwrap_or(false)),
            None => true,
        })
        .map(|s| s.to_string())
        .collect()
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        if !self.folder_found || self.data_files.is_empty() {
            return false;
        }
        self.participant.questionnaires.iter().all(|q| {
            matches!(&q.status, TypeStatus::Present { missing_fields, .. } if missing_fields.is_empty())
        })
    }

    /// Human readable list of the problems found. Empty for a complete
    /// participant.
    pub fn issues(&self) -> Vec<String> {
        if !self.folder_found {
            return vec![format!("Folder not found: {}", self.participant.id)];
        }
        if self.data_files.is_empty() {
            return vec!["No Extract Data CSV files found".to_string()];
        }
        let mut res: Vec<String> = Vec::new();
        for q in self.participant.questionnaires.iter() {
            match &q.status {
                TypeStatus::Missing => res.push(format!("Missing {}", q.survey_type)),
                TypeStatus::Present { missing_fields, .. } if !missing_fields.is_empty() => {
                    res.push(format!(
                        "{}: empty fields {}",
                        q.survey_type,
                        missing_fields.join(", ")
                    ))
                }
                TypeStatus::Present { .. } => {}
            }
        }
        res
    }

    pub fn present_count(&self) -> usize {
        self.participant
            .questionnaires
            .iter()
            .filter(|q| matches!(q.status, TypeStatus::Present { .. }))
            .count()
    }
}

// **** Masterfile ****

impl Table {
    /// The column used as primary key: `participant_id` if present, otherwise
    /// the first column.
    pub fn key_column_index(&self) -> Option<usize> {
        if self.headers.is_empty() {
            return None;
        }
        Some(
            self.headers
                .iter()
                .position(|h| h.trim() == KEY_COLUMN)
                .unwrap_or(0),
        )
    }

    /// True if a row already holds this participant identifier.
    pub fn contains_participant(&self, participant_id: &str) -> bool {
        let pid = participant_id.trim();
        if pid.is_empty() {
            return false;
        }
        match self.key_column_index() {
            Some(idx) => self
                .rows
                .iter()
                .any(|row| row.get(idx).map(|c| c.as_key() == pid).unwrap_or(false)),
            None => false,
        }
    }

    /// Appends a record, adding the columns the table does not know yet.
    ///
    /// The existing columns keep their order and the new ones are added at
    /// the end. Existing rows are padded with empty cells.
    pub fn merge_record(&mut self, record: &Record) {
        let key_idx = match self.key_column_index() {
            Some(idx) => idx,
            None => {
                self.headers.push(KEY_COLUMN.to_string());
                0
            }
        };
        for (column, _) in record.fields.iter() {
            if !self.headers.iter().any(|h| h == column) {
                debug!("merge_record: new column {:?}", column);
                self.headers.push(column.clone());
            }
        }
        let width = self.headers.len();
        for row in self.rows.iter_mut() {
            if row.len() < width {
                row.resize(width, Cell::Empty);
            }
        }
        let mut row: Vec<Cell> = vec![Cell::Empty; width];
        row[key_idx] = Cell::Text(record.participant_id.clone());
        for (column, value) in record.fields.iter() {
            if let Some(idx) = self.headers.iter().position(|h| h == column) {
                row[idx] = Cell::Text(value.clone());
            }
        }
        self.rows.push(row);
    }
}
