// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The column holding the participant identifier in a masterfile.
pub const KEY_COLUMN: &str = "participant_id";

/// Column of the extract files that is never copied to the masterfile.
pub const IGNORED_FIELD: &str = "File";

/// Suffix of the files produced when a questionnaire has been filled in.
pub const EXTRACT_SUFFIX: &str = "_Extract Data.csv";

/// One questionnaire handed out to every participant.
///
/// A template with several copies expands into several questionnaire types,
/// see [`QuestionnaireTemplate::survey_types`].
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QuestionnaireTemplate {
    pub name: String,
    /// Path of the blank file to copy. Templates without a path are skipped
    /// when generating folders.
    pub template_path: String,
    pub copies: u32,
    /// Columns that must hold a value in the extract file. When empty, all
    /// the columns (except `File`) are required.
    pub required_fields: Vec<String>,
}

impl QuestionnaireTemplate {
    pub fn new(name: &str, template_path: &str, copies: u32) -> QuestionnaireTemplate {
        QuestionnaireTemplate {
            name: name.to_string(),
            template_path: template_path.to_string(),
            copies,
            required_fields: Vec::new(),
        }
    }

    /// The name used in file names. Unnamed templates are numbered after
    /// their position (starting at 1).
    pub fn effective_name(&self, index: usize) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            format!("survey_{}", index + 1)
        } else {
            name.to_string()
        }
    }

    /// The questionnaire types expected from this template: the bare name for
    /// a single copy, otherwise the name followed by the copy number.
    pub fn survey_types(&self, index: usize) -> Vec<String> {
        let name = self.effective_name(index);
        match self.copies {
            0 | 1 => vec![name],
            n => (1..=n).map(|i| format!("{}{}", name, i)).collect(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.template_path.trim().is_empty()
    }
}

/// A named set of settings, as saved by the user.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ConfigurationBundle {
    pub name: String,
    pub target_path: String,
    pub source_path: String,
    pub masterfile_path: String,
    pub masterfile_sheet: Option<String>,
    pub questionnaires: Vec<QuestionnaireTemplate>,
}

/// The content of one `<pid>_<type>_Extract Data.csv` file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DataFile {
    pub file_name: String,
    pub survey_type: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// ******** Masterfile model *********

/// A cell of a masterfile. CSV masterfiles only hold text, spreadsheets keep
/// the type of their cells.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// The value used when comparing participant identifiers.
    pub fn as_key(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            Cell::Number(f) => f.to_string(),
            Cell::Bool(b) => b.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(_) => write!(f, "{}", self.as_key()),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A masterfile loaded in memory: the first row is the header.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// One masterfile row waiting to be written.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Record {
    pub participant_id: String,
    /// Column name and value, in masterfile order.
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        if column == KEY_COLUMN {
            return Some(self.participant_id.as_str());
        }
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// All the columns of the record, starting with the identifier.
    pub fn columns(&self) -> Vec<(String, String)> {
        let mut res = vec![(KEY_COLUMN.to_string(), self.participant_id.clone())];
        res.extend(self.fields.iter().cloned());
        res
    }
}

// ******** Output data structures *********

/// The state of one questionnaire type for a participant.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TypeStatus {
    Present {
        file_name: String,
        /// Required columns that are absent or never filled in.
        missing_fields: Vec<String>,
    },
    Missing,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TypeCheck {
    pub survey_type: String,
    pub status: TypeStatus,
}

/// A participant, with the questionnaire types expected from them, in
/// configuration order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub questionnaires: Vec<TypeCheck>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CompletenessReport {
    pub participant: Participant,
    pub folder_found: bool,
    /// All the extract files found in the folder, sorted.
    pub data_files: Vec<String>,
    /// Extract files that do not match any configured questionnaire type.
    pub unexpected_files: Vec<String>,
}

/// A file to copy into a participant folder.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PlannedCopy {
    pub source: String,
    pub file_name: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FolderPlan {
    pub participant_id: String,
    pub copies: Vec<PlannedCopy>,
}

/// Errors caused by invalid inputs.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SurveyErrors {
    EmptyParticipantId,
    InvalidParticipantId(String),
    NoQuestionnaires,
}

impl Error for SurveyErrors {}

impl Display for SurveyErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurveyErrors::EmptyParticipantId => write!(f, "empty participant id"),
            SurveyErrors::InvalidParticipantId(pid) => {
                write!(f, "participant id {:?} cannot be used as a folder name", pid)
            }
            SurveyErrors::NoQuestionnaires => {
                write!(f, "no questionnaire with a template is configured")
            }
        }
    }
}
