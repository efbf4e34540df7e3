pub use crate::config::*;

/// A builder for the masterfile row of one participant.
///
/// Each field of an extract file becomes a column `<type>_<field>`. When the
/// same column is added twice, the last value wins.
///
/// ```
/// use survey_core::builder::RecordBuilder;
///
/// let mut builder = RecordBuilder::new("P001");
/// builder.add_field("NASA1", "q1", "3");
/// builder.add_field("NASA1", "File", "P001_NASA1.pdf");
/// builder.add_field("NASA1", "q1", "4");
///
/// let record = builder.build();
/// assert_eq!(record.get("participant_id"), Some("P001"));
/// assert_eq!(record.get("NASA1_q1"), Some("4"));
/// assert_eq!(record.fields.len(), 1);
/// ```
pub struct RecordBuilder {
    participant_id: String,
    fields: Vec<(String, String)>,
}

impl RecordBuilder {
    pub fn new(participant_id: &str) -> RecordBuilder {
        RecordBuilder {
            participant_id: participant_id.trim().to_string(),
            fields: Vec::new(),
        }
    }

    /// Adds one value. The `File` column of the extract files is dropped.
    pub fn add_field(&mut self, survey_type: &str, field: &str, value: &str) {
        if field == IGNORED_FIELD {
            return;
        }
        let column = format!("{}_{}", survey_type, field);
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.fields.push((column, value.to_string())),
        }
    }

    /// Adds all the rows of an extract file, in order.
    pub fn add_data_file(&mut self, data_file: &DataFile) {
        for row in data_file.rows.iter() {
            for (idx, field) in data_file.headers.iter().enumerate() {
                let value = row.get(idx).map(|s| s.as_str()).unwrap_or("");
                self.add_field(&data_file.survey_type, field, value);
            }
        }
    }

    pub fn build(self) -> Record {
        Record {
            participant_id: self.participant_id,
            fields: self.fields,
        }
    }
}

/// Builds the row of a participant from their extract files, taken in file
/// name order.
pub fn build_record(participant_id: &str, data_files: &[DataFile]) -> Record {
    let mut sorted: Vec<&DataFile> = data_files.iter().collect();
    sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    let mut builder = RecordBuilder::new(participant_id);
    for d in sorted {
        builder.add_data_file(d);
    }
    builder.build()
}
