// Creation of the participant folders.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::workbench::*;

/// The outcome of a batch of folder creations.
#[derive(Debug, Default)]
pub struct GenerationSummary {
    pub created: Vec<PathBuf>,
    /// Participant identifier and reason.
    pub failed: Vec<(String, String)>,
}

impl GenerationSummary {
    pub fn total(&self) -> usize {
        self.created.len() + self.failed.len()
    }
}

impl Display for GenerationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Generated {} of {} folders successfully!",
            self.created.len(),
            self.total()
        )?;
        if !self.failed.is_empty() {
            write!(f, "\nFailed:")?;
            for (pid, reason) in self.failed.iter() {
                write!(f, "\n{}: {}", pid, reason)?;
            }
        }
        Ok(())
    }
}

/// Creates the folder of one participant and copies the templates into it.
pub fn generate_folder(
    target: &Path,
    participant_id: &str,
    templates: &[QuestionnaireTemplate],
    overwrite: bool,
) -> WorkbenchResult<PathBuf> {
    let plan = plan_folder(participant_id, templates).context(InvalidInputSnafu {})?;

    // All the templates are checked before touching the target folder.
    for copy in plan.copies.iter() {
        if !Path::new(&copy.source).is_file() {
            return TemplateNotFoundSnafu {
                path: copy.source.clone(),
            }
            .fail();
        }
    }

    let folder = target.join(&plan.participant_id);
    let folder_s = folder.display().to_string();
    if folder.exists() {
        if !overwrite {
            return FolderExistsSnafu { path: folder_s }.fail();
        }
        warn!("Replacing existing folder {}", folder_s);
        fs::remove_dir_all(&folder).context(WritingFileSnafu {
            path: folder_s.clone(),
        })?;
    }
    fs::create_dir_all(&folder).context(WritingFileSnafu { path: folder_s })?;

    for copy in plan.copies.iter() {
        let dest = folder.join(&copy.file_name);
        debug!("generate_folder: {:?} -> {:?}", copy.source, dest);
        fs::copy(&copy.source, &dest).context(WritingFileSnafu {
            path: dest.display().to_string(),
        })?;
    }
    info!(
        "Created {} with {} questionnaire files",
        folder.display(),
        plan.copies.len()
    );
    Ok(folder)
}

/// Creates the folders of several participants. A failure for one
/// participant does not stop the others.
pub fn generate_folders(
    target: &Path,
    participants: &[String],
    templates: &[QuestionnaireTemplate],
    overwrite: bool,
) -> WorkbenchResult<GenerationSummary> {
    if !target.is_dir() {
        whatever!("Target folder {} does not exist", target.display())
    }
    let mut summary = GenerationSummary::default();
    for pid in unique_participant_ids(participants.iter().cloned()) {
        match generate_folder(target, &pid, templates, overwrite) {
            Ok(folder) => summary.created.push(folder),
            Err(e) => {
                warn!("Could not generate folder for {}: {}", pid, e);
                summary.failed.push((pid, e.to_string()));
            }
        }
    }
    Ok(summary)
}
