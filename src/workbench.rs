use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use survey_core::*;

use std::fs;
use std::path::{Path, PathBuf};

use dialoguer::Confirm;
use serde_json::json;
use serde_json::Value as JSValue;

use crate::args::{SelectArgs, SettingsArgs};
use crate::workbench::completeness::*;
use crate::workbench::config_reader::*;
use crate::workbench::extract::*;
use crate::workbench::masterfile::*;

pub mod completeness;
pub mod config_reader;
pub mod extract;
pub mod folders;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod io_list;
pub mod masterfile;

#[derive(Debug, Snafu)]
pub enum WorkbenchError {
    #[snafu(display("Error reading {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Template not found: {path}"))]
    TemplateNotFound { path: String },
    #[snafu(display("Participant folder exists already: {path}"))]
    FolderExists { path: String },
    #[snafu(display("Error parsing CSV file {path}"))]
    ParsingCsv { source: csv::Error, path: String },
    #[snafu(display("Error opening masterfile {path}"))]
    OpeningMasterfile {
        source: calamine::Error,
        path: String,
    },
    #[snafu(display("Masterfile {path} has no worksheet"))]
    EmptyWorkbook { path: String },
    #[snafu(display("Worksheet {sheet} not found in {path}"))]
    MissingWorksheet { path: String, sheet: String },
    #[snafu(display("Error writing masterfile {path}"))]
    WritingWorkbook {
        source: rust_xlsxwriter::XlsxError,
        path: String,
    },
    #[snafu(display("Unsupported masterfile format: {path} (use .csv, .xls or .xlsx)"))]
    UnsupportedFormat { path: String },
    #[snafu(display("No participant ids found in {path}"))]
    EmptyParticipantList { path: String },
    #[snafu(display("Error reading configuration file {path}"))]
    ReadingConfig { source: ini::Error, path: String },
    #[snafu(display("Cannot write configuration file {path}"))]
    WritingConfig {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Configuration '{name}' not found"))]
    ConfigNotFound { name: String },
    #[snafu(display("Configuration '{name}' exists already (use --force to replace it)"))]
    ConfigExists { name: String },
    #[snafu(display("No configuration name provided"))]
    EmptyConfigName {},
    #[snafu(display("Template bundle '{name}' not found"))]
    BundleNotFound { name: String },
    #[snafu(display("Invalid template bundle name '{name}': path separators and '..' are not allowed"))]
    InvalidBundleName { name: String },
    #[snafu(display("Template bundle '{name}' exists already (use --force to replace it)"))]
    BundleExists { name: String },
    #[snafu(display("Error parsing template bundle {path}"))]
    ParsingBundle {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    InvalidInput { source: SurveyErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type WorkbenchResult<T> = Result<T, WorkbenchError>;

// **** Settings ****

/// Parses a questionnaire given on the command line as
/// `name=path[:copies]`.
pub fn parse_template_arg(arg: &str) -> WorkbenchResult<QuestionnaireTemplate> {
    let (name, rest) = match arg.split_once('=') {
        Some(p) => p,
        None => whatever!(
            "Invalid questionnaire {:?}: expected name=path[:copies]",
            arg
        ),
    };
    // The copy count is optional, and paths may contain ':' on Windows.
    let (path, copies) = match rest.rsplit_once(':') {
        Some((p, c)) if !p.is_empty() && c.trim().parse::<u32>().is_ok() => {
            (p, c.trim().parse::<u32>().unwrap_or(1))
        }
        _ => (rest, 1),
    };
    if copies == 0 {
        whatever!("Invalid questionnaire {:?}: copies must be at least 1", arg)
    }
    Ok(QuestionnaireTemplate::new(name.trim(), path.trim(), copies))
}

/// Assembles the settings of a command: the saved configuration first, then
/// the template bundle, then the explicit command line values.
pub fn resolve_settings(
    store: &ConfigStore,
    args: &SettingsArgs,
) -> WorkbenchResult<ConfigurationBundle> {
    let mut settings = match &args.config {
        Some(name) => store.load(name)?,
        None => ConfigurationBundle::default(),
    };
    if let Some(bundle_name) = &args.bundle {
        let bundle = store.bundles().load(bundle_name)?;
        settings.questionnaires = bundle.questionnaires()?;
    }
    if !args.template.is_empty() {
        settings.questionnaires = args
            .template
            .iter()
            .map(|s| parse_template_arg(s))
            .collect::<WorkbenchResult<Vec<_>>>()?;
    }
    if let Some(p) = &args.target {
        settings.target_path = p.clone();
    }
    if let Some(p) = &args.source {
        settings.source_path = p.clone();
    }
    if let Some(p) = &args.masterfile {
        settings.masterfile_path = p.clone();
    }
    if let Some(s) = &args.sheet {
        settings.masterfile_sheet = Some(s.clone());
    }
    debug!("resolve_settings: {:?}", settings);
    Ok(settings)
}

/// The participants selected on the command line, without duplicates.
pub fn resolve_participants(args: &SelectArgs) -> WorkbenchResult<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    for p in args.participant.iter() {
        ids.extend(parse_participant_ids(p));
    }
    if let Some(text) = &args.ids {
        ids.extend(parse_participant_ids(text));
    }
    if let Some(list_path) = &args.list {
        ids.extend(io_list::read_participant_list(Path::new(list_path))?);
    }
    let ids = unique_participant_ids(ids);
    if ids.is_empty() {
        whatever!("Please enter at least one participant ID (--participant, --ids or --list)")
    }
    Ok(ids)
}

fn required_path(value: &str, what: &str) -> WorkbenchResult<PathBuf> {
    if value.trim().is_empty() {
        whatever!("Please select a {}!", what)
    }
    Ok(PathBuf::from(value))
}

pub fn confirm(prompt: &str, assume_yes: bool) -> WorkbenchResult<bool> {
    if assume_yes {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .with_whatever_context(|_| "Could not read the confirmation")
}

// **** Commands ****

pub fn run_import(list_path: &str) -> WorkbenchResult<()> {
    let ids = io_list::read_participant_list(Path::new(list_path))?;
    info!(
        "Imported {} unique participant IDs from {}",
        ids.len(),
        io_common::simplify_file_name(Path::new(list_path))
    );
    for pid in ids {
        println!("{}", pid);
    }
    Ok(())
}

pub fn run_generate(
    settings: &ConfigurationBundle,
    participants: &[String],
    overwrite: bool,
) -> WorkbenchResult<folders::GenerationSummary> {
    let target = required_path(&settings.target_path, "target folder")?;
    if settings.questionnaires.iter().all(|q| q.template_path.is_empty()) {
        whatever!("Please configure questionnaires!")
    }
    let summary =
        folders::generate_folders(&target, participants, &settings.questionnaires, overwrite)?;
    println!("{}", summary);
    Ok(summary)
}

pub fn run_check(settings: &ConfigurationBundle, participant_id: &str) -> WorkbenchResult<bool> {
    let source = required_path(&settings.source_path, "source folder")?;
    let pid = validate_participant_id(participant_id).context(InvalidInputSnafu {})?;
    let (report, _) = scan_participant(&source, &pid, &settings.questionnaires)?;
    for q in report.participant.questionnaires.iter() {
        match &q.status {
            TypeStatus::Present {
                file_name,
                missing_fields,
            } if missing_fields.is_empty() => println!(" {}: present ({})", q.survey_type, file_name),
            TypeStatus::Present {
                file_name,
                missing_fields,
            } => println!(
                " {}: present ({}), empty fields: {}",
                q.survey_type,
                file_name,
                missing_fields.join(", ")
            ),
            TypeStatus::Missing => println!(" {}: MISSING", q.survey_type),
        }
    }
    for f in report.unexpected_files.iter() {
        println!(" unexpected file: {}", f);
    }
    if report.is_complete() {
        println!("{}: Complete ({} files)", pid, report.data_files.len());
    } else {
        println!("{}: INCOMPLETE - {}", pid, report.issues().join(", "));
    }
    Ok(report.is_complete())
}

pub fn run_duplicate(settings: &ConfigurationBundle, participant_id: &str) -> WorkbenchResult<bool> {
    let path = required_path(&settings.masterfile_path, "masterfile")?;
    let backend = open_masterfile(&path, settings.masterfile_sheet.as_deref())?;
    let found = is_duplicate(backend.as_ref(), participant_id)?;
    if found {
        println!(
            "Participant {} already exists in masterfile {}",
            participant_id.trim(),
            path.display()
        );
    } else {
        println!(
            "Participant {} not found in masterfile {}",
            participant_id.trim(),
            path.display()
        );
    }
    Ok(found)
}

pub fn run_report(settings: &ConfigurationBundle) -> WorkbenchResult<MissingDataReport> {
    let source = required_path(&settings.source_path, "source folder")?;
    let report = missing_data_report(&source, &settings.questionnaires)?;
    for line in report.lines.iter() {
        println!("{}", line);
    }
    println!("Summary: {}", report);
    Ok(report)
}

pub struct ExtractRequest {
    pub options: ExtractionOptions,
    pub preview_only: bool,
    pub assume_yes: bool,
    pub json: bool,
}

pub fn run_extract(
    settings: &ConfigurationBundle,
    participants: &[String],
    request: &ExtractRequest,
) -> WorkbenchResult<Option<ExtractionOutcome>> {
    let masterfile = required_path(&settings.masterfile_path, "masterfile")?;
    let source = required_path(&settings.source_path, "source folder")?;
    let backend = open_masterfile(&masterfile, settings.masterfile_sheet.as_deref())?;

    let plan = plan_extraction(
        backend.as_ref(),
        &source,
        participants,
        &settings.questionnaires,
        &request.options,
    )?;

    if request.json {
        let js = plan_to_json(&plan);
        let pretty = serde_json::to_string_pretty(&js)
            .with_whatever_context(|_| "Could not serialize the preview")?;
        println!("{}", pretty);
    } else {
        print!("{}", plan.preview());
    }

    if request.preview_only {
        info!("Preview only, the masterfile was not modified");
        return Ok(None);
    }
    if plan.ready_count() == 0 {
        warn!("Nothing to extract");
        println!("{}", plan.summary(0));
        return Ok(None);
    }
    let prompt = format!(
        "Append {} participant(s) to {}?",
        plan.ready_count(),
        masterfile.display()
    );
    if !confirm(&prompt, request.assume_yes)? {
        info!("Extraction cancelled");
        return Ok(None);
    }
    let outcome = commit_extraction(backend.as_ref(), &plan)?;
    println!("{}", plan.summary(outcome.written));
    if outcome.path != masterfile {
        println!("Masterfile saved as {}", outcome.path.display());
    }
    Ok(Some(outcome))
}

fn plan_to_json(plan: &ExtractionPlan) -> JSValue {
    let entries: Vec<JSValue> = plan
        .entries
        .iter()
        .map(|e| match &e.status {
            PlanStatus::Ready(record) => {
                let fields: serde_json::Map<String, JSValue> = record
                    .columns()
                    .into_iter()
                    .map(|(k, v)| (k, json!(v)))
                    .collect();
                json!({"participant": e.participant_id, "status": "ready", "fields": fields, "warnings": e.warnings})
            }
            PlanStatus::Duplicate => {
                json!({"participant": e.participant_id, "status": "duplicate"})
            }
            PlanStatus::Incomplete(issues) => {
                json!({"participant": e.participant_id, "status": "incomplete", "issues": issues})
            }
            PlanStatus::Failed(reason) => {
                json!({"participant": e.participant_id, "status": "failed", "reason": reason})
            }
        })
        .collect();
    json!({
        "masterfile": plan.masterfile.display().to_string(),
        "participants": entries
    })
}

// **** Configuration commands ****

pub fn run_config_list(store: &ConfigStore) -> WorkbenchResult<()> {
    let names = store.list()?;
    if names.is_empty() {
        println!("(No configurations available)");
    }
    for n in names {
        println!("{}", n);
    }
    Ok(())
}

pub fn run_config_show(store: &ConfigStore, name: &str) -> WorkbenchResult<()> {
    let c = store.load(name)?;
    println!("[{}]", c.name);
    println!("target folder: {}", c.target_path);
    println!("source folder: {}", c.source_path);
    println!("masterfile: {}", c.masterfile_path);
    if let Some(sheet) = &c.masterfile_sheet {
        println!("masterfile sheet: {}", sheet);
    }
    print_questionnaires(&c.questionnaires);
    Ok(())
}

fn print_questionnaires(questionnaires: &[QuestionnaireTemplate]) {
    for (idx, q) in questionnaires.iter().enumerate() {
        println!(
            "questionnaire {}: {} x{} <- {}",
            idx + 1,
            q.effective_name(idx),
            q.copies,
            q.template_path
        );
        if !q.required_fields.is_empty() {
            println!("  required fields: {}", q.required_fields.join(", "));
        }
    }
}

pub fn run_config_save(
    store: &ConfigStore,
    name: &str,
    args: &SettingsArgs,
    overwrite: bool,
) -> WorkbenchResult<()> {
    let mut settings = resolve_settings(store, args)?;
    settings.name = name.trim().to_string();
    if store.exists(&settings.name)? && !overwrite {
        let prompt = format!(
            "Configuration '{}' exists already. Override it permanently?",
            settings.name
        );
        if !confirm(&prompt, false)? {
            return ConfigExistsSnafu { name: settings.name }.fail();
        }
    }
    store.save(&settings, true)?;
    println!("Configuration '{}' saved successfully!", settings.name);
    Ok(())
}

pub fn run_config_delete(store: &ConfigStore, name: &str, assume_yes: bool) -> WorkbenchResult<()> {
    let prompt = format!("Are you sure you want to delete configuration '{}'?", name);
    if !confirm(&prompt, assume_yes)? {
        return Ok(());
    }
    store.delete(name)?;
    println!("Configuration '{}' deleted successfully!", name);
    Ok(())
}

pub fn run_bundle_list(store: &ConfigStore) -> WorkbenchResult<()> {
    let names = store.bundles().list()?;
    if names.is_empty() {
        println!("No template bundles found!");
    }
    for n in names {
        println!("{}", n);
    }
    Ok(())
}

pub fn run_bundle_show(store: &ConfigStore, name: &str) -> WorkbenchResult<()> {
    let bundle = store.bundles().load(name)?;
    println!("{}", bundle.name);
    print_questionnaires(&bundle.questionnaires()?);
    Ok(())
}

pub fn run_bundle_save(
    store: &ConfigStore,
    name: &str,
    args: &SettingsArgs,
    overwrite: bool,
) -> WorkbenchResult<()> {
    let settings = resolve_settings(store, args)?;
    if settings.questionnaires.is_empty() {
        whatever!("No questionnaire configuration to save!")
    }
    let bundles = store.bundles();
    let path = bundles.save(name, &settings.questionnaires, overwrite)?;
    println!(
        "Template bundle '{}' saved successfully! ({})",
        name.trim(),
        path.display()
    );
    Ok(())
}

/// Reads a whole file to a string, reporting the path on failure.
pub(crate) fn read_to_string(path: &Path) -> WorkbenchResult<String> {
    fs::read_to_string(path).context(ReadingFileSnafu {
        path: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_arguments() {
        assert_eq!(
            parse_template_arg("NASA=templates/nasa.pdf:3").unwrap(),
            QuestionnaireTemplate::new("NASA", "templates/nasa.pdf", 3)
        );
        assert_eq!(
            parse_template_arg(r"Demo=C:\templates\demo.pdf").unwrap(),
            QuestionnaireTemplate::new("Demo", r"C:\templates\demo.pdf", 1)
        );
        assert!(parse_template_arg("no-equal-sign").is_err());
        assert!(parse_template_arg("A=a.pdf:0").is_err());
    }

    #[test]
    fn flags_override_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(&dir.path().join("config.ini"));
        let saved = ConfigurationBundle {
            name: "pilot".to_string(),
            target_path: "/out".to_string(),
            source_path: "/data".to_string(),
            masterfile_path: "/master.csv".to_string(),
            masterfile_sheet: None,
            questionnaires: vec![QuestionnaireTemplate::new("Demo", "demo.pdf", 1)],
        };
        store.save(&saved, false).unwrap();
        store
            .bundles()
            .save(
                "standard",
                &[QuestionnaireTemplate::new("NASA", "nasa.pdf", 2)],
                false,
            )
            .unwrap();

        let args = SettingsArgs {
            config: Some("pilot".to_string()),
            bundle: Some("standard".to_string()),
            masterfile: Some("/other.xlsx".to_string()),
            ..Default::default()
        };
        let settings = resolve_settings(&store, &args).unwrap();
        assert_eq!(settings.target_path, "/out");
        assert_eq!(settings.masterfile_path, "/other.xlsx");
        assert_eq!(
            settings.questionnaires,
            vec![QuestionnaireTemplate::new("NASA", "nasa.pdf", 2)]
        );

        let args = SettingsArgs {
            config: Some("pilot".to_string()),
            template: vec!["X=x.pdf".to_string()],
            ..Default::default()
        };
        let settings = resolve_settings(&store, &args).unwrap();
        assert_eq!(settings.questionnaires[0].name, "X");
    }

    #[test]
    fn participants_from_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ids.txt");
        fs::write(&list, "P003\nP001\n").unwrap();
        let args = SelectArgs {
            participant: vec!["P001".to_string()],
            ids: Some("P002, P001".to_string()),
            list: Some(list.display().to_string()),
        };
        assert_eq!(
            resolve_participants(&args).unwrap(),
            vec!["P001", "P002", "P003"]
        );
        assert!(resolve_participants(&SelectArgs::default()).is_err());
    }
}
