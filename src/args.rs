use clap::{Args as ClapArgs, Parser, Subcommand};

/// Creates participant folders from questionnaire templates, and extracts the
/// completed questionnaires into a masterfile.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, default config.ini) The INI file holding the saved configurations. Template bundles are
    /// stored in a template_bundles directory next to it.
    #[clap(
        long,
        env = "SURVWB_CONFIG",
        default_value = "config.ini",
        value_parser,
        global = true
    )]
    pub config_file: String,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// Where the settings of a command come from. Explicit values override the
/// saved configuration.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// (name) A saved configuration to start from.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (name) A template bundle providing the questionnaires.
    #[clap(short, long, value_parser)]
    pub bundle: Option<String>,

    /// (name=path[:copies], repeatable) A questionnaire template, for example
    /// --template NASA=templates/nasa.pdf:2
    #[clap(short, long, value_parser)]
    pub template: Vec<String>,

    /// (folder path) Where the participant folders are created.
    #[clap(long, value_parser)]
    pub target: Option<String>,

    /// (folder path) The folder holding the completed participant folders.
    #[clap(long, value_parser)]
    pub source: Option<String>,

    /// (file path: csv, xls or xlsx) The masterfile.
    #[clap(short, long, value_parser)]
    pub masterfile: Option<String>,

    /// (default Data, or the first sheet) The worksheet of a spreadsheet masterfile.
    #[clap(long, value_parser)]
    pub sheet: Option<String>,
}

/// The participants a command applies to.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SelectArgs {
    /// (repeatable) A participant ID.
    #[clap(short, long, value_parser)]
    pub participant: Vec<String>,

    /// (comma or newline separated) Several participant IDs at once.
    #[clap(long, value_parser)]
    pub ids: Option<String>,

    /// (file path, .txt or .csv) A file listing participant IDs.
    #[clap(short, long, value_parser)]
    pub list: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reads a participant list and prints the unique IDs.
    Import {
        /// (file path, .txt or .csv)
        #[clap(value_parser)]
        file: String,
    },
    /// Creates one folder per participant with copies of the questionnaire templates.
    Generate {
        #[clap(flatten)]
        settings: SettingsArgs,
        #[clap(flatten)]
        select: SelectArgs,
        /// Replaces participant folders that exist already.
        #[clap(long, takes_value = false)]
        overwrite: bool,
    },
    /// Checks that the folder of a participant holds all the expected questionnaire data.
    Check {
        #[clap(flatten)]
        settings: SettingsArgs,
        /// The participant ID.
        #[clap(value_parser)]
        participant: String,
    },
    /// Looks for a participant in the masterfile.
    Duplicate {
        #[clap(flatten)]
        settings: SettingsArgs,
        /// The participant ID.
        #[clap(value_parser)]
        participant: String,
    },
    /// Previews, then appends the questionnaire data of participants to the masterfile.
    Extract {
        #[clap(flatten)]
        settings: SettingsArgs,
        #[clap(flatten)]
        select: SelectArgs,
        /// Only shows the rows that would be added.
        #[clap(long, takes_value = false)]
        preview: bool,
        /// Does not ask for confirmation.
        #[clap(short, long, takes_value = false)]
        yes: bool,
        /// Extracts participants already present in the masterfile.
        #[clap(long, takes_value = false)]
        allow_duplicates: bool,
        /// Extracts participants with missing questionnaires or empty fields.
        #[clap(long, takes_value = false)]
        allow_incomplete: bool,
        /// Prints the preview in JSON format.
        #[clap(long, takes_value = false)]
        json: bool,
    },
    /// Reports the completeness of every participant folder of the source folder.
    Report {
        #[clap(flatten)]
        settings: SettingsArgs,
    },
    /// Manages the saved configurations.
    #[clap(subcommand)]
    Config(ConfigAction),
    /// Manages the template bundles.
    #[clap(subcommand)]
    Bundle(BundleAction),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Lists the saved configurations.
    List,
    /// Shows a saved configuration.
    Show {
        #[clap(value_parser)]
        name: String,
    },
    /// Saves the given settings under a name.
    Save {
        #[clap(value_parser)]
        name: String,
        #[clap(flatten)]
        settings: SettingsArgs,
        /// Replaces an existing configuration without asking.
        #[clap(short, long, takes_value = false)]
        force: bool,
    },
    /// Deletes a saved configuration.
    Delete {
        #[clap(value_parser)]
        name: String,
        /// Does not ask for confirmation.
        #[clap(short, long, takes_value = false)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BundleAction {
    /// Lists the template bundles.
    List,
    /// Shows the questionnaires of a template bundle.
    Show {
        #[clap(value_parser)]
        name: String,
    },
    /// Saves the questionnaires of the given settings as a template bundle.
    Save {
        #[clap(value_parser)]
        name: String,
        #[clap(flatten)]
        settings: SettingsArgs,
        /// Replaces an existing bundle.
        #[clap(short, long, takes_value = false)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn extract_with_overrides() {
        let args = Args::try_parse_from([
            "survwb",
            "--verbose",
            "extract",
            "-c",
            "pilot",
            "-p",
            "P001",
            "-p",
            "P002",
            "--allow-duplicates",
            "--yes",
        ])
        .unwrap();
        assert!(args.verbose);
        assert_eq!(args.config_file, "config.ini");
        match args.command {
            Command::Extract {
                settings,
                select,
                allow_duplicates,
                allow_incomplete,
                yes,
                ..
            } => {
                assert_eq!(settings.config.as_deref(), Some("pilot"));
                assert_eq!(select.participant, vec!["P001", "P002"]);
                assert!(allow_duplicates);
                assert!(!allow_incomplete);
                assert!(yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn config_save_with_templates() {
        let args = Args::try_parse_from([
            "survwb",
            "config",
            "save",
            "pilot",
            "-t",
            "Demo=demo.pdf",
            "-t",
            "NASA=nasa.pdf:2",
            "--target",
            "/out",
            "--force",
        ])
        .unwrap();
        match args.command {
            Command::Config(ConfigAction::Save {
                name,
                settings,
                force,
            }) => {
                assert_eq!(name, "pilot");
                assert_eq!(settings.template.len(), 2);
                assert_eq!(settings.target.as_deref(), Some("/out"));
                assert!(force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
