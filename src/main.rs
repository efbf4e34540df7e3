mod args;
mod workbench;

use clap::Parser;
use log::{debug, error, LevelFilter};
use snafu::prelude::*;
use std::error::Error;
use std::path::Path;

use crate::args::{Args, BundleAction, Command, ConfigAction};
use crate::workbench::config_reader::ConfigStore;
use crate::workbench::extract::ExtractionOptions;
use crate::workbench::*;

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn run(args: &Args) -> WorkbenchResult<()> {
    let store = ConfigStore::new(Path::new(&args.config_file));
    match &args.command {
        Command::Import { file } => run_import(file),
        Command::Generate {
            settings,
            select,
            overwrite,
        } => {
            let settings = resolve_settings(&store, settings)?;
            let participants = resolve_participants(select)?;
            let summary = run_generate(&settings, &participants, *overwrite)?;
            if !summary.failed.is_empty() {
                whatever!(
                    "{} of {} folders could not be generated",
                    summary.failed.len(),
                    summary.total()
                )
            }
            Ok(())
        }
        Command::Check {
            settings,
            participant,
        } => {
            let settings = resolve_settings(&store, settings)?;
            run_check(&settings, participant)?;
            Ok(())
        }
        Command::Duplicate {
            settings,
            participant,
        } => {
            let settings = resolve_settings(&store, settings)?;
            run_duplicate(&settings, participant)?;
            Ok(())
        }
        Command::Extract {
            settings,
            select,
            preview,
            yes,
            allow_duplicates,
            allow_incomplete,
            json,
        } => {
            let settings = resolve_settings(&store, settings)?;
            let participants = resolve_participants(select)?;
            let request = ExtractRequest {
                options: ExtractionOptions {
                    allow_duplicates: *allow_duplicates,
                    allow_incomplete: *allow_incomplete,
                },
                preview_only: *preview,
                assume_yes: *yes,
                json: *json,
            };
            run_extract(&settings, &participants, &request)?;
            Ok(())
        }
        Command::Report { settings } => {
            let settings = resolve_settings(&store, settings)?;
            run_report(&settings)?;
            Ok(())
        }
        Command::Config(action) => match action {
            ConfigAction::List => run_config_list(&store),
            ConfigAction::Show { name } => run_config_show(&store, name),
            ConfigAction::Save {
                name,
                settings,
                force,
            } => run_config_save(&store, name, settings, *force),
            ConfigAction::Delete { name, yes } => run_config_delete(&store, name, *yes),
        },
        Command::Bundle(action) => match action {
            BundleAction::List => run_bundle_list(&store),
            BundleAction::Show { name } => run_bundle_show(&store, name),
            BundleAction::Save {
                name,
                settings,
                force,
            } => run_bundle_save(&store, name, settings, *force),
        },
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    debug!("args: {:?}", args);

    if let Err(e) = run(&args) {
        error!("{}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            error!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}
