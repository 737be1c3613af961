mod artifacts;
mod charts;
mod dashboard;
mod dataset;
mod error;
#[cfg(test)]
mod fixtures;
mod form;
mod inference;
mod map;
mod records;
mod regions;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{debug, info, warn, LevelFilter};

use dashboard::{
    field_lines, run_and_report, summary_lines, watch, DashboardPaths, DATASET_PATH, FORM_PATH,
    MODEL_PATH, OUTPUT_PATH, SCALER_PATH,
};
use dataset::load_dataset;
use error::DashboardError;
use form::{write_template, FormTemplate};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stunting risk dashboard for Southeast Sulawesi", long_about = None)]
#[command(propagate_version = true)]
pub struct DashboardArgs {
    #[arg(long, global = true, default_value = DATASET_PATH, help = "Cleaned dataset (CSV)")]
    dataset: PathBuf,
    #[arg(long, global = true, default_value = SCALER_PATH, help = "Fitted scaler artifact")]
    scaler: PathBuf,
    #[arg(long, global = true, default_value = MODEL_PATH, help = "Trained classifier artifact")]
    model: PathBuf,
    #[arg(long, global = true, default_value = FORM_PATH, help = "Form with the ten region slots")]
    form: PathBuf,
    #[arg(short, long, global = true, default_value = OUTPUT_PATH, help = "Output directory")]
    output: PathBuf,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Verbose level")]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the form pre-filled with the dataset medians
    Template {
        #[arg(long, help = "Overwrite an existing form")]
        force: bool,
    },
    /// Run the dashboard once
    Run,
    /// Rerun the dashboard whenever the form changes
    Watch {
        #[arg(long, default_value_t = 500, help = "Polling interval in milliseconds")]
        interval_ms: u64,
    },
}

impl DashboardArgs {
    fn paths(&self) -> DashboardPaths {
        DashboardPaths {
            dataset: self.dataset.clone(),
            scaler: self.scaler.clone(),
            model: self.model.clone(),
            form: self.form.clone(),
            output: self.output.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), DashboardError> {
    let cli = DashboardArgs::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let env = Env::new().filter("STUNTING_LOG");
    Builder::new()
        .filter(Some("stunting_dashboard"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);

    let paths = cli.paths();
    match cli.command {
        Command::Template { force } => template(&paths, force).await,
        Command::Run => run(&paths).await,
        Command::Watch { interval_ms } => watch(&paths, Duration::from_millis(interval_ms)).await,
    }
}

/// One pass; a failure is returned to `main` and reported there only.
async fn run(paths: &DashboardPaths) -> Result<(), DashboardError> {
    let report = run_and_report(paths).await?;
    for line in summary_lines(&report) {
        println!("{}", line);
    }
    Ok(())
}

async fn template(paths: &DashboardPaths, force: bool) -> Result<(), DashboardError> {
    if paths.form.exists() && !force {
        warn!("{:?} already exists, pass --force to overwrite it", paths.form);
        return Ok(());
    }

    let df = load_dataset(&paths.dataset).await?;
    let template = FormTemplate::from_dataset(&df)?;
    for line in field_lines(&template, template.default_region) {
        println!("{}", line);
    }
    write_template(&paths.form, &template).await?;
    info!("wrote form template to {:?}", paths.form);
    Ok(())
}
