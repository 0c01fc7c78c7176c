pub mod browser;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extraction;
pub mod harvest;
pub mod intake;
pub mod interaction;
pub mod navigation;
pub mod populate;
pub mod processor;
pub mod retrieval;
pub mod routes;
pub mod runner;
pub mod selectors;
pub mod staging;
pub mod summary;

use std::time::Duration;

use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::browser::webdriver::WebDriverSession;
use crate::browser::Browser;
use crate::cli::Cli;
use crate::config::AppConfig;
use crate::diagnostics::Diagnostics;
use crate::error::AppError;
use crate::extraction::{CommandExtractor, IntakeExtractor};
use crate::interaction::Interactor;
use crate::processor::PatientProcessor;
use crate::runner::{FacilityPlan, RunSummary, Runner};
use crate::staging::RunLayout;

pub fn run() -> Result<RunSummary, AppError> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(cli.verbose))),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config.run);

    std::fs::create_dir_all(&config.run.downloads_dir)?;
    let layout = RunLayout::create(&config.run.processing_root, Local::now())?;
    let diagnostics = Diagnostics::new(&config.run.artifacts_dir);
    let extractor = CommandExtractor::new(
        &config.extractor,
        Duration::from_secs(config.timeouts.extractor_secs),
    );

    let session = WebDriverSession::start(&config.webdriver, &config.run.downloads_dir)?;
    let result = drive(&session, &config, &layout, &extractor, &diagnostics);

    if cli.keep_open {
        tracing::info!(session_id = %session.session_id(), "Leaving browser session open");
    } else if let Err(e) = session.quit() {
        tracing::warn!(error = %e, "Could not close browser session");
    }

    let summary = result?;
    tracing::info!(
        patients = summary.patients,
        documents_staged = summary.documents_staged,
        extractions_ok = summary.extractions_ok,
        sections_saved = summary.sections_saved,
        failures = summary.failures,
        path = %layout.root.display(),
        "Intake sync complete"
    );
    Ok(summary)
}

/// Open the site and walk the configured facilities.
fn drive(
    browser: &dyn Browser,
    config: &AppConfig,
    layout: &RunLayout,
    extractor: &dyn IntakeExtractor,
    diagnostics: &Diagnostics,
) -> Result<RunSummary, AppError> {
    browser.goto(&config.site.url)?;
    let ui = Interactor::new(browser, &config.selectors, &config.timeouts);
    ui.settle();

    let processor = PatientProcessor::new(
        &ui,
        &config.sections,
        layout,
        &config.run.downloads_dir,
        extractor,
        diagnostics,
    );
    let plan = FacilityPlan::from_config(&config.run);
    tracing::info!(?plan, day_offset = config.run.day_offset, "Starting run");

    Ok(Runner::new(&ui, &processor, config.run.day_offset).run(&plan)?)
}
