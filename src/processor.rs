//! Per-patient orchestration: retrieve → extract → summarize → populate → archive.
//!
//! Every stage logs its outcome with `patient_id`. A failing stage is counted
//! and the patient continues where it can; only a lost browser session is
//! returned as an error.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::config::Timeouts;
use crate::diagnostics::Diagnostics;
use crate::error::AutomationError;
use crate::extraction::IntakeExtractor;
use crate::intake::{detect_gender, IntakeDocument};
use crate::interaction::Interactor;
use crate::populate::{PopulateOutcome, SectionPopulator};
use crate::retrieval::{DocumentRetriever, RetrievalOutcome};
use crate::routes::{to_summary_route, PatientLink};
use crate::selectors::{SectionKey, UiSelectorSet};
use crate::staging::{archive_patient, RunLayout};
use crate::summary::{applies_to, builder_for};

/// What happened to one patient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatientOutcome {
    pub patient_id: String,
    pub staged: bool,
    pub extracted: bool,
    pub sections_saved: usize,
    pub failures: usize,
}

pub struct PatientProcessor<'a> {
    ui: &'a Interactor<'a>,
    sections: &'a BTreeMap<SectionKey, UiSelectorSet>,
    layout: &'a RunLayout,
    downloads_dir: &'a Path,
    extractor: &'a dyn IntakeExtractor,
    diagnostics: &'a Diagnostics,
}

impl<'a> PatientProcessor<'a> {
    pub fn new(
        ui: &'a Interactor<'a>,
        sections: &'a BTreeMap<SectionKey, UiSelectorSet>,
        layout: &'a RunLayout,
        downloads_dir: &'a Path,
        extractor: &'a dyn IntakeExtractor,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            ui,
            sections,
            layout,
            downloads_dir,
            extractor,
            diagnostics,
        }
    }

    /// Process one patient. Staging files are archived whatever the outcome.
    pub fn process(&self, link: &PatientLink) -> Result<PatientOutcome, AutomationError> {
        let mut outcome = PatientOutcome {
            patient_id: link.patient_id.clone(),
            ..PatientOutcome::default()
        };
        tracing::info!(patient_id = %link.patient_id, href = %link.href, "Processing patient");

        let result = self.run_stages(link, &mut outcome);

        match archive_patient(self.layout, &link.patient_id) {
            Ok(moved) => tracing::info!(patient_id = %link.patient_id, files = moved, "Patient archived"),
            Err(e) => {
                tracing::warn!(patient_id = %link.patient_id, error = %e, "Archiving failed");
                outcome.failures += 1;
            }
        }

        result?;
        tracing::info!(
            patient_id = %outcome.patient_id,
            staged = outcome.staged,
            extracted = outcome.extracted,
            sections_saved = outcome.sections_saved,
            failures = outcome.failures,
            "Patient done"
        );
        Ok(outcome)
    }

    fn run_stages(&self, link: &PatientLink, outcome: &mut PatientOutcome) -> Result<(), AutomationError> {
        let id = &link.patient_id;

        // Retrieve
        let retriever = DocumentRetriever::new(self.ui, self.downloads_dir, &self.layout.staging);
        let pdf = match retriever.retrieve(link)? {
            RetrievalOutcome::Staged(pdf) => pdf,
            RetrievalOutcome::NotFound => {
                tracing::info!(patient_id = %id, "No intake document, patient skipped");
                return Ok(());
            }
            RetrievalOutcome::Failed(e) => {
                tracing::warn!(patient_id = %id, error = %e, "Intake retrieval failed");
                outcome.failures += 1;
                return Ok(());
            }
        };
        outcome.staged = true;

        // Extract
        let record = self.layout.record_for(id);
        if !self.extractor.run(&pdf, &record.intake_json, &record.log) {
            let e = AutomationError::ExtractionFailure {
                log: record.log.display().to_string(),
            };
            tracing::warn!(patient_id = %id, error = %e, "Extraction failed");
            outcome.failures += 1;
            return Ok(());
        }
        outcome.extracted = true;
        tracing::info!(patient_id = %id, path = %record.intake_json.display(), "Intake extracted");

        // Back to the chart summary
        let summary_url = to_summary_route(&link.href).unwrap_or_else(|| link.href.clone());
        if let Err(e) = self.ui.browser().goto(&summary_url) {
            let e = AutomationError::from(e);
            if e.is_fatal() {
                return Err(e);
            }
            tracing::warn!(patient_id = %id, error = %e, "Could not return to summary");
            outcome.failures += 1;
            return Ok(());
        }
        self.ui.settle();
        self.ui.dismiss_popups();

        // Summaries
        let doc = match IntakeDocument::load(&record.intake_json) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(patient_id = %id, error = %e, "Intake document unusable");
                outcome.failures += 1;
                return Ok(());
            }
        };
        let gender = detect_gender(&doc);
        tracing::info!(patient_id = %id, gender = ?gender, "Intake loaded");

        let populator = SectionPopulator::new(self.ui, self.sections, self.diagnostics);
        let timeout = Timeouts::ms(self.ui.timeouts().section_ms);
        for key in SectionKey::ALL {
            if key == SectionKey::PreventiveCare && !applies_to(gender) {
                tracing::info!(patient_id = %id, section = key.as_str(), "No female section, skipped");
                continue;
            }
            let builder = builder_for(key);
            let text = builder.build(&doc);
            if builder.is_placeholder(&text) {
                tracing::info!(patient_id = %id, section = key.as_str(), "Nothing to write");
                continue;
            }

            match populator.populate_section(key, &text, timeout) {
                Ok(PopulateOutcome::Saved { verification, .. }) => {
                    tracing::info!(patient_id = %id, section = key.as_str(), ?verification, "Section written");
                    outcome.sections_saved += 1;
                }
                Ok(PopulateOutcome::Skipped) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(patient_id = %id, section = key.as_str(), error = %e, "Section not written");
                    outcome.failures += 1;
                }
            }
        }
        Ok(())
    }
}
