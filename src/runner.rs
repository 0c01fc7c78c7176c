//! Run pipeline: navigate the schedule, harvest patients and process them,
//! either for the current facility or for each selected facility in turn.

use serde::Serialize;

use crate::config::RunConfig;
use crate::error::AutomationError;
use crate::harvest::collect_patient_links;
use crate::interaction::Interactor;
use crate::navigation::Navigator;
use crate::processor::{PatientOutcome, PatientProcessor};

/// Totals across every patient of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub patients: usize,
    pub documents_staged: usize,
    pub extractions_ok: usize,
    pub sections_saved: usize,
    pub failures: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &PatientOutcome) {
        self.patients += 1;
        self.documents_staged += usize::from(outcome.staged);
        self.extractions_ok += usize::from(outcome.extracted);
        self.sections_saved += outcome.sections_saved;
        self.failures += outcome.failures;
    }
}

/// Which facilities the run walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilityPlan {
    /// Whatever facility the session already shows.
    Current,
    Named(Vec<String>),
    /// Every facility whose label contains the keyword.
    Keyword(String),
}

impl FacilityPlan {
    /// Named facilities win over a keyword; blank entries are ignored.
    pub fn from_config(run: &RunConfig) -> Self {
        let names: Vec<String> = run
            .facilities
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if !names.is_empty() {
            return Self::Named(names);
        }
        match run.facility_keyword.as_deref().map(str::trim) {
            Some(keyword) if !keyword.is_empty() => Self::Keyword(keyword.to_string()),
            _ => Self::Current,
        }
    }
}

pub struct Runner<'a> {
    ui: &'a Interactor<'a>,
    processor: &'a PatientProcessor<'a>,
    day_offset: i64,
}

impl<'a> Runner<'a> {
    pub fn new(ui: &'a Interactor<'a>, processor: &'a PatientProcessor<'a>, day_offset: i64) -> Self {
        Self {
            ui,
            processor,
            day_offset,
        }
    }

    /// Walk the plan. Only a lost session aborts; everything else is logged
    /// and the run moves on.
    pub fn run(&self, plan: &FacilityPlan) -> Result<RunSummary, AutomationError> {
        let mut summary = RunSummary::default();
        let mut nav = Navigator::new(self.ui);
        match plan {
            FacilityPlan::Current => {
                nav.open_schedule()?;
                nav.ensure_filter()?;
                nav.ensure_appointments_tab()?;
                nav.shift_date(self.day_offset)?;
                self.process_schedule(&mut summary)?;
            }
            FacilityPlan::Named(names) => self.run_facilities(&mut nav, names, &mut summary)?,
            FacilityPlan::Keyword(keyword) => {
                nav.open_schedule()?;
                let names = nav.facilities_matching(keyword)?;
                tracing::info!(keyword = %keyword, ?names, "Facilities matching keyword");
                if names.is_empty() {
                    tracing::warn!(keyword = %keyword, "No facility matches keyword, nothing to do");
                } else {
                    self.run_facilities(&mut nav, &names, &mut summary)?;
                }
            }
        }
        tracing::info!(
            patients = summary.patients,
            documents_staged = summary.documents_staged,
            extractions_ok = summary.extractions_ok,
            sections_saved = summary.sections_saved,
            failures = summary.failures,
            "Run finished"
        );
        Ok(summary)
    }

    fn run_facilities(
        &self,
        nav: &mut Navigator<'_>,
        names: &[String],
        summary: &mut RunSummary,
    ) -> Result<(), AutomationError> {
        nav.open_schedule()?;
        nav.shift_date(self.day_offset)?;

        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                nav.open_schedule()?;
            }
            if !nav.select_facility(name)? {
                let available = nav.facilities_matching("")?;
                tracing::warn!(facility = %name, ?available, "Facility could not be selected, skipped");
                continue;
            }
            tracing::info!(facility = %name, "Processing facility");
            self.ui.settle();
            nav.ensure_filter()?;
            nav.ensure_appointments_tab()?;
            self.process_schedule(summary)?;
        }
        Ok(())
    }

    /// Harvest the visible schedule and process each patient in order.
    fn process_schedule(&self, summary: &mut RunSummary) -> Result<(), AutomationError> {
        let links = match collect_patient_links(self.ui) {
            Ok(links) => links,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Harvest failed, schedule skipped");
                return Ok(());
            }
        };
        for link in &links {
            match self.processor.process(link) {
                Ok(outcome) => summary.record(&outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(patient_id = %link.patient_id, error = %e, "Patient failed");
                    summary.patients += 1;
                    summary.failures += 1;
                }
            }
        }
        Ok(())
    }
}
