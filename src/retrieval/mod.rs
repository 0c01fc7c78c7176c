//! Intake document retrieval: pending view, signed-view fallback, download, staging.

pub mod downloads;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::{find_first, ElementRef};
use crate::config::Timeouts;
use crate::error::AutomationError;
use crate::interaction::{ClickExpectation, Interactor};
use crate::routes::{to_timeline_route, PatientLink, PENDING_VIEW, SIGNED_VIEW};
use crate::staging::stage_download;

/// Steps of the retrieval state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalState {
    PendingView,
    SignedView,
    IntakeFound { element: ElementRef, view: &'static str },
    Clicked,
    Downloaded(PathBuf),
    Staged(PathBuf),
    NotFound,
}

impl std::fmt::Display for RetrievalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingView => write!(f, "pending-view"),
            Self::SignedView => write!(f, "signed-view"),
            Self::IntakeFound { view, .. } => write!(f, "intake-found({view})"),
            Self::Clicked => write!(f, "clicked"),
            Self::Downloaded(_) => write!(f, "downloaded"),
            Self::Staged(_) => write!(f, "staged"),
            Self::NotFound => write!(f, "not-found"),
        }
    }
}

/// Terminal result of one retrieval.
#[derive(Debug)]
pub enum RetrievalOutcome {
    Staged(PathBuf),
    NotFound,
    /// Non-fatal failure after the document was located.
    Failed(AutomationError),
}

impl RetrievalOutcome {
    pub fn staged_pdf(&self) -> Option<&Path> {
        match self {
            Self::Staged(p) => Some(p),
            _ => None,
        }
    }
}

pub struct DocumentRetriever<'a> {
    ui: &'a Interactor<'a>,
    downloads_dir: &'a Path,
    staging_dir: &'a Path,
}

impl<'a> DocumentRetriever<'a> {
    pub fn new(ui: &'a Interactor<'a>, downloads_dir: &'a Path, staging_dir: &'a Path) -> Self {
        Self {
            ui,
            downloads_dir,
            staging_dir,
        }
    }

    /// Run the state machine for one patient. Only a lost session is `Err`.
    pub fn retrieve(&self, link: &PatientLink) -> Result<RetrievalOutcome, AutomationError> {
        let timeouts = self.ui.timeouts();
        let mut state = RetrievalState::PendingView;
        loop {
            tracing::debug!(patient_id = %link.patient_id, state = %state, "Retrieval step");
            state = match state {
                RetrievalState::PendingView => {
                    match self.search_view(link, PENDING_VIEW, Timeouts::ms(timeouts.pending_view_ms))? {
                        Some(element) => RetrievalState::IntakeFound {
                            element,
                            view: PENDING_VIEW,
                        },
                        None => RetrievalState::SignedView,
                    }
                }
                RetrievalState::SignedView => {
                    match self.search_view(link, SIGNED_VIEW, Timeouts::ms(timeouts.signed_view_ms))? {
                        Some(element) => RetrievalState::IntakeFound {
                            element,
                            view: SIGNED_VIEW,
                        },
                        None => RetrievalState::NotFound,
                    }
                }
                RetrievalState::IntakeFound { element, view } => {
                    tracing::info!(patient_id = %link.patient_id, view, "Intake document found");
                    match self.ui.robust_click(&element, &ClickExpectation::Accepted, false) {
                        Ok(_) => RetrievalState::Clicked,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => return Ok(RetrievalOutcome::Failed(e)),
                    }
                }
                RetrievalState::Clicked => {
                    self.ui.settle();
                    match self.download() {
                        Ok(path) => RetrievalState::Downloaded(path),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::warn!(patient_id = %link.patient_id, error = %e, "Download failed");
                            return Ok(RetrievalOutcome::Failed(e));
                        }
                    }
                }
                RetrievalState::Downloaded(path) => {
                    match stage_download(&path, self.staging_dir, &link.patient_id) {
                        Ok(staged) => RetrievalState::Staged(staged),
                        Err(e) => return Ok(RetrievalOutcome::Failed(e.into())),
                    }
                }
                RetrievalState::Staged(path) => return Ok(RetrievalOutcome::Staged(path)),
                RetrievalState::NotFound => {
                    tracing::info!(patient_id = %link.patient_id, "No intake document in pending or signed views");
                    return Ok(RetrievalOutcome::NotFound);
                }
            };
        }
    }

    /// Open a timeline view and look for the intake entry.
    fn search_view(
        &self,
        link: &PatientLink,
        view: &'static str,
        timeout: Duration,
    ) -> Result<Option<ElementRef>, AutomationError> {
        let Some(url) = to_timeline_route(&link.href, view) else {
            tracing::warn!(href = %link.href, "Not a summary route, cannot open timeline");
            return Ok(None);
        };
        self.ui.browser().goto(&url)?;
        self.ui.settle();
        self.find_intake_link(timeout)
    }

    /// First document-type link in the events table whose text mentions "intake".
    fn find_intake_link(&self, timeout: Duration) -> Result<Option<ElementRef>, AutomationError> {
        let browser = self.ui.browser();
        let selectors = self.ui.selectors();
        let mut found = None;
        let mut fatal = None;
        self.ui.poll(timeout, || {
            let table = match find_first(browser, &selectors.timeline_table) {
                Ok(Some(t)) => t,
                Ok(None) => return false,
                Err(e) => {
                    fatal = Some(e);
                    return true;
                }
            };
            let Ok(candidates) = browser.find_all_in(&table, &selectors.intake_links) else {
                return false;
            };
            found = candidates.into_iter().find(|el| {
                browser
                    .text(el)
                    .map(|t| t.to_lowercase().contains("intake"))
                    .unwrap_or(false)
            });
            found.is_some()
        });
        if let Some(e) = fatal {
            return Err(e.into());
        }
        Ok(found)
    }

    /// Purge stale intake files, trigger the download and wait for the new file.
    fn download(&self) -> Result<PathBuf, AutomationError> {
        let timeouts = self.ui.timeouts();
        let button = self
            .ui
            .wait_visible(
                None,
                &self.ui.selectors().download_button,
                Timeouts::ms(timeouts.element_ms),
            )?
            .ok_or_else(|| AutomationError::ElementNotFound("download button".into()))?;

        downloads::purge_intake_files(self.downloads_dir);
        self.ui
            .robust_click(&button, &ClickExpectation::Accepted, false)?;

        downloads::wait_for_download(
            self.downloads_dir,
            Timeouts::ms(timeouts.download_ms),
            Timeouts::ms(timeouts.download_poll_ms),
        )
        .ok_or(AutomationError::DownloadTimeout {
            secs: timeouts.download_ms / 1000,
        })
    }
}
