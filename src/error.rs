use thiserror::Error;

use crate::browser::BrowserError;
use crate::config::ConfigError;

/// Failure kinds of the automation layer, classified by their effect on the run.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale element reference")]
    StaleReference,

    #[error("Click rejected by every strategy: {snippet}")]
    ClickRejected { snippet: String },

    #[error("Download did not complete within {secs}s")]
    DownloadTimeout { secs: u64 },

    #[error("Extraction failed, see {log}")]
    ExtractionFailure { log: String },

    #[error("Save control missing or disabled for {0}")]
    SaveDisabled(String),

    #[error("Save not confirmed for {0}")]
    SaveNotConfirmed(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("Browser error: {0}")]
    Browser(BrowserError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BrowserError> for AutomationError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::StaleElement => Self::StaleReference,
            BrowserError::SessionLost(m) => Self::SessionLost(m),
            BrowserError::NoSuchElement(m) => Self::ElementNotFound(m),
            other => Self::Browser(other),
        }
    }
}

impl AutomationError {
    /// Only a lost session ends the run; everything else is isolated per step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

/// Top-level error for the binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
