use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::selectors::{default_section_selectors, PageSelectors, SectionKey, UiSelectorSet};

/// Application-level constants
pub const APP_NAME: &str = "intake-sync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "settings.json";

/// Keyword used by `--all-facilities` when the settings name none.
pub const DEFAULT_FACILITY_KEYWORD: &str = "hormone center";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "intake_sync_lib=debug,intake_sync=debug"
    } else {
        "intake_sync_lib=info,intake_sync=info"
    }
}

/// Browser download directory: `~/Downloads` where the platform knows it.
pub fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("Cannot read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

// ──────────────────────────────────────────────
// Settings sections
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Landing page of the records application (an authenticated profile is assumed).
    pub url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "https://static.practicefusion.com/apps/ehr/index.html#/PF/schedule/scheduler/agenda"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    pub url: String,
    pub browser_name: String,
    pub args: Vec<String>,
    pub headless: bool,
    pub request_timeout_secs: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9515".to_string(),
            browser_name: "MicrosoftEdge".to_string(),
            args: vec!["--start-maximized".to_string()],
            headless: false,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Signed day shift applied to the schedule (0 = today, -1 = yesterday).
    pub day_offset: i64,
    /// Facilities to iterate, selected by label; empty means "current facility".
    pub facilities: Vec<String>,
    /// Iterate every facility whose label contains this keyword.
    pub facility_keyword: Option<String>,
    pub processing_root: PathBuf,
    pub downloads_dir: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            day_offset: -1,
            facilities: Vec::new(),
            facility_keyword: None,
            processing_root: PathBuf::from("Processing"),
            downloads_dir: default_downloads_dir(),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub program: String,
    /// Argument template; `{pdf}` and `{json}` are substituted per patient.
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec![
                "-m".to_string(),
                "intake_extractor".to_string(),
                "{pdf}".to_string(),
                "{json}".to_string(),
            ],
            working_dir: None,
        }
    }
}

/// Bounded-wait tunables, in milliseconds unless the name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub poll_interval_ms: u64,
    pub idle_ms: u64,
    pub click_effect_ms: u64,
    pub element_ms: u64,
    pub filter_confirm_ms: u64,
    pub table_ms: u64,
    pub pending_view_ms: u64,
    pub signed_view_ms: u64,
    pub download_ms: u64,
    pub download_poll_ms: u64,
    pub save_confirm_ms: u64,
    pub facility_confirm_ms: u64,
    pub section_ms: u64,
    pub stale_retry_delay_ms: u64,
    pub extractor_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            idle_ms: 10_000,
            click_effect_ms: 2_000,
            element_ms: 10_000,
            filter_confirm_ms: 8_000,
            table_ms: 15_000,
            pending_view_ms: 4_000,
            signed_view_ms: 20_000,
            download_ms: 40_000,
            download_poll_ms: 500,
            save_confirm_ms: 5_000,
            facility_confirm_ms: 4_000,
            section_ms: 15_000,
            stale_retry_delay_ms: 300,
            extractor_secs: 600,
        }
    }
}

impl Timeouts {
    pub fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    pub fn poll_interval(&self) -> Duration {
        Self::ms(self.poll_interval_ms)
    }

    /// Millisecond-scale waits for tests driving the fake browser.
    #[cfg(test)]
    pub fn quick() -> Self {
        Self {
            poll_interval_ms: 1,
            idle_ms: 20,
            click_effect_ms: 10,
            element_ms: 20,
            filter_confirm_ms: 20,
            table_ms: 20,
            pending_view_ms: 10,
            signed_view_ms: 20,
            download_ms: 200,
            download_poll_ms: 5,
            save_confirm_ms: 20,
            facility_confirm_ms: 20,
            section_ms: 20,
            stale_retry_delay_ms: 1,
            extractor_secs: 10,
        }
    }
}

// ──────────────────────────────────────────────
// Top-level settings
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub webdriver: WebDriverConfig,
    pub run: RunConfig,
    pub extractor: ExtractorConfig,
    pub timeouts: Timeouts,
    pub selectors: PageSelectors,
    pub sections: BTreeMap<SectionKey, UiSelectorSet>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            webdriver: WebDriverConfig::default(),
            run: RunConfig::default(),
            extractor: ExtractorConfig::default(),
            timeouts: Timeouts::default(),
            selectors: PageSelectors::default(),
            sections: default_section_selectors(),
        }
    }
}

impl AppConfig {
    /// Load settings from `path`, or defaults when `path` is `None` and no
    /// `settings.json` exists in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    tracing::info!("No settings file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.fill_missing_sections();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "Settings loaded");
        Ok(config)
    }

    /// `INTAKE_SYNC_*` environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("INTAKE_SYNC_WEBDRIVER_URL") {
            self.webdriver.url = url;
        }
        if let Ok(dir) = std::env::var("INTAKE_SYNC_DOWNLOADS_DIR") {
            self.run.downloads_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("INTAKE_SYNC_ARTIFACTS_DIR") {
            self.run.artifacts_dir = PathBuf::from(dir);
        }
    }

    /// A settings file that overrides some sections keeps defaults for the rest.
    fn fill_missing_sections(&mut self) {
        for (key, set) in default_section_selectors() {
            self.sections.entry(key).or_insert(set);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.site.url)
            .map_err(|e| ConfigError::Invalid(format!("site.url: {e}")))?;
        url::Url::parse(&self.webdriver.url)
            .map_err(|e| ConfigError::Invalid(format!("webdriver.url: {e}")))?;
        if self.extractor.program.trim().is_empty() {
            return Err(ConfigError::Invalid("extractor.program is empty".into()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
