//! Failure artifacts: a screenshot and the page source, written when an
//! automation step gives up.
//!
//! **Output**:
//! ```text
//! {artifacts_dir}/
//!   {label}_{YYYYMMDD-HHMMSS}.png
//!   {label}_{YYYYMMDD-HHMMSS}.html
//! ```
//!
//! Capturing never panics and never fails the caller; problems are logged.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::browser::Browser;

// ──────────────────────────────────────────────
// Capture
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: artifacts_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Screenshot and page source under `label`. Returns the shared file stem
    /// path when the directory was usable.
    pub fn capture(&self, browser: &dyn Browser, label: &str) -> Option<PathBuf> {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(
                path = %self.dir.display(),
                error = %e,
                "Diagnostics: failed to create directory"
            );
            return None;
        }
        let stem = format!(
            "{}_{}",
            sanitize_label(label),
            Local::now().format("%Y%m%d-%H%M%S")
        );

        match browser.screenshot_png() {
            Ok(png) => dump_binary(&self.dir, &format!("{stem}.png"), &png),
            Err(e) => tracing::warn!(label, error = %e, "Diagnostics: screenshot unavailable"),
        }
        match browser.page_source() {
            Ok(html) => dump_text(&self.dir, &format!("{stem}.html"), &html),
            Err(e) => tracing::warn!(label, error = %e, "Diagnostics: page source unavailable"),
        }
        tracing::info!(label, dir = %self.dir.display(), "Diagnostics captured");
        Some(self.dir.join(stem))
    }
}

fn sanitize_label(label: &str) -> String {
    let clean: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if clean.is_empty() {
        "capture".to_string()
    } else {
        clean
    }
}

// ──────────────────────────────────────────────
// Writers
// ──────────────────────────────────────────────

/// Write a binary artifact. Never panics.
pub fn dump_binary(dir: &Path, filename: &str, data: &[u8]) {
    let path = dir.join(filename);
    match std::fs::write(&path, data) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = data.len(),
            "Diagnostics: binary written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostics: failed to write binary"
        ),
    }
}

/// Write a text artifact. Never panics.
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostics: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostics: failed to write text"
        ),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
