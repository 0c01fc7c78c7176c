//! Per-run working directories and per-patient staging files.
//!
//! Layout:
//! ```text
//! Processing/<YYYYMMDD-HHMMSS>/
//!   staging/    <id>.pdf  <id>-intake-details.json  <id>-intake-log.txt
//!   processed/  (same files, moved once the patient iteration ends)
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Run-scoped staging and processed directories.
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub root: PathBuf,
    pub staging: PathBuf,
    pub processed: PathBuf,
}

impl RunLayout {
    /// Create `<processing_root>/<run timestamp>/{staging,processed}`.
    pub fn create(processing_root: &Path, started: DateTime<Local>) -> std::io::Result<Self> {
        let root = processing_root.join(started.format("%Y%m%d-%H%M%S").to_string());
        let layout = Self {
            staging: root.join("staging"),
            processed: root.join("processed"),
            root,
        };
        std::fs::create_dir_all(&layout.staging)?;
        std::fs::create_dir_all(&layout.processed)?;
        tracing::info!(path = %layout.root.display(), "Run directories ready");
        Ok(layout)
    }

    pub fn record_for(&self, patient_id: &str) -> StagingRecord {
        StagingRecord::new(&self.staging, patient_id)
    }
}

/// The three files a patient produces while in staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRecord {
    pub pdf: PathBuf,
    pub intake_json: PathBuf,
    pub log: PathBuf,
}

impl StagingRecord {
    pub fn new(staging: &Path, patient_id: &str) -> Self {
        let stem = file_stem_for(patient_id);
        Self {
            pdf: staging.join(format!("{stem}.pdf")),
            intake_json: staging.join(format!("{stem}-intake-details.json")),
            log: staging.join(format!("{stem}-intake-log.txt")),
        }
    }
}

fn file_stem_for(patient_id: &str) -> String {
    let clean: String = patient_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if clean.is_empty() {
        "intake".to_string()
    } else {
        clean
    }
}

/// `<id>.pdf` with the id sanitized; `intake.pdf` when nothing survives.
pub fn safe_patient_filename(patient_id: &str) -> String {
    format!("{}.pdf", file_stem_for(patient_id))
}

/// First free path for `filename` in `dir`, appending `(1)`, `(2)`, ... before
/// the extension on collision.
pub fn unique_destination(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..)
        .map(|i| dir.join(format!("{stem}({i}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move a file, falling back to copy + remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                from = %from.display(),
                error = %rename_err,
                "Rename failed, copying instead"
            );
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Move a downloaded document into staging as `<id>.pdf` (disambiguated).
pub fn stage_download(download: &Path, staging: &Path, patient_id: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(staging)?;
    let target = unique_destination(staging, &safe_patient_filename(patient_id));
    move_file(download, &target)?;
    tracing::info!(
        patient_id = %patient_id,
        path = %target.display(),
        "Document staged"
    );
    Ok(target)
}

/// True if `name` belongs to `patient_id`: the id followed by `.`, `-` or `(`.
fn belongs_to(name: &str, patient_id: &str) -> bool {
    name.strip_prefix(patient_id)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| matches!(c, '.' | '-' | '('))
}

/// Move every staging file of `patient_id` into `processed/`. Returns the count moved.
pub fn archive_patient(layout: &RunLayout, patient_id: &str) -> std::io::Result<usize> {
    let stem = file_stem_for(patient_id);
    if !layout.staging.exists() {
        return Ok(0);
    }
    std::fs::create_dir_all(&layout.processed)?;

    let mut moved = 0;
    for entry in std::fs::read_dir(&layout.staging)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.path().is_file() || !belongs_to(&name, &stem) {
            continue;
        }
        let target = unique_destination(&layout.processed, &name);
        move_file(&entry.path(), &target)?;
        moved += 1;
    }
    tracing::debug!(patient_id = %patient_id, files = moved, "Staging files archived");
    Ok(moved)
}
