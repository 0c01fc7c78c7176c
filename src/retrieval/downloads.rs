//! Shared downloads directory: purge stale intake files, then poll for the new one.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::interaction::poll_until;

/// Extensions browsers use for in-progress downloads.
const PARTIAL_EXTENSIONS: &[&str] = &["crdownload", "part", "tmp", "download"];

fn is_intake_name(name: &str) -> bool {
    name.to_lowercase().contains("intake")
}

fn is_partial(path: &Path) -> bool {
    let partial_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| PARTIAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if partial_ext {
        return true;
    }
    // Chromium keeps "<name>.crdownload" next to the final name while writing.
    let mut marker = path.as_os_str().to_owned();
    marker.push(".crdownload");
    Path::new(&marker).exists()
}

/// Delete every file whose name contains "intake" (any case). Returns the count removed.
pub fn purge_intake_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !path.is_file() || !is_intake_name(&name) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not purge stale download"
            ),
        }
    }
    if removed > 0 {
        tracing::debug!(dir = %dir.display(), count = removed, "Purged stale intake downloads");
    }
    removed
}

/// Newest completed intake PDF in `dir`, by modification time.
pub fn newest_completed_intake(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| is_intake_name(&n.to_string_lossy()))
                .unwrap_or(false)
        })
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .filter(|p| !is_partial(p))
        .max_by_key(|p| {
            std::fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
}

/// Poll `dir` until a completed intake PDF appears or `timeout` elapses.
pub fn wait_for_download(dir: &Path, timeout: Duration, interval: Duration) -> Option<PathBuf> {
    let mut found = None;
    poll_until(timeout, interval, || {
        found = newest_completed_intake(dir);
        found.is_some()
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_removes_only_intake_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Patient INTAKE.pdf"), b"x").unwrap();
        std::fs::write(tmp.path().join("intake(1).pdf"), b"x").unwrap();
        std::fs::write(tmp.path().join("invoice.pdf"), b"x").unwrap();

        assert_eq!(purge_intake_files(tmp.path()), 2);
        assert!(tmp.path().join("invoice.pdf").exists());
    }

    #[test]
    fn partial_downloads_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("intake.pdf.crdownload"), b"x").unwrap();
        std::fs::write(tmp.path().join("intake.pdf"), b"x").unwrap();
        assert!(newest_completed_intake(tmp.path()).is_none());

        std::fs::remove_file(tmp.path().join("intake.pdf.crdownload")).unwrap();
        assert_eq!(
            newest_completed_intake(tmp.path()).unwrap(),
            tmp.path().join("intake.pdf")
        );
    }

    #[test]
    fn newest_file_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let old = tmp.path().join("intake-old.pdf");
        std::fs::write(&old, b"x").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();
        std::fs::write(tmp.path().join("intake-new.pdf"), b"x").unwrap();

        assert_eq!(
            newest_completed_intake(tmp.path()).unwrap(),
            tmp.path().join("intake-new.pdf")
        );
    }

    #[test]
    fn wait_times_out_on_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(wait_for_download(tmp.path(), Duration::from_millis(10), Duration::from_millis(2)).is_none());
    }
}
