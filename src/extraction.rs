//! Bridge to the external PDF → intake JSON extractor.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::ExtractorConfig;

/// Turns an intake PDF into the intake JSON document.
///
/// Implementations never raise: every failure is `false`, with details in `log`.
pub trait IntakeExtractor {
    fn run(&self, pdf: &Path, json: &Path, log: &Path) -> bool;
}

/// Runs a configured command; `{pdf}` and `{json}` in arguments are substituted.
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    poll_interval: Duration,
}

impl CommandExtractor {
    pub fn new(config: &ExtractorConfig, timeout: Duration) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            timeout,
            poll_interval: Duration::from_millis(100),
        }
    }

    fn render_args(&self, pdf: &Path, json: &Path) -> Vec<String> {
        let pdf = pdf.display().to_string();
        let json = json.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace("{pdf}", &pdf).replace("{json}", &json))
            .collect()
    }

    fn execute(&self, pdf: &Path, json: &Path, log: &Path) -> Result<bool, String> {
        let args = self.render_args(pdf, json);
        let mut log_file =
            std::fs::File::create(log).map_err(|e| format!("cannot create log: {e}"))?;
        writeln!(log_file, "$ {} {}", self.program, args.join(" "))
            .map_err(|e| format!("cannot write log: {e}"))?;

        let stdout = log_file
            .try_clone()
            .map_err(|e| format!("cannot share log handle: {e}"))?;
        let stderr = log_file
            .try_clone()
            .map_err(|e| format!("cannot share log handle: {e}"))?;

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| format!("cannot start {}: {e}", self.program))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = writeln!(log_file, "[timed out after {}s]", self.timeout.as_secs());
                    return Err(format!("timed out after {:?}", self.timeout));
                }
                Ok(None) => std::thread::sleep(self.poll_interval),
                Err(e) => return Err(format!("wait failed: {e}")),
            }
        };

        if !status.success() {
            let _ = writeln!(log_file, "[exit status: {status}]");
            return Ok(false);
        }
        if !json.exists() {
            let _ = writeln!(log_file, "[no output written to {}]", json.display());
            return Ok(false);
        }
        Ok(true)
    }
}

impl IntakeExtractor for CommandExtractor {
    fn run(&self, pdf: &Path, json: &Path, log: &Path) -> bool {
        match self.execute(pdf, json, log) {
            Ok(true) => {
                tracing::info!(pdf = %pdf.display(), json = %json.display(), "Extraction complete");
                true
            }
            Ok(false) => {
                tracing::warn!(pdf = %pdf.display(), log = %log.display(), "Extractor reported failure");
                false
            }
            Err(e) => {
                tracing::warn!(pdf = %pdf.display(), error = %e, "Extractor did not run to completion");
                if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(log) {
                    let _ = writeln!(f, "[error: {e}]");
                }
                false
            }
        }
    }
}

/// Extractor writing a fixed document, for tests.
#[cfg(test)]
pub struct StubExtractor {
    pub document: Option<String>,
    pub calls: std::cell::Cell<usize>,
}

#[cfg(test)]
impl StubExtractor {
    pub fn writing(document: &str) -> Self {
        Self {
            document: Some(document.to_string()),
            calls: std::cell::Cell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            document: None,
            calls: std::cell::Cell::new(0),
        }
    }
}

#[cfg(test)]
impl IntakeExtractor for StubExtractor {
    fn run(&self, _pdf: &Path, json: &Path, log: &Path) -> bool {
        self.calls.set(self.calls.get() + 1);
        std::fs::write(log, "stub extractor\n").unwrap();
        match &self.document {
            Some(doc) => {
                std::fs::write(json, doc).unwrap();
                true
            }
            None => false,
        }
    }
}
