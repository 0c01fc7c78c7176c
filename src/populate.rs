//! Generic "summary text → chart section" writer, driven by [`UiSelectorSet`].
//!
//! Open (add, else edit) → fill → save → verify, with one retry through the
//! edit path when the saved text cannot be seen in the section afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::browser::{
    first_visible, keys, script, Browser, BrowserError, ElementRef, Locator, ScriptArg,
};
use crate::config::Timeouts;
use crate::diagnostics::Diagnostics;
use crate::error::AutomationError;
use crate::interaction::{ClickExpectation, Interactor};
use crate::selectors::{SectionKey, UiSelectorSet};

/// Characters of the first summary line that must show up in the section view.
const VERIFY_PREFIX_LEN: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePath {
    Add,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Unconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    Skipped,
    Saved {
        path: SavePath,
        verification: Verification,
    },
}

/// An opened editor entry point.
struct EditorControl {
    element: ElementRef,
    path: SavePath,
    /// Already activated by a script click while hidden.
    clicked: bool,
}

pub struct SectionPopulator<'a> {
    ui: &'a Interactor<'a>,
    sections: &'a BTreeMap<SectionKey, UiSelectorSet>,
    diagnostics: &'a Diagnostics,
}

impl<'a> SectionPopulator<'a> {
    pub fn new(
        ui: &'a Interactor<'a>,
        sections: &'a BTreeMap<SectionKey, UiSelectorSet>,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            ui,
            sections,
            diagnostics,
        }
    }

    fn browser(&self) -> &'a dyn Browser {
        self.ui.browser()
    }

    fn fail(&self, key: SectionKey, reason: &str, error: AutomationError) -> AutomationError {
        tracing::warn!(section = key.as_str(), reason, error = %error, "Section population failed");
        self.diagnostics
            .capture(self.browser(), &format!("{}-{reason}", key.as_str()));
        error
    }

    /// Write `text` into the section `key`.
    ///
    /// `timeout` bounds the waits for the text area and the save control.
    pub fn populate_section(
        &self,
        key: SectionKey,
        text: &str,
        timeout: Duration,
    ) -> Result<PopulateOutcome, AutomationError> {
        if text.trim().is_empty() {
            tracing::info!(section = key.as_str(), "Summary empty, section skipped");
            return Ok(PopulateOutcome::Skipped);
        }
        let set = self
            .sections
            .get(&key)
            .ok_or_else(|| AutomationError::ElementNotFound(format!("no selectors for {key}")))?;

        let path = self.attempt(key, set, text, timeout, false)?;
        if self.verify(set, text) {
            tracing::info!(section = key.as_str(), ?path, "Section saved and verified");
            return Ok(saved(path, Verification::Verified));
        }

        // The first save went through: from here on only a lost session is an error.
        tracing::info!(section = key.as_str(), "Saved text not visible yet, retrying via edit");
        match self.attempt(key, set, text, timeout, true) {
            Ok(retry_path) if self.verify(set, text) => {
                tracing::info!(
                    section = key.as_str(),
                    path = ?retry_path,
                    "Section saved and verified on retry"
                );
                Ok(saved(retry_path, Verification::Verified))
            }
            Ok(retry_path) => {
                tracing::warn!(
                    section = key.as_str(),
                    path = ?retry_path,
                    "Saved text not visible in section, reporting unconfirmed"
                );
                Ok(saved(retry_path, Verification::Unconfirmed))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(
                    section = key.as_str(),
                    ?path,
                    error = %e,
                    "Retry failed after a successful save, reporting unconfirmed"
                );
                Ok(saved(path, Verification::Unconfirmed))
            }
        }
    }

    /// One open → fill → save pass.
    fn attempt(
        &self,
        key: SectionKey,
        set: &UiSelectorSet,
        text: &str,
        timeout: Duration,
        prefer_edit: bool,
    ) -> Result<SavePath, AutomationError> {
        let path = self.open_editor(key, set, prefer_edit)?;
        self.fill(key, set, text, timeout)?;
        self.save(key, set, timeout)?;
        Ok(path)
    }

    // ──────────────────────────────────────────────
    // Open
    // ──────────────────────────────────────────────

    fn open_editor(
        &self,
        key: SectionKey,
        set: &UiSelectorSet,
        prefer_edit: bool,
    ) -> Result<SavePath, AutomationError> {
        self.ui.dismiss_popups();
        let containers = self.browser().find_all(&set.section_container)?;
        tracing::debug!(section = key.as_str(), count = containers.len(), "Section containers found");

        let control = if prefer_edit {
            match self.find_edit(&containers, &set.edit_button)? {
                Some(edit) => Some(edit),
                None => self.find_add(&containers, &set.add_button)?,
            }
        } else {
            match self.find_add(&containers, &set.add_button)? {
                Some(add) => Some(add),
                None => self.find_edit(&containers, &set.edit_button)?,
            }
        };
        let Some(control) = control else {
            return Err(self.fail(
                key,
                "no-add-or-edit-btn",
                AutomationError::ElementNotFound(format!("add or edit control for {key}")),
            ));
        };

        if !control.clicked {
            if let Err(e) = self
                .ui
                .robust_click(&control.element, &ClickExpectation::Accepted, false)
            {
                if e.is_fatal() {
                    return Err(e);
                }
                return Err(self.fail(key, "click-fail", e));
            }
        }
        tracing::debug!(section = key.as_str(), path = ?control.path, "Editor opened");
        Ok(control.path)
    }

    fn find_add(
        &self,
        containers: &[ElementRef],
        add_button: &Locator,
    ) -> Result<Option<EditorControl>, AutomationError> {
        for container in containers {
            for button in self.scoped(container, add_button)? {
                if self.usable(&button)? {
                    return Ok(Some(EditorControl {
                        element: button,
                        path: SavePath::Add,
                        clicked: false,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Edit controls may sit off-screen: scroll and re-check, and as a last
    /// resort script-click one that is enabled but still hidden.
    fn find_edit(
        &self,
        containers: &[ElementRef],
        edit_button: &Locator,
    ) -> Result<Option<EditorControl>, AutomationError> {
        let browser = self.browser();
        for container in containers {
            for button in self.scoped(container, edit_button)? {
                let enabled = soft(browser.is_enabled(&button))?;
                let mut visible = soft(browser.is_displayed(&button))?;
                if !visible {
                    self.ui.scroll_into_view(&button);
                    visible = soft(browser.is_displayed(&button))?;
                }
                if visible && enabled {
                    return Ok(Some(EditorControl {
                        element: button,
                        path: SavePath::Edit,
                        clicked: false,
                    }));
                }
                if enabled && self.ui.script_click(&button).is_ok() {
                    tracing::debug!("Hidden edit control activated by script");
                    return Ok(Some(EditorControl {
                        element: button,
                        path: SavePath::Edit,
                        clicked: true,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn scoped(&self, scope: &ElementRef, locator: &Locator) -> Result<Vec<ElementRef>, AutomationError> {
        match self.browser().find_all_in(scope, locator) {
            Ok(found) => Ok(found),
            Err(e) if e.is_session_lost() => Err(e.into()),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn usable(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        let browser = self.browser();
        Ok(soft(browser.is_displayed(element))? && soft(browser.is_enabled(element))?)
    }

    // ──────────────────────────────────────────────
    // Fill
    // ──────────────────────────────────────────────

    fn fill(
        &self,
        key: SectionKey,
        set: &UiSelectorSet,
        text: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let browser = self.browser();
        let mut textarea = None;
        self.ui.poll(timeout, || {
            textarea = set.textarea_candidates.iter().find_map(|loc| {
                first_visible(browser, None, loc).ok().flatten()
            });
            textarea.is_some()
        });
        let Some(textarea) = textarea else {
            return Err(self.fail(
                key,
                "no-textarea",
                AutomationError::ElementNotFound(format!("text area for {key}")),
            ));
        };

        if let Err(e) = browser.clear(&textarea) {
            if e.is_session_lost() {
                return Err(e.into());
            }
            tracing::debug!(error = %e, "Clear rejected, selecting all and deleting");
            let _ = browser.send_keys(&textarea, keys::SELECT_ALL);
            let _ = browser.send_keys(&textarea, keys::DELETE);
        }

        if let Err(e) = browser.send_keys(&textarea, text) {
            if e.is_session_lost() {
                return Err(e.into());
            }
            return Err(self.fail(key, "sendkeys-fail", e.into()));
        }
        self.notify(&textarea, script::NOTIFY_INPUT, None);

        let value = browser
            .attribute(&textarea, "value")
            .ok()
            .flatten()
            .unwrap_or_default();
        if value.trim().is_empty() {
            tracing::debug!(section = key.as_str(), "Typed text did not stick, setting value by script");
            self.notify(&textarea, script::SET_VALUE, Some(text));
        }
        Ok(())
    }

    fn notify(&self, textarea: &ElementRef, source: &str, value: Option<&str>) {
        let mut args = vec![ScriptArg::Element(textarea.clone())];
        args.extend(value.map(|v| ScriptArg::Text(v.to_string())));
        if let Err(e) = self.browser().execute_script(source, &args) {
            tracing::debug!(error = %e, "Input event dispatch failed");
        }
    }

    // ──────────────────────────────────────────────
    // Save
    // ──────────────────────────────────────────────

    fn save(&self, key: SectionKey, set: &UiSelectorSet, timeout: Duration) -> Result<(), AutomationError> {
        self.ui.dismiss_popups();
        let Some(button) = self.clickable_save(set, timeout)? else {
            return Err(self.fail(key, "no-save-btn", AutomationError::SaveDisabled(key.to_string())));
        };

        if let Err(e) = self.ui.robust_click(&button, &ClickExpectation::Accepted, false) {
            if e.is_fatal() {
                return Err(e);
            }
            return Err(self.fail(
                key,
                "save-click-fail",
                AutomationError::SaveNotConfirmed(format!("{key}: {e}")),
            ));
        }

        let browser = self.browser();
        let closed = self.ui.poll(Timeouts::ms(self.ui.timeouts().save_confirm_ms), || {
            !browser.is_displayed(&button).unwrap_or(false)
                || !browser.is_enabled(&button).unwrap_or(false)
        });
        if !closed {
            tracing::debug!(section = key.as_str(), "Save control still active, waiting for idle");
            self.ui.settle();
        }
        Ok(())
    }

    /// First save candidate that is present, displayed and enabled.
    fn clickable_save(
        &self,
        set: &UiSelectorSet,
        timeout: Duration,
    ) -> Result<Option<ElementRef>, AutomationError> {
        let browser = self.browser();
        let mut found = None;
        let mut lost = None;
        self.ui.poll(timeout, || {
            for loc in &set.save_button_candidates {
                let candidates = match browser.find_all(loc) {
                    Ok(c) => c,
                    Err(e) if e.is_session_lost() => {
                        lost = Some(e);
                        return true;
                    }
                    Err(_) => continue,
                };
                found = candidates.into_iter().find(|el| {
                    browser.is_displayed(el).unwrap_or(false) && browser.is_enabled(el).unwrap_or(false)
                });
                if found.is_some() {
                    return true;
                }
            }
            false
        });
        if let Some(e) = lost {
            return Err(e.into());
        }
        Ok(found)
    }

    // ──────────────────────────────────────────────
    // Verify
    // ──────────────────────────────────────────────

    fn verify(&self, set: &UiSelectorSet, text: &str) -> bool {
        let expected = verification_prefix(text);
        if expected.is_empty() {
            return true;
        }
        let browser = self.browser();
        let sources: Vec<&Locator> = if set.view_text_candidates.is_empty() {
            vec![&set.section_container]
        } else {
            set.view_text_candidates.iter().collect()
        };
        self.ui.poll(Timeouts::ms(self.ui.timeouts().save_confirm_ms), || {
            sources.iter().any(|loc| {
                browser
                    .find_all(loc)
                    .unwrap_or_default()
                    .iter()
                    .any(|el| browser.text(el).map(|t| t.contains(&expected)).unwrap_or(false))
            })
        })
    }
}

/// Stale or flaky element reads count as "no"; only a lost session propagates.
fn soft(result: Result<bool, BrowserError>) -> Result<bool, AutomationError> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_session_lost() => Err(e.into()),
        Err(_) => Ok(false),
    }
}

fn saved(path: SavePath, verification: Verification) -> PopulateOutcome {
    PopulateOutcome::Saved { path, verification }
}

/// First non-blank line, trimmed, cut to [`VERIFY_PREFIX_LEN`] characters.
fn verification_prefix(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(VERIFY_PREFIX_LEN).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{Effect, FakeBrowser, FakeElement};
    use crate::selectors::{default_section_selectors, PageSelectors};

    const SUMMARY: &str = "Mother: Age 58; Conditions: Hypertension\nFather Age: 61";

    struct Section {
        browser: FakeBrowser,
        container: usize,
        add: usize,
        edit: usize,
        textarea: usize,
        save: usize,
    }

    /// A family-history card whose save control hides itself and publishes
    /// the text area value into the card text.
    fn family_card(sets: &BTreeMap<SectionKey, UiSelectorSet>, publish: bool) -> Section {
        let set = &sets[&SectionKey::FamilyHistory];
        let browser = FakeBrowser::new();
        let container = browser.add(FakeElement::visible());
        let add = browser.add(FakeElement::visible());
        let edit = browser.add(FakeElement::hidden());
        let textarea = browser.add(FakeElement::hidden());
        let save = browser.add(FakeElement::visible());

        browser.register(set.section_container.clone(), &[container]);
        browser.register_in(container, set.add_button.clone(), &[add]);
        browser.register_in(container, set.edit_button.clone(), &[edit]);
        browser.register(set.textarea_candidates[0].clone(), &[textarea]);
        browser.register(set.save_button_candidates[0].clone(), &[save]);

        browser.on_click(add, Effect::SetDisplayed(textarea, true));
        browser.on_click(edit, Effect::SetDisplayed(textarea, true));
        browser.on_click(save, Effect::SetDisplayed(save, false));
        if publish {
            browser.on_click(save, Effect::CopyValueToText { from: textarea, to: container });
        }
        Section {
            browser,
            container,
            add,
            edit,
            textarea,
            save,
        }
    }

    fn run(
        s: &Section,
        sets: &BTreeMap<SectionKey, UiSelectorSet>,
        artifacts: &std::path::Path,
        text: &str,
    ) -> Result<PopulateOutcome, AutomationError> {
        let sel = PageSelectors::default();
        let t = Timeouts::quick();
        let ui = Interactor::new(&s.browser, &sel, &t);
        let diagnostics = Diagnostics::new(artifacts);
        SectionPopulator::new(&ui, sets, &diagnostics).populate_section(
            SectionKey::FamilyHistory,
            text,
            Timeouts::ms(t.section_ms),
        )
    }

    #[test]
    fn add_fill_save_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, true);

        let outcome = run(&s, &sets, tmp.path(), SUMMARY).unwrap();

        assert_eq!(
            outcome,
            PopulateOutcome::Saved {
                path: SavePath::Add,
                verification: Verification::Verified
            }
        );
        assert_eq!(s.browser.element(s.textarea).value, SUMMARY);
        assert_eq!(s.browser.element(s.container).text, SUMMARY);
        assert_eq!(s.browser.count(&format!("click:{}", s.add)), 1);
        assert_eq!(s.browser.count(&format!("click:{}", s.save)), 1);
        assert_eq!(s.browser.count(&format!("notify:{}", s.textarea)), 1);
    }

    #[test]
    fn empty_text_is_skipped_without_touching_the_page() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, true);

        assert_eq!(run(&s, &sets, tmp.path(), "  \n ").unwrap(), PopulateOutcome::Skipped);
        assert!(s.browser.log().is_empty());
    }

    #[test]
    fn unverified_save_retries_once_through_edit() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, false);
        s.browser.update(s.edit, |e| e.displayed = true);
        // Each save re-shows for the next attempt.
        s.browser.on_click(s.add, Effect::SetDisplayed(s.save, true));
        s.browser.on_click(s.edit, Effect::SetDisplayed(s.save, true));

        let outcome = run(&s, &sets, tmp.path(), SUMMARY).unwrap();

        assert_eq!(
            outcome,
            PopulateOutcome::Saved {
                path: SavePath::Edit,
                verification: Verification::Unconfirmed
            }
        );
        assert_eq!(s.browser.count(&format!("click:{}", s.add)), 1);
        assert_eq!(s.browser.count(&format!("click:{}", s.edit)), 1);
        assert_eq!(s.browser.count(&format!("click:{}", s.save)), 2);
    }

    #[test]
    fn hidden_edit_control_is_script_clicked() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, true);
        s.browser.update(s.add, |e| e.displayed = false);

        let outcome = run(&s, &sets, tmp.path(), SUMMARY).unwrap();

        assert!(matches!(outcome, PopulateOutcome::Saved { path: SavePath::Edit, .. }));
        assert_eq!(s.browser.count(&format!("scroll:{}", s.edit)), 1);
        assert_eq!(s.browser.count(&format!("script-click:{}", s.edit)), 1);
    }

    #[test]
    fn rejected_clear_falls_back_to_select_all_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, true);
        s.browser.update(s.textarea, |e| {
            e.reject_clear = true;
            e.value = "old text".into();
        });

        run(&s, &sets, tmp.path(), SUMMARY).unwrap();

        assert_eq!(s.browser.element(s.textarea).value, SUMMARY);
        assert_eq!(s.browser.count(&format!("keys:{}:Ctrl+A", s.textarea)), 1);
        assert_eq!(s.browser.count(&format!("keys:{}:Delete", s.textarea)), 1);
    }

    #[test]
    fn missing_controls_capture_diagnostics() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, true);
        s.browser.update(s.add, |e| e.enabled = false);
        s.browser.update(s.edit, |e| e.enabled = false);

        let err = run(&s, &sets, tmp.path(), SUMMARY).unwrap_err();

        assert!(matches!(err, AutomationError::ElementNotFound(_)));
        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("family_history-no-add-or-edit-btn_")));
    }

    #[test]
    fn disabled_save_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, true);
        s.browser.update(s.save, |e| e.enabled = false);

        let err = run(&s, &sets, tmp.path(), SUMMARY).unwrap_err();
        assert!(matches!(err, AutomationError::SaveDisabled(_)));
    }

    #[test]
    fn save_without_a_retry_control_stays_successful() {
        let tmp = tempfile::tempdir().unwrap();
        let sets = default_section_selectors();
        let s = family_card(&sets, false);
        s.browser.on_click(s.add, Effect::SetDisplayed(s.add, false));
        s.browser.update(s.edit, |e| e.enabled = false);

        let outcome = run(&s, &sets, tmp.path(), SUMMARY).unwrap();

        assert_eq!(
            outcome,
            PopulateOutcome::Saved {
                path: SavePath::Add,
                verification: Verification::Unconfirmed
            }
        );
        assert_eq!(s.browser.count(&format!("click:{}", s.save)), 1);
    }

    #[test]
    fn verification_text_is_first_line_prefix() {
        assert_eq!(verification_prefix("\n  Tobacco: No\nAlcohol: Yes"), "Tobacco: No");
        assert_eq!(
            verification_prefix("Mother: Age 58; Conditions: Hypertension"),
            "Mother: Age 58; Condition"
        );
        assert_eq!(verification_prefix(""), "");
    }
}
