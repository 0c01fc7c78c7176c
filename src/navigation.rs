//! Scheduler navigation: schedule → filter → tab → date, plus the facility dropdown.
//!
//! Every step degrades to skip-and-continue. Missing controls are logged and
//! treated as already satisfied; only a lost session is returned as an error.

use std::time::Duration;

use crate::browser::{class_tokens, find_first, keys, ElementRef, Locator};
use crate::config::Timeouts;
use crate::error::AutomationError;
use crate::interaction::{ClickExpectation, Interactor};

/// Upper bound on a single facility-dropdown lookup.
const FACILITY_LOOKUP_MS: u64 = 4_000;

const FACILITY_SELECT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NavState {
    Idle,
    ScheduleOpened,
    FilterEnsured,
    TabSelected,
    DateShifted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    AlreadySatisfied,
    Skipped,
}

pub struct Navigator<'a> {
    ui: &'a Interactor<'a>,
    state: NavState,
}

impl<'a> Navigator<'a> {
    pub fn new(ui: &'a Interactor<'a>) -> Self {
        Self {
            ui,
            state: NavState::Idle,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    fn element_timeout(&self) -> Duration {
        Timeouts::ms(self.ui.timeouts().element_ms)
    }

    /// Click, isolating non-fatal failures as `Skipped`.
    fn click_step(&self, element: &ElementRef, step: &'static str) -> Result<StepOutcome, AutomationError> {
        match self.ui.robust_click(element, &ClickExpectation::Accepted, false) {
            Ok(strategy) => {
                tracing::debug!(step, ?strategy, "Clicked");
                Ok(StepOutcome::Done)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(step, error = %e, "Click failed, skipping step");
                Ok(StepOutcome::Skipped)
            }
        }
    }

    // ──────────────────────────────────────────────
    // Scheduler steps
    // ──────────────────────────────────────────────

    pub fn open_schedule(&mut self) -> Result<StepOutcome, AutomationError> {
        let browser = self.ui.browser();
        if let Err(e) = browser.switch_to_default_content() {
            if e.is_session_lost() {
                return Err(e.into());
            }
            tracing::debug!(error = %e, "Could not switch to default content");
        }

        let link = self.ui.selectors().schedule_link.clone();
        let outcome = match self.ui.wait_visible(None, &link, self.element_timeout())? {
            Some(el) => {
                let outcome = self.click_step(&el, "schedule")?;
                self.ui.settle();
                outcome
            }
            None => {
                tracing::info!(locator = %link, "Schedule link not found, assuming schedule is open");
                StepOutcome::AlreadySatisfied
            }
        };
        self.state = NavState::ScheduleOpened;
        tracing::info!(?outcome, "Schedule step finished");
        Ok(outcome)
    }

    /// Make sure the filter toggle reports `aria-checked="true"`.
    pub fn ensure_filter(&mut self) -> Result<StepOutcome, AutomationError> {
        let locator = self.ui.selectors().filter_toggle.clone();
        let outcome = self.ensure_filter_inner(&locator)?;
        self.state = NavState::FilterEnsured;
        Ok(outcome)
    }

    fn ensure_filter_inner(&self, locator: &Locator) -> Result<StepOutcome, AutomationError> {
        let browser = self.ui.browser();
        let Some(toggle) = self.ui.wait_present(locator, self.element_timeout())? else {
            tracing::info!(locator = %locator, "Filter toggle not found, skipping");
            return Ok(StepOutcome::AlreadySatisfied);
        };
        self.ui.scroll_into_view(&toggle);

        let checked = |el: &ElementRef| {
            browser
                .attribute(el, "aria-checked")
                .ok()
                .flatten()
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        };
        if checked(&toggle) {
            tracing::info!("Filter already checked");
            return Ok(StepOutcome::AlreadySatisfied);
        }

        let outcome = self.click_step(&toggle, "filter")?;
        if outcome == StepOutcome::Skipped {
            return Ok(outcome);
        }

        // The toggle is re-rendered on change; look it up fresh each probe.
        let confirmed = self.ui.poll(Timeouts::ms(self.ui.timeouts().filter_confirm_ms), || {
            matches!(find_first(browser, locator), Ok(Some(el)) if checked(&el))
        });
        if confirmed {
            tracing::info!("Filter checked");
        } else {
            tracing::warn!("Filter click did not confirm aria-checked=true");
        }
        Ok(outcome)
    }

    /// Make sure the Appointments tab carries the `active` class token.
    pub fn ensure_appointments_tab(&mut self) -> Result<StepOutcome, AutomationError> {
        let locator = self.ui.selectors().appointments_tab.clone();
        let outcome = match self.ui.wait_present(&locator, self.element_timeout())? {
            None => {
                tracing::info!(locator = %locator, "Appointments tab not found, continuing");
                StepOutcome::AlreadySatisfied
            }
            Some(tab) if class_tokens(self.ui.browser(), &tab).iter().any(|t| t == "active") => {
                tracing::info!("Appointments tab already active");
                StepOutcome::AlreadySatisfied
            }
            Some(tab) => {
                self.ui.scroll_into_view(&tab);
                let outcome = self.click_step(&tab, "appointments-tab")?;
                self.ui.settle();
                outcome
            }
        };
        self.state = NavState::TabSelected;
        Ok(outcome)
    }

    /// Move the scheduler date by `offset` days with the buttons flanking the
    /// date picker, re-resolving them before every click.
    pub fn shift_date(&mut self, offset: i64) -> Result<StepOutcome, AutomationError> {
        let outcome = self.shift_date_inner(offset)?;
        self.state = NavState::DateShifted;
        Ok(outcome)
    }

    fn shift_date_inner(&self, offset: i64) -> Result<StepOutcome, AutomationError> {
        if offset == 0 {
            tracing::info!("Date offset is 0, nothing to shift");
            return Ok(StepOutcome::AlreadySatisfied);
        }
        self.ui.settle();

        let anchor_locator = Locator::id(self.ui.selectors().date_anchor_id.clone());
        let Some(anchor) = self.ui.wait_present(&anchor_locator, self.element_timeout())? else {
            tracing::warn!(locator = %anchor_locator, "Date picker not present, skipping date shift");
            return Ok(StepOutcome::Skipped);
        };
        self.ui.scroll_into_view(&anchor);

        let forward = offset > 0;
        let steps = offset.unsigned_abs();
        let direction = if forward { "next" } else { "previous" };
        tracing::info!(offset, steps, direction, "Shifting date");

        let retry_delay = Timeouts::ms(self.ui.timeouts().stale_retry_delay_ms);
        let mut clicked = 0;
        'steps: for step in 1..=steps {
            let mut retried = false;
            loop {
                match self.click_day_button(&anchor_locator, forward) {
                    Ok(true) => {
                        clicked += 1;
                        break;
                    }
                    Ok(false) => {
                        tracing::warn!(step, steps, direction, "Day button not found, stopping");
                        break 'steps;
                    }
                    Err(AutomationError::StaleReference) if !retried => {
                        retried = true;
                        std::thread::sleep(retry_delay);
                    }
                    Err(AutomationError::StaleReference) => {
                        tracing::warn!(step, steps, "Day button stayed stale, step abandoned");
                        break;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!(step, steps, error = %e, "Day button click failed, step abandoned");
                        break;
                    }
                }
            }
        }

        self.ui.settle();
        tracing::info!(offset, clicked, "Date shift complete");
        Ok(if clicked == steps {
            StepOutcome::Done
        } else {
            StepOutcome::Skipped
        })
    }

    /// Resolve the flanking controls afresh and click the one for `forward`.
    fn click_day_button(&self, anchor_locator: &Locator, forward: bool) -> Result<bool, AutomationError> {
        let selectors = self.ui.selectors();
        let Some(anchor) = find_first(self.ui.browser(), anchor_locator)? else {
            return Ok(false);
        };
        let controls = self.ui.resolve_adjacent_controls(
            &anchor,
            &selectors.date_anchor_id,
            &selectors.date_container_xpath,
            &selectors.previous_day,
            &selectors.next_day,
        )?;
        let target = if forward { controls.next } else { controls.previous };
        let Some(target) = target else {
            return Ok(false);
        };
        self.ui.scroll_into_view(&target);
        self.ui
            .robust_click(&target, &ClickExpectation::Accepted, false)
            .map(|_| true)
    }

    // ──────────────────────────────────────────────
    // Facility dropdown
    // ──────────────────────────────────────────────

    fn lookup_timeout(&self) -> Duration {
        Timeouts::ms(self.ui.timeouts().element_ms.min(FACILITY_LOOKUP_MS))
    }

    fn options_visible(&self) -> bool {
        !self.visible_options().unwrap_or_default().is_empty()
    }

    fn visible_options(&self) -> Result<Vec<(ElementRef, String)>, AutomationError> {
        let browser = self.ui.browser();
        let found = match browser.find_all(&self.ui.selectors().facility.options) {
            Ok(found) => found,
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(_) => Vec::new(),
        };
        Ok(found
            .into_iter()
            .filter(|el| browser.is_displayed(el).unwrap_or(false))
            .map(|el| {
                let label = browser.text(&el).map(|t| t.trim().to_string()).unwrap_or_default();
                (el, label)
            })
            .collect())
    }

    /// Open the facility dropdown and verify it opened (options visible or
    /// open state reported).
    pub fn open_facility_dropdown(&self) -> Result<bool, AutomationError> {
        let browser = self.ui.browser();
        let fs = &self.ui.selectors().facility;
        let container = find_first(browser, &fs.container)?;
        let trigger = self.ui.wait_present(&fs.trigger, self.lookup_timeout())?;

        let mut candidates: Vec<ElementRef> = trigger.iter().cloned().collect();
        for loc in &fs.fallback_triggers {
            let found = match &container {
                Some(c) => browser.find_all_in(c, loc),
                None => browser.find_all(loc),
            };
            match found {
                Ok(found) => {
                    for el in found {
                        if !candidates.contains(&el) {
                            candidates.push(el);
                        }
                    }
                }
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(_) => {}
            }
        }
        if let Some(c) = &container {
            if !candidates.contains(c) {
                candidates.push(c.clone());
            }
        }
        let Some(primary) = candidates.first().cloned() else {
            tracing::info!("No facility dropdown trigger found");
            return Ok(false);
        };

        let is_open = || self.options_visible() || self.ui.is_open_state(trigger.as_ref(), container.as_ref());

        self.ui.scroll_into_view(&primary);
        match self.ui.robust_click(
            &primary,
            &ClickExpectation::AnyVisible(fs.options.clone()),
            true,
        ) {
            Ok(strategy) => {
                tracing::info!(?strategy, "Facility dropdown opened");
                return Ok(true);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) if is_open() => {
                tracing::info!("Facility dropdown reports open state");
                return Ok(true);
            }
            Err(e) => tracing::debug!(error = %e, "Primary facility trigger did not open"),
        }

        let selection = find_first(browser, &fs.selection_text)?;
        for candidate in selection.iter().chain(candidates.iter().skip(1)) {
            self.ui.scroll_into_view(candidate);
            if browser.click(candidate).is_err() {
                let _ = self.ui.script_click(candidate);
            }
            if self.ui.poll(Timeouts::ms(self.ui.timeouts().click_effect_ms), &is_open) {
                tracing::info!("Facility dropdown opened via fallback trigger");
                return Ok(true);
            }
        }

        tracing::info!(
            candidates = candidates.len(),
            html = %self.ui.outer_html(&primary),
            "Facility dropdown did not open"
        );
        Ok(false)
    }

    /// Visible options of the open dropdown, with their labels. Options may be
    /// rendered in a body-level portal, so the whole page is searched.
    pub fn facility_options(&self) -> Result<Vec<(ElementRef, String)>, AutomationError> {
        let options = self.visible_options()?;
        if !options.is_empty() {
            return Ok(options);
        }
        let listbox = &self.ui.selectors().facility.listbox;
        if self.ui.wait_present(listbox, self.lookup_timeout())?.is_some() {
            return self.visible_options();
        }
        Ok(options)
    }

    fn current_facility(&self) -> String {
        let browser = self.ui.browser();
        find_first(browser, &self.ui.selectors().facility.selection_text)
            .ok()
            .flatten()
            .and_then(|el| browser.text(&el).ok())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }

    fn close_dropdown(&self) {
        let browser = self.ui.browser();
        if let Ok(active) = browser.active_element() {
            let _ = browser.send_keys(&active, keys::ESCAPE);
        }
    }

    /// Select the facility labelled `name` (exact match first, then substring,
    /// case-insensitive) and confirm the selection text reflects it.
    pub fn select_facility(&self, name: &str) -> Result<bool, AutomationError> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(false);
        }

        for attempt in 1..=FACILITY_SELECT_ATTEMPTS {
            if !self.open_facility_dropdown()? {
                tracing::info!(attempt, "Facility dropdown did not open");
                continue;
            }
            let options = self.facility_options()?;
            if options.is_empty() {
                tracing::info!(attempt, "No facility options visible");
                continue;
            }

            let target = options
                .iter()
                .find(|(_, label)| label.to_lowercase() == wanted)
                .or_else(|| options.iter().find(|(_, label)| label.to_lowercase().contains(&wanted)));
            let Some((option, label)) = target else {
                let available: Vec<&str> = options.iter().map(|(_, l)| l.as_str()).collect();
                tracing::info!(facility = name, ?available, "Facility option not found");
                self.close_dropdown();
                continue;
            };

            self.ui.scroll_into_view(option);
            match self.ui.robust_click(option, &ClickExpectation::Accepted, false) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::info!(facility = %label, error = %e, "Facility option click failed");
                    return Ok(false);
                }
            }

            let confirmed = self.ui.poll(Timeouts::ms(self.ui.timeouts().facility_confirm_ms), || {
                self.current_facility().to_lowercase().contains(&wanted)
            });
            if confirmed {
                tracing::info!(facility = %label, "Facility selected");
            } else {
                tracing::info!(
                    facility = name,
                    current = %self.current_facility(),
                    "Facility selection not reflected"
                );
            }
            return Ok(confirmed);
        }
        Ok(false)
    }

    /// Labels of facilities whose name contains `keyword` (case-insensitive),
    /// de-duplicated in display order. An empty keyword lists everything.
    pub fn facilities_matching(&self, keyword: &str) -> Result<Vec<String>, AutomationError> {
        if !self.open_facility_dropdown()? {
            return Ok(Vec::new());
        }
        let keyword = keyword.trim().to_lowercase();
        let mut labels: Vec<String> = Vec::new();
        for (_, label) in self.facility_options()? {
            if !label.is_empty() && label.to_lowercase().contains(&keyword) && !labels.contains(&label) {
                labels.push(label);
            }
        }
        self.close_dropdown();
        Ok(labels)
    }
}
