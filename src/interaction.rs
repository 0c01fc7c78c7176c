//! Interaction primitives over an unreliable, spinner-driven page.
//!
//! Every wait is a bounded poll. Nothing here panics; failures come back as
//! [`AutomationError`] or as a `false` "not observed" result the caller can
//! branch on.

use std::time::{Duration, Instant};

use crate::browser::{
    class_tokens, first_visible, keys, script, Browser, BrowserError, ElementRef, Locator,
    ScriptArg,
};
use crate::config::Timeouts;
use crate::error::AutomationError;
use crate::selectors::{ClassPredicate, PageSelectors};

/// Characters of `outerHTML` kept in click-failure logs.
const SNIPPET_LEN: usize = 1000;

/// Probe `probe` until it returns true or `timeout` elapses. Always probes once.
pub fn poll_until(timeout: Duration, interval: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if probe() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(interval);
    }
}

/// Observable effect a click must produce to count as successful.
#[derive(Debug, Clone)]
pub enum ClickExpectation {
    /// The click call itself not failing is enough.
    Accepted,
    /// Some element matching the locator becomes visible.
    AnyVisible(Locator),
    /// The attribute of `target` differs from its pre-click value.
    AttributeChanges { target: ElementRef, name: String },
}

/// Which rung of the click ladder succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStrategy {
    Native,
    Script,
    Key(&'static str),
}

/// Previous/next controls found around an anchor element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjacentControls {
    pub previous: Option<ElementRef>,
    pub next: Option<ElementRef>,
}

impl AdjacentControls {
    fn complete(&self) -> bool {
        self.previous.is_some() && self.next.is_some()
    }
}

/// Session-bound helper carrying the overlay list and timing knobs.
pub struct Interactor<'a> {
    browser: &'a dyn Browser,
    selectors: &'a PageSelectors,
    timeouts: &'a Timeouts,
}

impl<'a> Interactor<'a> {
    pub fn new(browser: &'a dyn Browser, selectors: &'a PageSelectors, timeouts: &'a Timeouts) -> Self {
        Self {
            browser,
            selectors,
            timeouts,
        }
    }

    pub fn browser(&self) -> &'a dyn Browser {
        self.browser
    }

    pub fn selectors(&self) -> &'a PageSelectors {
        self.selectors
    }

    pub fn timeouts(&self) -> &'a Timeouts {
        self.timeouts
    }

    pub fn poll(&self, timeout: Duration, probe: impl FnMut() -> bool) -> bool {
        poll_until(timeout, self.timeouts.poll_interval(), probe)
    }

    /// Wait until no overlay/spinner is visible. Timing out is not an error.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = self.poll(timeout, || {
            !self
                .selectors
                .overlays
                .iter()
                .any(|loc| matches!(first_visible(self.browser, None, loc), Ok(Some(_))))
        });
        if !idle {
            tracing::debug!(
                timeout_ms = timeout.as_millis() as u64,
                "Overlay still visible, proceeding anyway"
            );
        }
        idle
    }

    /// Default idle wait from settings.
    pub fn settle(&self) -> bool {
        self.wait_idle(Timeouts::ms(self.timeouts.idle_ms))
    }

    /// Poll for the first visible element matching `locator`.
    pub fn wait_visible(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementRef>, AutomationError> {
        let mut found = None;
        let mut lost = None;
        self.poll(timeout, || match first_visible(self.browser, scope, locator) {
            Ok(Some(el)) => {
                found = Some(el);
                true
            }
            Ok(None) => false,
            Err(e) => {
                lost = Some(e);
                true
            }
        });
        if let Some(e) = lost {
            return Err(e.into());
        }
        Ok(found)
    }

    /// Poll for the first element matching `locator`, visible or not.
    pub fn wait_present(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementRef>, AutomationError> {
        let mut found = None;
        let mut lost = None;
        self.poll(timeout, || match self.browser.find_all(locator) {
            Ok(els) if !els.is_empty() => {
                found = els.into_iter().next();
                true
            }
            Ok(_) => false,
            Err(e) if e.is_session_lost() => {
                lost = Some(e);
                true
            }
            Err(_) => false,
        });
        if let Some(e) = lost {
            return Err(e.into());
        }
        Ok(found)
    }

    pub fn scroll_into_view(&self, element: &ElementRef) {
        if let Err(e) = self
            .browser
            .execute_script(script::SCROLL_INTO_VIEW, &[ScriptArg::Element(element.clone())])
        {
            tracing::debug!(error = %e, "scrollIntoView failed");
        }
    }

    pub fn script_click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.browser
            .execute_script(script::CLICK, &[ScriptArg::Element(element.clone())])
            .map(|_| ())
    }

    /// Truncated `outerHTML` for logs; empty when unavailable.
    pub fn outer_html(&self, element: &ElementRef) -> String {
        self.browser
            .execute_script(script::OUTER_HTML, &[ScriptArg::Element(element.clone())])
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .map(|html| html.chars().take(SNIPPET_LEN).collect())
            .unwrap_or_default()
    }

    fn expectation_met(&self, expectation: &ClickExpectation, before: &Option<String>) -> bool {
        let timeout = Timeouts::ms(self.timeouts.click_effect_ms);
        match expectation {
            ClickExpectation::Accepted => true,
            ClickExpectation::AnyVisible(loc) => self.poll(timeout, || {
                matches!(first_visible(self.browser, None, loc), Ok(Some(_)))
            }),
            ClickExpectation::AttributeChanges { target, name } => self.poll(timeout, || {
                self.browser.attribute(target, name).ok().as_ref() != Some(before)
            }),
        }
    }

    /// Click through the strategy ladder: native, script, then (for dropdown
    /// triggers) Space, Enter and ArrowDown. The first rung whose expectation
    /// holds wins.
    pub fn robust_click(
        &self,
        element: &ElementRef,
        expectation: &ClickExpectation,
        dropdown: bool,
    ) -> Result<ClickStrategy, AutomationError> {
        let before = match expectation {
            ClickExpectation::AttributeChanges { target, name } => {
                self.browser.attribute(target, name).ok().flatten()
            }
            _ => None,
        };

        match self.browser.click(element) {
            Ok(()) if self.expectation_met(expectation, &before) => {
                return Ok(ClickStrategy::Native)
            }
            Ok(()) => tracing::debug!("Native click produced no observable effect"),
            Err(BrowserError::StaleElement) => return Err(AutomationError::StaleReference),
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => tracing::debug!(error = %e, "Native click failed"),
        }

        match self.script_click(element) {
            Ok(()) if self.expectation_met(expectation, &before) => {
                return Ok(ClickStrategy::Script)
            }
            Ok(()) => tracing::debug!("Script click produced no observable effect"),
            Err(BrowserError::StaleElement) => return Err(AutomationError::StaleReference),
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => tracing::debug!(error = %e, "Script click failed"),
        }

        if dropdown {
            for key in [keys::SPACE, keys::ENTER, keys::ARROW_DOWN] {
                match self.browser.send_keys(element, key) {
                    Ok(()) if self.expectation_met(expectation, &before) => {
                        return Ok(ClickStrategy::Key(keys::name(key)))
                    }
                    Ok(()) => {}
                    Err(e) if e.is_session_lost() => return Err(e.into()),
                    Err(e) => tracing::debug!(key = keys::name(key), error = %e, "Key press failed"),
                }
            }
        }

        let snippet = self.outer_html(element);
        tracing::warn!(html = %snippet, "Click rejected by every strategy");
        Err(AutomationError::ClickRejected { snippet })
    }

    /// True if the trigger reports `aria-expanded="true"` or the container
    /// carries an open class token (`open`, `is-open`, `*--open`).
    pub fn is_open_state(&self, trigger: Option<&ElementRef>, container: Option<&ElementRef>) -> bool {
        if let Some(trigger) = trigger {
            let expanded = self
                .browser
                .attribute(trigger, "aria-expanded")
                .ok()
                .flatten()
                .unwrap_or_default();
            if expanded.eq_ignore_ascii_case("true") {
                return true;
            }
        }
        container
            .map(|c| {
                class_tokens(self.browser, c)
                    .iter()
                    .any(|t| t == "open" || t == "is-open" || t.ends_with("--open"))
            })
            .unwrap_or(false)
    }

    /// Click every visible close control. Returns how many were dismissed.
    pub fn dismiss_popups(&self) -> usize {
        let mut dismissed = 0;
        for loc in &self.selectors.popup_close {
            let Ok(found) = self.browser.find_all(loc) else {
                continue;
            };
            for el in found {
                if !self.browser.is_displayed(&el).unwrap_or(false) {
                    continue;
                }
                if self.browser.click(&el).is_ok() || self.script_click(&el).is_ok() {
                    dismissed += 1;
                }
            }
        }
        if dismissed > 0 {
            tracing::info!(count = dismissed, "Dismissed popups");
        }
        dismissed
    }

    // ──────────────────────────────────────────────
    // Adjacent control resolution
    // ──────────────────────────────────────────────

    /// Locate the controls flanking `anchor`.
    ///
    /// Strategies, most specific first: descendant search inside the layout
    /// container (`container_xpath`, relative to the anchor), sibling axis,
    /// then a nearest-neighbour scan over the anchor parent's children. Both
    /// flanks prefer the candidate after the anchor in document order.
    pub fn resolve_adjacent_controls(
        &self,
        anchor: &ElementRef,
        anchor_id: &str,
        container_xpath: &str,
        previous: &ClassPredicate,
        next: &ClassPredicate,
    ) -> Result<AdjacentControls, AutomationError> {
        let found = self.adjacent_in_container(anchor, anchor_id, container_xpath, previous, next)?;
        if found.complete() {
            tracing::debug!("Adjacent controls resolved within layout container");
            return Ok(found);
        }

        let mut found = AdjacentControls {
            previous: self.first_in(
                anchor,
                &format!("preceding-sibling::{}[1]", previous.xpath_step()),
            )?,
            next: self.first_in(
                anchor,
                &format!("following-sibling::{}[1]", next.xpath_step()),
            )?,
        };
        if found.complete() {
            tracing::debug!("Adjacent controls resolved on sibling axis");
            return Ok(found);
        }

        let (siblings, index) = self.anchor_siblings(anchor)?;
        if let Some(index) = index {
            if found.previous.is_none() {
                found.previous = self.nearest_matching(&siblings, index, previous);
            }
            if found.next.is_none() {
                found.next = self.nearest_matching(&siblings, index, next);
            }
        }
        Ok(found)
    }

    fn adjacent_in_container(
        &self,
        anchor: &ElementRef,
        anchor_id: &str,
        container_xpath: &str,
        previous: &ClassPredicate,
        next: &ClassPredicate,
    ) -> Result<AdjacentControls, AutomationError> {
        let Some(container) = self.first_in(anchor, container_xpath)? else {
            return Ok(AdjacentControls::default());
        };
        let pick = |pred: &ClassPredicate| -> Result<Option<ElementRef>, AutomationError> {
            let after = format!(
                "(.//{}[preceding::*[@id='{anchor_id}']])[1]",
                pred.xpath_step()
            );
            if let Some(el) = self.first_in(&container, &after)? {
                return Ok(Some(el));
            }
            let before = format!(
                "(.//{}[following::*[@id='{anchor_id}']])[last()]",
                pred.xpath_step()
            );
            self.first_in(&container, &before)
        };
        Ok(AdjacentControls {
            previous: pick(previous)?,
            next: pick(next)?,
        })
    }

    fn first_in(&self, scope: &ElementRef, xpath: &str) -> Result<Option<ElementRef>, AutomationError> {
        match self.browser.find_all_in(scope, &Locator::xpath(xpath)) {
            Ok(found) => Ok(found.into_iter().next()),
            Err(e) if e.is_session_lost() => Err(e.into()),
            Err(BrowserError::StaleElement) => Err(AutomationError::StaleReference),
            Err(_) => Ok(None),
        }
    }

    fn anchor_siblings(
        &self,
        anchor: &ElementRef,
    ) -> Result<(Vec<ElementRef>, Option<usize>), AutomationError> {
        let Some(parent) = self.first_in(anchor, "..")? else {
            return Ok((Vec::new(), None));
        };
        let children = match self.browser.find_all_in(&parent, &Locator::xpath("./*")) {
            Ok(children) => children,
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(_) => Vec::new(),
        };
        let index = children.iter().position(|c| c == anchor);
        Ok((children, index))
    }

    /// Closest sibling matching `pred`, checking the right side first at each distance.
    fn nearest_matching(
        &self,
        siblings: &[ElementRef],
        index: usize,
        pred: &ClassPredicate,
    ) -> Option<ElementRef> {
        let matches = |el: &ElementRef| {
            let class = self.browser.attribute(el, "class").ok().flatten().unwrap_or_default();
            pred.matches(&class)
        };
        for distance in 1..siblings.len() {
            if let Some(el) = siblings.get(index + distance) {
                if matches(el) {
                    return Some(el.clone());
                }
            }
            if let Some(left) = index.checked_sub(distance) {
                if matches(&siblings[left]) {
                    return Some(siblings[left].clone());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{Effect, FakeBrowser, FakeElement};

    fn setup() -> (PageSelectors, Timeouts) {
        (PageSelectors::default(), Timeouts::quick())
    }

    #[test]
    fn poll_until_probes_at_least_once() {
        let mut calls = 0;
        let ok = poll_until(Duration::ZERO, Duration::from_millis(1), || {
            calls += 1;
            false
        });
        assert!(!ok);
        assert_eq!(calls, 1);
    }

    #[test]
    fn poll_until_stops_on_success() {
        let mut calls = 0;
        assert!(poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            calls == 3
        }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn wait_idle_true_without_overlays() {
        let browser = FakeBrowser::new();
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);
        assert!(ui.wait_idle(Duration::from_millis(5)));
    }

    #[test]
    fn wait_idle_times_out_quietly_on_visible_spinner() {
        let browser = FakeBrowser::new();
        let spinner = browser.add(FakeElement::visible());
        browser.register(Locator::css(".spinner-overlay"), &[spinner]);
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);
        assert!(!ui.wait_idle(Duration::from_millis(5)));
    }

    #[test]
    fn native_click_wins_when_accepted() {
        let browser = FakeBrowser::new();
        let button = browser.add(FakeElement::visible());
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        let strategy = ui
            .robust_click(&FakeBrowser::r(button), &ClickExpectation::Accepted, false)
            .unwrap();
        assert_eq!(strategy, ClickStrategy::Native);
        assert_eq!(browser.count("click:"), 1);
    }

    #[test]
    fn intercepted_click_falls_back_to_script() {
        let browser = FakeBrowser::new();
        let button = browser.add(FakeElement::visible());
        browser.update(button, |e| {
            e.click_errors = vec![BrowserError::ClickIntercepted("overlay".into())]
        });
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        let strategy = ui
            .robust_click(&FakeBrowser::r(button), &ClickExpectation::Accepted, false)
            .unwrap();
        assert_eq!(strategy, ClickStrategy::Script);
    }

    #[test]
    fn dropdown_opens_on_arrow_down() {
        let browser = FakeBrowser::new();
        let trigger = browser.add(FakeElement::visible());
        let option = browser.add(FakeElement::hidden());
        let options = Locator::css("[role='option']");
        browser.register(options.clone(), &[option]);
        browser.on_keys(trigger, keys::ARROW_DOWN, Effect::SetDisplayed(option, true));
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        let strategy = ui
            .robust_click(&FakeBrowser::r(trigger), &ClickExpectation::AnyVisible(options), true)
            .unwrap();
        assert_eq!(strategy, ClickStrategy::Key("ArrowDown"));
        assert_eq!(browser.count("keys:"), 3);
    }

    #[test]
    fn attribute_change_expectation_detects_toggle() {
        let browser = FakeBrowser::new();
        let toggle = browser.add(FakeElement::visible().attr("aria-checked", "false"));
        browser.on_click(
            toggle,
            Effect::SetAttr(toggle, "aria-checked".into(), "true".into()),
        );
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);
        let el = FakeBrowser::r(toggle);

        let expectation = ClickExpectation::AttributeChanges {
            target: el.clone(),
            name: "aria-checked".into(),
        };
        assert_eq!(ui.robust_click(&el, &expectation, false).unwrap(), ClickStrategy::Native);
    }

    #[test]
    fn exhausted_ladder_reports_snippet() {
        let browser = FakeBrowser::new();
        let trigger = browser.add(FakeElement::visible().class("composable-select").text("Clinic"));
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        let err = ui
            .robust_click(
                &FakeBrowser::r(trigger),
                &ClickExpectation::AnyVisible(Locator::css("[role='option']")),
                true,
            )
            .unwrap_err();
        match err {
            AutomationError::ClickRejected { snippet } => {
                assert!(snippet.contains("composable-select"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stale_native_click_surfaces_for_reresolution() {
        let browser = FakeBrowser::new();
        let button = browser.add(FakeElement::visible());
        browser.update(button, |e| e.stale_for = 1);
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        let err = ui
            .robust_click(&FakeBrowser::r(button), &ClickExpectation::Accepted, false)
            .unwrap_err();
        assert!(matches!(err, AutomationError::StaleReference));
    }

    #[test]
    fn open_state_from_aria_or_class() {
        let browser = FakeBrowser::new();
        let expanded = browser.add(FakeElement::visible().attr("aria-expanded", "true"));
        let closed = browser.add(FakeElement::visible().attr("aria-expanded", "false"));
        let open_container = browser.add(FakeElement::visible().class("composable-select composable-select--open"));
        let plain_container = browser.add(FakeElement::visible().class("composable-select opener"));
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        assert!(ui.is_open_state(Some(&FakeBrowser::r(expanded)), None));
        assert!(!ui.is_open_state(Some(&FakeBrowser::r(closed)), None));
        assert!(ui.is_open_state(
            Some(&FakeBrowser::r(closed)),
            Some(&FakeBrowser::r(open_container))
        ));
        assert!(!ui.is_open_state(None, Some(&FakeBrowser::r(plain_container))));
    }

    #[test]
    fn dismiss_popups_clicks_only_visible_closers() {
        let browser = FakeBrowser::new();
        let (sel, t) = setup();
        let shown = browser.add(FakeElement::visible());
        let hidden = browser.add(FakeElement::hidden());
        browser.register(sel.popup_close[0].clone(), &[shown, hidden]);
        let ui = Interactor::new(&browser, &sel, &t);

        assert_eq!(ui.dismiss_popups(), 1);
        assert_eq!(browser.count(&format!("click:{shown}")), 1);
    }

    #[test]
    fn adjacent_controls_from_sibling_scan() {
        let browser = FakeBrowser::new();
        let row = browser.add(FakeElement::visible());
        let prev = browser.add_child(row, FakeElement::visible().class("btn btn-sm border--LRn rotate-180"));
        let anchor = browser.add_child(row, FakeElement::visible().attr("id", "date-picker-button"));
        let other = browser.add_child(row, FakeElement::visible().class("btn-lg"));
        let next = browser.add_child(row, FakeElement::visible().class("btn btn-sm"));
        let (sel, t) = setup();
        let ui = Interactor::new(&browser, &sel, &t);

        let found = ui
            .resolve_adjacent_controls(
                &FakeBrowser::r(anchor),
                &sel.date_anchor_id,
                &sel.date_container_xpath,
                &sel.previous_day,
                &sel.next_day,
            )
            .unwrap();
        assert_eq!(found.previous, Some(FakeBrowser::r(prev)));
        assert_eq!(found.next, Some(FakeBrowser::r(next)));
        assert_ne!(found.next, Some(FakeBrowser::r(other)));
    }

    #[test]
    fn adjacent_controls_prefer_layout_container() {
        let browser = FakeBrowser::new();
        let (sel, t) = setup();
        let anchor = browser.add(FakeElement::visible());
        let container = browser.add(FakeElement::visible());
        let prev = browser.add(FakeElement::visible());
        let next = browser.add(FakeElement::visible());
        browser.register_in(anchor, Locator::xpath(sel.date_container_xpath.clone()), &[container]);
        browser.register_in(
            container,
            Locator::xpath(format!(
                "(.//{}[preceding::*[@id='date-picker-button']])[1]",
                sel.previous_day.xpath_step()
            )),
            &[prev],
        );
        browser.register_in(
            container,
            Locator::xpath(format!(
                "(.//{}[preceding::*[@id='date-picker-button']])[1]",
                sel.next_day.xpath_step()
            )),
            &[next],
        );
        let ui = Interactor::new(&browser, &sel, &t);

        let found = ui
            .resolve_adjacent_controls(
                &FakeBrowser::r(anchor),
                &sel.date_anchor_id,
                &sel.date_container_xpath,
                &sel.previous_day,
                &sel.next_day,
            )
            .unwrap();
        assert_eq!(found.previous, Some(FakeBrowser::r(prev)));
        assert_eq!(found.next, Some(FakeBrowser::r(next)));
    }
}
