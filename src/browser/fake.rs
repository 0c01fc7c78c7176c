//! Scriptable in-memory browser for tests.
//!
//! Elements live in an arena; locators resolve through an explicit query
//! table. Clicks, keys and navigation can trigger [`Effect`]s that mutate the
//! page, which is enough to model dropdowns opening, save buttons hiding and
//! downloads landing on disk.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{keys, script, Browser, BrowserError, ElementRef, Locator, ScriptArg};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub displayed: bool,
    pub enabled: bool,
    pub attrs: HashMap<String, String>,
    pub text: String,
    pub value: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Errors returned by successive native clicks before one succeeds.
    pub click_errors: Vec<BrowserError>,
    pub script_click_blocked: bool,
    pub reject_clear: bool,
    pub reveal_on_scroll: bool,
    /// Number of upcoming operations that fail with a stale reference.
    pub stale_for: u32,
    pub on_click: Vec<Effect>,
    pub on_input: Vec<Effect>,
    pub on_keys: Vec<(String, Vec<Effect>)>,
    selected_all: bool,
}

impl FakeElement {
    pub fn visible() -> Self {
        Self {
            displayed: true,
            enabled: true,
            ..Self::default()
        }
    }

    pub fn hidden() -> Self {
        Self {
            displayed: false,
            enabled: true,
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn class(self, value: &str) -> Self {
        self.attr("class", value)
    }

    pub fn text(mut self, value: &str) -> Self {
        self.text = value.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Effect {
    SetAttr(usize, String, String),
    SetDisplayed(usize, bool),
    SetEnabled(usize, bool),
    SetText(usize, String),
    CopyValueToText { from: usize, to: usize },
    SetQuery {
        scope: Option<usize>,
        locator: Locator,
        ids: Vec<usize>,
    },
    WriteFile(PathBuf, Vec<u8>),
}

#[derive(Default)]
struct State {
    elements: Vec<FakeElement>,
    queries: HashMap<(Option<usize>, Locator), Vec<usize>>,
    on_goto: Vec<(String, Vec<Effect>)>,
    active: Option<usize>,
    log: Vec<String>,
}

impl State {
    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SetAttr(id, name, value) => {
                    self.elements[id].attrs.insert(name, value);
                }
                Effect::SetDisplayed(id, on) => self.elements[id].displayed = on,
                Effect::SetEnabled(id, on) => self.elements[id].enabled = on,
                Effect::SetText(id, text) => self.elements[id].text = text,
                Effect::CopyValueToText { from, to } => {
                    self.elements[to].text = self.elements[from].value.clone();
                }
                Effect::SetQuery { scope, locator, ids } => {
                    self.queries.insert((scope, locator), ids);
                }
                Effect::WriteFile(path, bytes) => {
                    std::fs::write(&path, bytes).unwrap();
                }
            }
        }
    }

    fn index(&mut self, element: &ElementRef) -> Result<usize, BrowserError> {
        let idx: usize = element
            .0
            .trim_start_matches('e')
            .parse()
            .map_err(|_| BrowserError::StaleElement)?;
        let el = self.elements.get_mut(idx).ok_or(BrowserError::StaleElement)?;
        if el.stale_for > 0 {
            el.stale_for -= 1;
            return Err(BrowserError::StaleElement);
        }
        Ok(idx)
    }

    fn click(&mut self, idx: usize, via: &str) {
        self.log.push(format!("{via}:{idx}"));
        self.active = Some(idx);
        let effects = self.elements[idx].on_click.clone();
        self.apply(effects);
    }
}

#[derive(Default)]
pub struct FakeBrowser {
    state: RefCell<State>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, element: FakeElement) -> usize {
        let mut s = self.state.borrow_mut();
        s.elements.push(element);
        s.elements.len() - 1
    }

    pub fn add_child(&self, parent: usize, mut element: FakeElement) -> usize {
        element.parent = Some(parent);
        let id = self.add(element);
        self.state.borrow_mut().elements[parent].children.push(id);
        id
    }

    pub fn r(id: usize) -> ElementRef {
        ElementRef(format!("e{id}"))
    }

    pub fn register(&self, locator: Locator, ids: &[usize]) {
        self.state
            .borrow_mut()
            .queries
            .insert((None, locator), ids.to_vec());
    }

    pub fn register_in(&self, scope: usize, locator: Locator, ids: &[usize]) {
        self.state
            .borrow_mut()
            .queries
            .insert((Some(scope), locator), ids.to_vec());
    }

    pub fn on_click(&self, id: usize, effect: Effect) {
        self.state.borrow_mut().elements[id].on_click.push(effect);
    }

    pub fn on_input(&self, id: usize, effect: Effect) {
        self.state.borrow_mut().elements[id].on_input.push(effect);
    }

    pub fn on_keys(&self, id: usize, key: &str, effect: Effect) {
        self.state.borrow_mut().elements[id]
            .on_keys
            .push((key.to_string(), vec![effect]));
    }

    pub fn on_goto(&self, url_part: &str, effect: Effect) {
        self.state
            .borrow_mut()
            .on_goto
            .push((url_part.to_string(), vec![effect]));
    }

    pub fn update(&self, id: usize, f: impl FnOnce(&mut FakeElement)) {
        f(&mut self.state.borrow_mut().elements[id]);
    }

    pub fn element(&self, id: usize) -> FakeElement {
        self.state.borrow().elements[id].clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Number of log entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .log
            .iter()
            .filter(|l| l.starts_with(prefix))
            .count()
    }
}

fn is_key_code(keys: &str) -> bool {
    keys.chars().any(|c| ('\u{E000}'..='\u{F8FF}').contains(&c))
}

impl Browser for FakeBrowser {
    fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut s = self.state.borrow_mut();
        s.log.push(format!("goto:{url}"));
        let effects: Vec<Effect> = s
            .on_goto
            .iter()
            .filter(|(part, _)| url.contains(part.as_str()))
            .flat_map(|(_, e)| e.clone())
            .collect();
        s.apply(effects);
        Ok(())
    }

    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
        let s = self.state.borrow();
        Ok(s.queries
            .get(&(None, locator.clone()))
            .map(|ids| ids.iter().map(|i| Self::r(*i)).collect())
            .unwrap_or_default())
    }

    fn find_all_in(
        &self,
        scope: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(scope)?;
        let ids = match locator {
            Locator::XPath(x) if x == ".." => s.elements[idx].parent.into_iter().collect(),
            Locator::XPath(x) if x == "./*" => s.elements[idx].children.clone(),
            _ => s
                .queries
                .get(&(Some(idx), locator.clone()))
                .cloned()
                .unwrap_or_default(),
        };
        Ok(ids.into_iter().map(Self::r).collect())
    }

    fn is_displayed(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        Ok(s.elements[idx].displayed)
    }

    fn is_enabled(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        Ok(s.elements[idx].enabled)
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        let el = &s.elements[idx];
        if name == "value" {
            return Ok(Some(el.value.clone()));
        }
        Ok(el.attrs.get(name).cloned())
    }

    fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        Ok(s.elements[idx].text.clone())
    }

    fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        if !s.elements[idx].click_errors.is_empty() {
            let err = s.elements[idx].click_errors.remove(0);
            s.log.push(format!("click-failed:{idx}"));
            return Err(err);
        }
        if !s.elements[idx].displayed {
            return Err(BrowserError::NotInteractable(format!("e{idx} is hidden")));
        }
        s.click(idx, "click");
        Ok(())
    }

    fn clear(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        if s.elements[idx].reject_clear {
            return Err(BrowserError::NotInteractable("clear rejected".into()));
        }
        s.elements[idx].value.clear();
        s.log.push(format!("clear:{idx}"));
        Ok(())
    }

    fn send_keys(&self, element: &ElementRef, keys: &str) -> Result<(), BrowserError> {
        let mut s = self.state.borrow_mut();
        let idx = s.index(element)?;
        s.log.push(format!("keys:{idx}:{}", keys::name(keys)));
        s.active = Some(idx);
        match keys {
            keys::SELECT_ALL => s.elements[idx].selected_all = true,
            keys::DELETE if s.elements[idx].selected_all => {
                s.elements[idx].value.clear();
                s.elements[idx].selected_all = false;
            }
            k if !is_key_code(k) => s.elements[idx].value.push_str(k),
            _ => {}
        }
        let effects: Vec<Effect> = s.elements[idx]
            .on_keys
            .iter()
            .filter(|(k, _)| k == keys)
            .flat_map(|(_, e)| e.clone())
            .collect();
        s.apply(effects);
        Ok(())
    }

    fn execute_script(
        &self,
        source: &str,
        args: &[ScriptArg],
    ) -> Result<serde_json::Value, BrowserError> {
        let mut s = self.state.borrow_mut();
        let target = match args.first() {
            Some(ScriptArg::Element(el)) => Some(s.index(el)?),
            _ => None,
        };
        let Some(idx) = target else {
            return Ok(serde_json::Value::Null);
        };

        match source {
            script::CLICK => {
                if s.elements[idx].script_click_blocked {
                    s.log.push(format!("script-click-failed:{idx}"));
                    return Err(BrowserError::Script("click blocked".into()));
                }
                s.click(idx, "script-click");
            }
            script::SCROLL_INTO_VIEW => {
                s.log.push(format!("scroll:{idx}"));
                if s.elements[idx].reveal_on_scroll {
                    s.elements[idx].displayed = true;
                }
            }
            script::OUTER_HTML => {
                let el = &s.elements[idx];
                let class = el.attrs.get("class").cloned().unwrap_or_default();
                return Ok(serde_json::Value::String(format!(
                    "<div class=\"{class}\">{}</div>",
                    el.text
                )));
            }
            script::NOTIFY_INPUT => {
                s.log.push(format!("notify:{idx}"));
                let effects = s.elements[idx].on_input.clone();
                s.apply(effects);
            }
            script::SET_VALUE => {
                if let Some(ScriptArg::Text(t)) = args.get(1) {
                    s.elements[idx].value = t.clone();
                }
                s.log.push(format!("set-value:{idx}"));
                let effects = s.elements[idx].on_input.clone();
                s.apply(effects);
            }
            _ => {}
        }
        Ok(serde_json::Value::Null)
    }

    fn active_element(&self) -> Result<ElementRef, BrowserError> {
        self.state
            .borrow()
            .active
            .map(Self::r)
            .ok_or_else(|| BrowserError::NoSuchElement("no active element".into()))
    }

    fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG fake".to_vec())
    }

    fn page_source(&self) -> Result<String, BrowserError> {
        Ok("<html><body>fake</body></html>".to_string())
    }

    fn switch_to_default_content(&self) -> Result<(), BrowserError> {
        self.state.borrow_mut().log.push("default-content".into());
        Ok(())
    }
}
