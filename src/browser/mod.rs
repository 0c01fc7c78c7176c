//! Browser seam: the minimal WebDriver surface the automation needs.
//!
//! Everything above this module talks to `&dyn Browser`; the real session
//! lives in [`webdriver`], tests script a fake.

pub mod keys;
pub mod webdriver;

#[cfg(test)]
pub mod fake;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use webdriver::WebDriverSession;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Stale element reference")]
    StaleElement,

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Element click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("WebDriver timeout: {0}")]
    Timeout(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("WebDriver protocol error ({code}): {message}")]
    Protocol { code: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl BrowserError {
    /// Map a W3C error code (the `value.error` string) to a variant.
    pub fn from_w3c(code: &str, message: &str) -> Self {
        let message = message.to_string();
        match code {
            "no such element" => Self::NoSuchElement(message),
            "stale element reference" => Self::StaleElement,
            "element not interactable" => Self::NotInteractable(message),
            "element click intercepted" => Self::ClickIntercepted(message),
            "javascript error" => Self::Script(message),
            "timeout" | "script timeout" => Self::Timeout(message),
            "invalid session id" | "no such window" => Self::SessionLost(message),
            other => Self::Protocol {
                code: other.to_string(),
                message,
            },
        }
    }

    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}

/// How an element is located.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "using", content = "value", rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
    Id(String),
}

impl Locator {
    pub fn css(value: impl Into<String>) -> Self {
        Self::Css(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::XPath(value.into())
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::Id(value.into())
    }

    /// W3C `using` strategy and value for this locator.
    pub fn to_w3c(&self) -> (&'static str, String) {
        match self {
            Self::Css(v) => ("css selector", v.clone()),
            Self::XPath(v) => ("xpath", v.clone()),
            Self::Id(v) => ("css selector", format!("[id=\"{v}\"]")),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(v) => write!(f, "css={v}"),
            Self::XPath(v) => write!(f, "xpath={v}"),
            Self::Id(v) => write!(f, "id={v}"),
        }
    }
}

/// Opaque handle to a DOM element within the current session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Argument passed to `execute_script`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    Element(ElementRef),
    Text(String),
}

/// Scripts the automation sends through `execute_script`.
pub mod script {
    pub const CLICK: &str = "arguments[0].click();";
    pub const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({block: 'center'});";
    pub const OUTER_HTML: &str = "return arguments[0].outerHTML;";
    pub const NOTIFY_INPUT: &str = "arguments[0].dispatchEvent(new Event('input', {bubbles: true}));\
arguments[0].dispatchEvent(new Event('change', {bubbles: true}));\
arguments[0].blur();";
    pub const SET_VALUE: &str = "arguments[0].value = arguments[1];\
arguments[0].dispatchEvent(new Event('input', {bubbles: true}));\
arguments[0].dispatchEvent(new Event('change', {bubbles: true}));";
}

pub trait Browser {
    fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// All elements matching `locator` in the current document (possibly empty).
    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError>;

    /// All elements matching `locator` below `scope` (XPath is relative to `scope`).
    fn find_all_in(
        &self,
        scope: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError>;

    fn is_displayed(&self, element: &ElementRef) -> Result<bool, BrowserError>;

    fn is_enabled(&self, element: &ElementRef) -> Result<bool, BrowserError>;

    /// Attribute (or reflected property such as `value`), `None` when absent.
    fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError>;

    fn text(&self, element: &ElementRef) -> Result<String, BrowserError>;

    fn click(&self, element: &ElementRef) -> Result<(), BrowserError>;

    fn clear(&self, element: &ElementRef) -> Result<(), BrowserError>;

    fn send_keys(&self, element: &ElementRef, keys: &str) -> Result<(), BrowserError>;

    fn execute_script(
        &self,
        script: &str,
        args: &[ScriptArg],
    ) -> Result<serde_json::Value, BrowserError>;

    fn active_element(&self) -> Result<ElementRef, BrowserError>;

    fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;

    fn page_source(&self) -> Result<String, BrowserError>;

    fn switch_to_default_content(&self) -> Result<(), BrowserError>;
}

// ──────────────────────────────────────────────
// Convenience queries
// ──────────────────────────────────────────────

/// First element matching `locator`, or `None`. Only session loss is an error.
pub fn find_first(
    browser: &dyn Browser,
    locator: &Locator,
) -> Result<Option<ElementRef>, BrowserError> {
    match browser.find_all(locator) {
        Ok(found) => Ok(found.into_iter().next()),
        Err(e) if e.is_session_lost() => Err(e),
        Err(_) => Ok(None),
    }
}

/// First displayed element matching `locator`, optionally below `scope`.
pub fn first_visible(
    browser: &dyn Browser,
    scope: Option<&ElementRef>,
    locator: &Locator,
) -> Result<Option<ElementRef>, BrowserError> {
    let found = match scope {
        Some(scope) => browser.find_all_in(scope, locator),
        None => browser.find_all(locator),
    };
    let found = match found {
        Ok(found) => found,
        Err(e) if e.is_session_lost() => return Err(e),
        Err(_) => return Ok(None),
    };
    for el in found {
        match browser.is_displayed(&el) {
            Ok(true) => return Ok(Some(el)),
            Ok(false) => {}
            Err(e) if e.is_session_lost() => return Err(e),
            Err(_) => {}
        }
    }
    Ok(None)
}

/// Whitespace-separated class tokens of an element (empty on any error).
pub fn class_tokens(browser: &dyn Browser, element: &ElementRef) -> Vec<String> {
    browser
        .attribute(element, "class")
        .ok()
        .flatten()
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
