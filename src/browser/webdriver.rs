use std::path::Path;

use base64::Engine as _;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Browser, BrowserError, ElementRef, Locator, ScriptArg};
use crate::config::WebDriverConfig;

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Blocking W3C WebDriver client bound to one browser session.
pub struct WebDriverSession {
    base_url: String,
    session_id: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct W3cResponse {
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl WebDriverSession {
    /// Open a new session on a running driver (`msedgedriver`, `chromedriver`, ...).
    pub fn start(config: &WebDriverConfig, download_dir: &Path) -> Result<Self, BrowserError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BrowserError::Http(e.to_string()))?;

        let mut session = Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            session_id: String::new(),
            client,
            timeout_secs: config.request_timeout_secs,
        };

        let capabilities = build_capabilities(config, download_dir);
        let value = session.send(Method::POST, "/session", Some(capabilities))?;
        let created: NewSessionValue = serde_json::from_value(value)
            .map_err(|e| BrowserError::Http(format!("Unexpected new-session response: {e}")))?;
        session.session_id = created.session_id;

        tracing::info!(
            driver = %session.base_url,
            session_id = %session.session_id,
            browser = %config.browser_name,
            "WebDriver session started"
        );
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// End the session and close the browser window.
    pub fn quit(self) -> Result<(), BrowserError> {
        let path = format!("/session/{}", self.session_id);
        self.send(Method::DELETE, &path, None)?;
        tracing::info!(session_id = %self.session_id, "WebDriver session closed");
        Ok(())
    }

    fn session_path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }

    fn element_path(&self, element: &ElementRef, suffix: &str) -> String {
        format!("/session/{}/element/{}{}", self.session_id, element.0, suffix)
    }

    fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                BrowserError::SessionLost(format!("Cannot reach WebDriver at {}", self.base_url))
            } else if e.is_timeout() {
                BrowserError::Timeout(format!("Request timed out after {}s", self.timeout_secs))
            } else {
                BrowserError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        let parsed: Option<W3cResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let (code, message) = parsed
                .as_ref()
                .map(|r| {
                    (
                        r.value.get("error").and_then(Value::as_str).unwrap_or(""),
                        r.value.get("message").and_then(Value::as_str).unwrap_or(""),
                    )
                })
                .unwrap_or(("", ""));
            if code.is_empty() {
                return Err(BrowserError::Http(format!("HTTP {}: {}", status.as_u16(), body)));
            }
            return Err(BrowserError::from_w3c(code, message));
        }

        parsed
            .map(|r| r.value)
            .ok_or_else(|| BrowserError::Http(format!("Malformed WebDriver response: {body}")))
    }

    fn elements_from(value: Value) -> Result<Vec<ElementRef>, BrowserError> {
        match value {
            Value::Array(items) => items.iter().map(element_from).collect(),
            other => Err(BrowserError::Http(format!("Expected element list, got {other}"))),
        }
    }
}

fn element_from(value: &Value) -> Result<ElementRef, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| BrowserError::Http(format!("Expected web element, got {value}")))
}

fn script_arg_json(arg: &ScriptArg) -> Value {
    match arg {
        ScriptArg::Element(el) => json!({ ELEMENT_KEY: el.0 }),
        ScriptArg::Text(t) => Value::String(t.clone()),
    }
}

fn build_capabilities(config: &WebDriverConfig, download_dir: &Path) -> Value {
    let mut args = config.args.clone();
    if config.headless && !args.iter().any(|a| a.starts_with("--headless")) {
        args.push("--headless=new".to_string());
    }
    let options = json!({
        "args": args,
        "prefs": {
            "download.default_directory": download_dir.display().to_string(),
            "download.prompt_for_download": false,
            "plugins.always_open_pdf_externally": true,
        },
    });
    let options_key = match config.browser_name.to_ascii_lowercase().as_str() {
        "chrome" | "chromium" => "goog:chromeOptions",
        _ => "ms:edgeOptions",
    };

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": config.browser_name,
                options_key: options,
            }
        }
    })
}

impl Browser for WebDriverSession {
    fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.send(Method::POST, &self.session_path("/url"), Some(json!({ "url": url })))?;
        Ok(())
    }

    fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, BrowserError> {
        let (using, value) = locator.to_w3c();
        let body = json!({ "using": using, "value": value });
        let found = self.send(Method::POST, &self.session_path("/elements"), Some(body))?;
        Self::elements_from(found)
    }

    fn find_all_in(
        &self,
        scope: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let (using, value) = locator.to_w3c();
        let body = json!({ "using": using, "value": value });
        let found = self.send(Method::POST, &self.element_path(scope, "/elements"), Some(body))?;
        Self::elements_from(found)
    }

    fn is_displayed(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        let value = self.send(Method::GET, &self.element_path(element, "/displayed"), None)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn is_enabled(&self, element: &ElementRef) -> Result<bool, BrowserError> {
        let value = self.send(Method::GET, &self.element_path(element, "/enabled"), None)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, BrowserError> {
        let path = self.element_path(element, &format!("/attribute/{name}"));
        let value = self.send(Method::GET, &path, None)?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        let value = self.send(Method::GET, &self.element_path(element, "/text"), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.send(Method::POST, &self.element_path(element, "/click"), Some(json!({})))?;
        Ok(())
    }

    fn clear(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.send(Method::POST, &self.element_path(element, "/clear"), Some(json!({})))?;
        Ok(())
    }

    fn send_keys(&self, element: &ElementRef, keys: &str) -> Result<(), BrowserError> {
        let body = json!({ "text": keys });
        self.send(Method::POST, &self.element_path(element, "/value"), Some(body))?;
        Ok(())
    }

    fn execute_script(
        &self,
        script: &str,
        args: &[ScriptArg],
    ) -> Result<Value, BrowserError> {
        let args: Vec<Value> = args.iter().map(script_arg_json).collect();
        let body = json!({ "script": script, "args": args });
        self.send(Method::POST, &self.session_path("/execute/sync"), Some(body))
    }

    fn active_element(&self) -> Result<ElementRef, BrowserError> {
        let value = self.send(Method::GET, &self.session_path("/element/active"), None)?;
        element_from(&value)
    }

    fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        let value = self.send(Method::GET, &self.session_path("/screenshot"), None)?;
        let encoded = value.as_str().unwrap_or_default();
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::Http(format!("Screenshot decode failed: {e}")))
    }

    fn page_source(&self) -> Result<String, BrowserError> {
        let value = self.send(Method::GET, &self.session_path("/source"), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn switch_to_default_content(&self) -> Result<(), BrowserError> {
        self.send(Method::POST, &self.session_path("/frame"), Some(json!({ "id": null })))?;
        Ok(())
    }
}
