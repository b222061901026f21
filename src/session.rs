use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::config;
use crate::delay;

/// W3C element identifier key in wire responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Opaque handle to a located element, valid while the page it came from
/// is still loaded.
#[derive(Debug, Clone)]
pub struct ElementRef(String);

/// One authenticated browsing session, speaking the W3C WebDriver wire
/// protocol to a locally running chromedriver. Everything above this
/// module sees only navigate / find / wait / execute / screenshot.
pub struct Session {
    http: Client,
    base: String,
    session_id: String,
}

impl Session {
    pub fn new(webdriver_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build WebDriver HTTP client")?;

        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--start-maximized", "--disable-notifications"]
                    }
                }
            }
        });

        let resp: Value = http
            .post(format!("{}/session", webdriver_url))
            .json(&caps)
            .send()
            .context("failed to reach WebDriver; is chromedriver running?")?
            .json()
            .context("invalid session-create response")?;

        let session_id = resp["value"]["sessionId"]
            .as_str()
            .map(str::to_string)
            .context("WebDriver did not return a session id")?;

        info!("Browser session established ({})", session_id);
        Ok(Session { http, base: webdriver_url.to_string(), session_id })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base, self.session_id, path)
    }

    /// POST a command and unwrap the W3C `value` envelope.
    fn post(&self, path: &str, body: Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .with_context(|| format!("WebDriver POST {} failed", path))?;
        let status = resp.status();
        let payload: Value = resp.json().context("non-JSON WebDriver response")?;
        Self::unwrap_value(path, status.is_success(), payload)
    }

    fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .with_context(|| format!("WebDriver GET {} failed", path))?;
        let status = resp.status();
        let payload: Value = resp.json().context("non-JSON WebDriver response")?;
        Self::unwrap_value(path, status.is_success(), payload)
    }

    fn unwrap_value(path: &str, ok: bool, payload: Value) -> Result<Value> {
        if !ok {
            let err = payload["value"]["error"].as_str().unwrap_or("unknown");
            let msg = payload["value"]["message"].as_str().unwrap_or("");
            bail!("WebDriver error on {}: {}: {}", path, err, msg);
        }
        Ok(payload["value"].clone())
    }

    // ── Primitives ──────────────────────────────────────────────────────

    pub fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    pub fn find_element(&self, selector: &str) -> Result<ElementRef> {
        let v = self.post("/element", json!({ "using": "css selector", "value": selector }))?;
        element_from(&v).with_context(|| format!("no element for selector {:?}", selector))
    }

    /// Like `find_element`, but "no such element" is a normal outcome.
    pub fn find_optional(&self, selector: &str) -> Option<ElementRef> {
        match self.post("/element", json!({ "using": "css selector", "value": selector })) {
            Ok(v) => element_from(&v),
            Err(e) if e.to_string().contains("no such element") => None,
            Err(e) => {
                debug!("Lookup of {:?} failed: {}", selector, e);
                None
            }
        }
    }

    pub fn find_elements(&self, selector: &str) -> Vec<ElementRef> {
        match self.post("/elements", json!({ "using": "css selector", "value": selector })) {
            Ok(Value::Array(items)) => items.iter().filter_map(element_from).collect(),
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!("Lookup of all {:?} failed: {}", selector, e);
                Vec::new()
            }
        }
    }

    /// Find a descendant of `parent`, or None.
    pub fn find_in(&self, parent: &ElementRef, selector: &str) -> Option<ElementRef> {
        let path = format!("/element/{}/element", parent.0);
        match self.post(&path, json!({ "using": "css selector", "value": selector })) {
            Ok(v) => element_from(&v),
            Err(_) => None,
        }
    }

    pub fn click(&self, el: &ElementRef) -> Result<()> {
        self.post(&format!("/element/{}/click", el.0), json!({}))?;
        Ok(())
    }

    /// Click through JavaScript, for controls covered by an overlay that
    /// rejects the normal interaction.
    pub fn force_click(&self, el: &ElementRef) -> Result<()> {
        self.execute("arguments[0].click();", vec![el.to_arg()])?;
        Ok(())
    }

    pub fn send_keys(&self, el: &ElementRef, text: &str) -> Result<()> {
        self.post(&format!("/element/{}/value", el.0), json!({ "text": text }))?;
        Ok(())
    }

    pub fn text(&self, el: &ElementRef) -> String {
        self.get(&format!("/element/{}/text", el.0))
            .ok()
            .and_then(|v| v.as_str().map(str::trim).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn attr(&self, el: &ElementRef, name: &str) -> Option<String> {
        self.get(&format!("/element/{}/attribute/{}", el.0, name))
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
    }

    /// Resize the browser window via the driver. Script-side resizing is
    /// ignored for windows the script did not open, so this is the only
    /// reliable way to grow the viewport.
    pub fn set_window_rect(&self, width: i64, height: i64) -> Result<()> {
        self.post("/window/rect", window_rect_body(width, height))?;
        Ok(())
    }

    pub fn scroll_into_view(&self, el: &ElementRef) -> Result<()> {
        self.execute("arguments[0].scrollIntoView({block:'center'});", vec![el.to_arg()])?;
        Ok(())
    }

    pub fn page_source(&self) -> Result<String> {
        let v = self.get("/source")?;
        v.as_str().map(str::to_string).context("page source was not a string")
    }

    /// Full viewport screenshot, base64 PNG as the driver returns it.
    pub fn screenshot(&self) -> Result<String> {
        let v = self.get("/screenshot")?;
        v.as_str().map(str::to_string).context("screenshot was not a string")
    }

    pub fn element_screenshot(&self, el: &ElementRef) -> Result<String> {
        let v = self.get(&format!("/element/{}/screenshot", el.0))?;
        v.as_str().map(str::to_string).context("screenshot was not a string")
    }

    /// Bounded poll for the first selector in `selectors` that matches.
    /// The probe list is re-evaluated every cycle: the page may rerender
    /// between polls.
    pub fn wait_for_any(&self, selectors: &[&str], timeout_secs: u64) -> Option<ElementRef> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            for sel in selectors {
                if let Some(el) = self.find_optional(sel) {
                    return Some(el);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(config::POLL_INTERVAL_MS));
        }
    }

    // ── Authentication precondition ─────────────────────────────────────

    /// Log in once; the session is assumed authenticated for the rest of
    /// the run. Failure here is fatal to the whole run.
    pub fn login(&self, email: &str, password: &str) -> Result<()> {
        self.navigate(config::LOGIN_URL)?;

        let user_field = self
            .wait_for_any(&["#username"], config::WAIT_LOGIN)
            .context("login form never appeared")?;
        let pass_field = self.find_element("#password")?;

        self.send_keys(&user_field, email)?;
        self.send_keys(&pass_field, password)?;
        self.click(&self.find_element("button[type='submit']")?)?;

        self.wait_for_any(&[config::SEARCH_BOX_SELECTOR], config::WAIT_LOGIN)
            .context("login did not reach the authenticated landing page")?;
        info!("Logged in.");
        delay::random_action_delay();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.base, self.session_id);
        if let Err(e) = self.http.delete(url).send() {
            warn!("Failed to close browser session: {}", e);
        }
    }
}

impl ElementRef {
    /// Wire representation for passing an element as a script argument.
    fn to_arg(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

fn element_from(v: &Value) -> Option<ElementRef> {
    v.get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

fn window_rect_body(width: i64, height: i64) -> Value {
    json!({ "width": width, "height": height })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_parsed_from_wire_shape() {
        let v = json!({ ELEMENT_KEY: "abc-123" });
        let el = element_from(&v).unwrap();
        assert_eq!(el.to_arg(), json!({ ELEMENT_KEY: "abc-123" }));
    }

    #[test]
    fn non_element_value_is_none() {
        assert!(element_from(&json!({ "foo": "bar" })).is_none());
        assert!(element_from(&json!(null)).is_none());
    }

    #[test]
    fn window_rect_wire_shape() {
        assert_eq!(
            window_rect_body(1920, 8430),
            json!({ "width": 1920, "height": 8430 })
        );
    }
}
