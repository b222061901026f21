use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::Engine;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::config::{self, CaptureStrategy};
use crate::page::{self, SectionKind};
use crate::session::Session;

/// Result of one vision extraction: either a validated payload or an
/// explicit empty. Downstream merge logic never sees raw model text.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionOutcome {
    Parsed(VisionFields),
    Empty,
}

/// Typed view of the vision payload. All fields default to empty; lists
/// keep their items until the reconciler joins them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionFields {
    pub current_title: String,
    pub current_company: String,
    pub second_title: String,
    pub second_company: String,
    pub third_title: String,
    pub third_company: String,
    pub location: String,
    pub connections: String,
    pub headline: String,
    pub experience: Vec<String>,
    pub education: Vec<String>,
    pub licenses: Vec<String>,
    pub volunteering: Vec<String>,
    // The model is never asked for these, but sometimes volunteers them;
    // the reconciler only uses them when the structural channel came up
    // empty.
    pub email: String,
    pub profile_pic: String,
}

pub struct VisionClient {
    client: Client,
    api_key: Option<String>,
}

impl VisionClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        if api_key.is_none() {
            warn!("No vision API key; vision channel disabled.");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .context("failed to build vision HTTP client")?;
        Ok(VisionClient { client, api_key })
    }

    /// Run the configured capture strategy against the loaded profile.
    /// Never fails: every error path degrades to `VisionOutcome::Empty`.
    pub fn extract_profile(&self, session: &Session, strategy: CaptureStrategy) -> VisionOutcome {
        match strategy {
            CaptureStrategy::WholePage => self.extract_whole_page(session),
            CaptureStrategy::PerSection => self.extract_per_section(session),
        }
    }

    fn extract_whole_page(&self, session: &Session) -> VisionOutcome {
        let Some(shot) = capture_full_page(session) else {
            return VisionOutcome::Empty;
        };
        self.ask(&shot, config::PROFILE_PROMPT)
    }

    /// One cropped shot per located section plus a header shot, each with
    /// its own minimal prompt. Misses on individual sections leave just
    /// that list empty.
    fn extract_per_section(&self, session: &Session) -> VisionOutcome {
        let mut fields = match session.screenshot() {
            Ok(shot) => match self.ask(&shot, config::HEADER_PROMPT) {
                VisionOutcome::Parsed(f) => f,
                VisionOutcome::Empty => VisionFields::default(),
            },
            Err(e) => {
                warn!("Header screenshot failed: {}", e);
                VisionFields::default()
            }
        };

        for (kind, el) in page::section_elements(session) {
            // Element capture can fail on very tall sections; fall back
            // to the visible page around it.
            let shot = session.element_screenshot(&el).or_else(|e| {
                debug!("Element screenshot for {} failed ({}); using viewport", kind.label(), e);
                session.scroll_into_view(&el).and_then(|_| session.screenshot())
            });
            let Ok(shot) = shot else { continue };

            if let VisionOutcome::Parsed(section) = self.ask(&shot, &section_prompt(kind)) {
                let items = section.experience; // "items" lands in `experience`, see parse
                match kind {
                    SectionKind::Experience => fields.experience = items,
                    SectionKind::Education => fields.education = items,
                    SectionKind::Licenses => fields.licenses = items,
                    SectionKind::Volunteering => fields.volunteering = items,
                }
            }
        }

        if fields == VisionFields::default() {
            VisionOutcome::Empty
        } else {
            VisionOutcome::Parsed(fields)
        }
    }

    fn ask(&self, png_b64: &str, prompt: &str) -> VisionOutcome {
        if self.api_key.is_none() {
            return VisionOutcome::Empty;
        }
        match self.call(png_b64, prompt) {
            Ok(raw) => parse_payload(&raw),
            Err(e) => {
                warn!("Vision call failed: {}", e);
                VisionOutcome::Empty
            }
        }
    }

    /// One chat-completions call with the screenshot inlined as a data
    /// URI. Temperature is pinned to 0 for repeatability.
    fn call(&self, png_b64: &str, prompt: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            bail!("vision disabled");
        };

        let body = json!({
            "model": config::VISION_MODEL,
            "max_tokens": config::VISION_MAX_TOKENS,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url",
                      "image_url": { "url": format!("data:image/png;base64,{}", png_b64) } }
                ]
            }]
        });

        let resp = self
            .client
            .post(config::VISION_API_URL)
            .bearer_auth(api_key.trim())
            .json(&body)
            .send()
            .context("failed to call vision service")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("vision service returned {}: {}", status, text);
        }

        let parsed: Value = resp.json().context("failed to parse vision response body")?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .context("vision response had no content")?;
        Ok(content.to_string())
    }
}

fn section_prompt(kind: SectionKind) -> String {
    let hint = match kind {
        SectionKind::Experience => " Each item is \"title @ company – dates\".",
        _ => "",
    };
    format!(
        "From this screenshot of the {} section of a profile, extract the \
         following JSON object ONLY:\n{{ \"items\": [] }}\n\
         \"items\" is a list of up to 3 strings.{}\nReturn pure JSON - no markdown.",
        kind.label(),
        hint
    )
}

/// Full-height capture: grow the window to the document height first so a
/// single viewport shot covers the whole profile. A copy is kept on disk
/// for audit; failure to save never blocks the call.
fn capture_full_page(session: &Session) -> Option<String> {
    if let Ok(height) = session.execute("return document.body.scrollHeight;", vec![]) {
        let h = height.as_f64().unwrap_or(0.0) as i64;
        if h > 0 {
            if let Err(e) = session.set_window_rect(1920, h.min(12_000)) {
                warn!("Window resize failed, capturing current viewport: {}", e);
            }
        }
    }

    match session.screenshot() {
        Ok(shot) => {
            save_shot(&shot);
            Some(shot)
        }
        Err(e) => {
            warn!("Full-page screenshot failed: {}", e);
            None
        }
    }
}

fn save_shot(png_b64: &str) {
    let dir = PathBuf::from(config::SCREENSHOT_DIR);
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let path = dir.join(format!("{}.png", Utc::now().timestamp_millis()));
    match base64::engine::general_purpose::STANDARD.decode(png_b64) {
        Ok(bytes) => {
            if fs::write(&path, bytes).is_ok() {
                info!("Screenshot saved to {:?}", path);
            }
        }
        Err(e) => debug!("Screenshot was not valid base64: {}", e),
    }
}

// ── Payload parsing ─────────────────────────────────────────────────────

/// Parse free-form model output into a payload. Fallback chain: raw JSON,
/// then with markdown fences stripped, then the first balanced `{...}`
/// span anywhere in the text. Anything else is `Empty`.
pub fn parse_payload(raw: &str) -> VisionOutcome {
    let trimmed = raw.trim();

    let candidates = [
        Some(trimmed),
        strip_fences(trimmed),
        balanced_object(trimmed),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return VisionOutcome::Parsed(fields_from_value(&value));
            }
        }
    }
    debug!("Unparseable vision payload: {:?}", &trimmed.chars().take(120).collect::<String>());
    VisionOutcome::Empty
}

/// Contents of the first fenced code block, language tag tolerated.
/// Trailing prose after the closing fence is ignored.
fn strip_fences(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Drop an optional language tag line ("json", "JSON", ...).
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// First balanced top-level `{...}` span, string-literal aware.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull typed fields out of an untrusted object. Scalars may arrive as
/// numbers; lists may arrive as a single string; unknown keys are
/// ignored. A per-section `"items"` list lands in `experience`.
fn fields_from_value(value: &Value) -> VisionFields {
    let s = |key: &str| string_of(value, key);
    VisionFields {
        current_title: s("current_title"),
        current_company: s("current_company"),
        second_title: s("second_title"),
        second_company: s("second_company"),
        third_title: s("third_title"),
        third_company: s("third_company"),
        location: s("location"),
        connections: s("connections"),
        headline: s("headline"),
        experience: list_of(value, "experience")
            .or_else(|| list_of(value, "items"))
            .unwrap_or_default(),
        education: list_of(value, "education").unwrap_or_default(),
        licenses: list_of(value, "licenses").unwrap_or_default(),
        volunteering: list_of(value, "volunteering").unwrap_or_default(),
        email: s("email"),
        profile_pic: s("profile_pic"),
    }
}

fn string_of(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn list_of(value: &Value, key: &str) -> Option<Vec<String>> {
    match value.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    other => other.as_object().map(|_| other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(vec![s.trim().to_string()]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_json() {
        let raw = r#"{"current_title": "Analyst", "experience": ["A @ B – 2020-2021"]}"#;
        let VisionOutcome::Parsed(fields) = parse_payload(raw) else {
            panic!("expected parsed payload");
        };
        assert_eq!(fields.current_title, "Analyst");
        assert_eq!(fields.experience, vec!["A @ B – 2020-2021"]);
    }

    #[test]
    fn parses_fenced_json_with_language_tag_and_trailing_prose() {
        let raw = "Here you go:\n```json\n{\"headline\": \"Leader\", \"connections\": \"500+\"}\n```\nLet me know if you need more.";
        let VisionOutcome::Parsed(fields) = parse_payload(raw) else {
            panic!("expected parsed payload");
        };
        assert_eq!(fields.headline, "Leader");
        assert_eq!(fields.connections, "500+");
    }

    #[test]
    fn parses_embedded_object_in_prose() {
        let raw = "The profile shows {\"location\": \"Washington, DC\", \"education\": [\"X University\"]} as requested.";
        let VisionOutcome::Parsed(fields) = parse_payload(raw) else {
            panic!("expected parsed payload");
        };
        assert_eq!(fields.location, "Washington, DC");
        assert_eq!(fields.education, vec!["X University"]);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let raw = r#"note {"headline": "uses { and } freely", "connections": 500} end"#;
        let VisionOutcome::Parsed(fields) = parse_payload(raw) else {
            panic!("expected parsed payload");
        };
        assert_eq!(fields.headline, "uses { and } freely");
        assert_eq!(fields.connections, "500");
    }

    #[test]
    fn garbage_is_empty() {
        assert_eq!(parse_payload("I could not read the image, sorry."), VisionOutcome::Empty);
        assert_eq!(parse_payload(""), VisionOutcome::Empty);
        assert_eq!(parse_payload("[1, 2, 3]"), VisionOutcome::Empty);
    }

    #[test]
    fn list_tolerates_single_string() {
        let raw = r#"{"licenses": "PMP"}"#;
        let VisionOutcome::Parsed(fields) = parse_payload(raw) else {
            panic!("expected parsed payload");
        };
        assert_eq!(fields.licenses, vec!["PMP"]);
    }

    #[test]
    fn section_items_land_in_experience_slot() {
        let raw = r#"{"items": ["Engineer @ Acme – 2019-2021"]}"#;
        let VisionOutcome::Parsed(fields) = parse_payload(raw) else {
            panic!("expected parsed payload");
        };
        assert_eq!(fields.experience, vec!["Engineer @ Acme – 2019-2021"]);
    }
}
