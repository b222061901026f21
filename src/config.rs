use std::env;

use anyhow::{bail, Result};

// ── Target site ─────────────────────────────────────────────────────────
pub const LOGIN_URL: &str = "https://www.linkedin.com/login";
pub const PEOPLE_SEARCH_URL: &str = "https://www.linkedin.com/search/results/people/";

/// Organization context appended to every name search to scope results.
pub const SEARCH_CONTEXT: &str = "National Defense University";

// ── WebDriver ───────────────────────────────────────────────────────────
pub const WEBDRIVER_URL: &str = "http://localhost:9515";

// ── Timeouts & pacing (seconds unless noted) ────────────────────────────
pub const WAIT_LOGIN: u64 = 20;
pub const WAIT_HEAD: u64 = 20;
pub const WAIT_MODAL: u64 = 12;
pub const WAIT_SEARCH: u64 = 10;
pub const POLL_INTERVAL_MS: u64 = 500;

pub const SCROLL_STEP_PX: i64 = 700;
pub const SCROLL_PAUSE_MS: u64 = 500;
pub const MAX_SCROLL_STEPS: usize = 60;

// ── Selector fallbacks ──────────────────────────────────────────────────
// The site runs several layout versions concurrently and rotates class
// names; every lookup walks an ordered probe list and takes the first hit.

/// Profile header landmarks; any one of these appearing means the top
/// card has rendered.
pub const HEAD_SELECTORS: &[&str] = &[
    "div.pv-text-details__left-panel", // classic layout
    "div.ph5.pb5",                     // 2024-2025 layout
    "section.pv-top-card",
];

pub const PHOTO_SELECTORS: &[&str] = &[
    "img.pv-top-card-profile-picture__image",
    "img.profile-photo-edit__preview",
    "img.evi-image",
];

pub const SEARCH_RESULT_SELECTORS: &[&str] = &[
    ".search-results-container",
    "ul.reusable-search__entity-result-list",
    ".entity-result__content",
];

pub const PROFILE_LINK_SELECTORS: &[&str] = &[
    ".entity-result__title a",
    "li.reusable-search__result-container a[href*='/in/']",
    "a.app-aware-link[href*='/in/']",
];

pub const CONTACT_INFO_SELECTOR: &str = "#top-card-text-details-contact-info";
pub const MODAL_SELECTOR: &str = "section.artdeco-modal";
pub const MODAL_DISMISS_SELECTOR: &str = "button[aria-label='Dismiss']";
pub const SEARCH_BOX_SELECTOR: &str = "input[placeholder*='Search']";

// ── Vision service ──────────────────────────────────────────────────────
pub const VISION_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const VISION_MODEL: &str = "gpt-4o-mini";
pub const VISION_MAX_TOKENS: u32 = 1024;

/// Whole-page extraction prompt. The JSON shape here is a contract with
/// `vision::parse_payload` and the `"Title @ Company – dates"` convention
/// with `record::split_experience_entry`.
pub const PROFILE_PROMPT: &str = "From this LinkedIn profile page extract the following JSON object ONLY:\n\
{\n\
 \"current_title\": \"\", \"current_company\": \"\",\n\
 \"second_title\": \"\",  \"second_company\": \"\",\n\
 \"third_title\": \"\",   \"third_company\": \"\",\n\
 \"location\": \"\", \"connections\": \"\", \"headline\": \"\",\n\
 \"experience\": [],\n\
 \"education\":  [],\n\
 \"licenses\":   [],\n\
 \"volunteering\": []\n\
}\n\
\"experience\" is a list of up to 3 strings \"title @ company – dates\".\n\
\"education\", \"licenses\" and \"volunteering\" are lists of up to 3 strings.\n\
Return pure JSON - no markdown.";

/// Scoped prompt for the header area when capturing per-section.
pub const HEADER_PROMPT: &str = "From this profile header extract the following JSON object ONLY:\n\
{ \"current_title\": \"\", \"current_company\": \"\", \"location\": \"\",\n\
  \"connections\": \"\", \"headline\": \"\" }\n\
Return pure JSON - no markdown.";

// ── File layout ─────────────────────────────────────────────────────────
pub const ROSTER_FILE: &str = "input/alumni_roster.csv";
pub const OUTPUT_CSV: &str = "output/alumni_details.csv";
pub const SCREENSHOT_DIR: &str = "screenshots";

/// How the vision channel captures the page. Whole-page is one model call
/// per profile but produces longer, less reliable answers for sections far
/// down the page; per-section is one call per section with a tighter
/// prompt, more reliable but 4-5x the cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    WholePage,
    PerSection,
}

pub fn capture_strategy() -> CaptureStrategy {
    match env::var("VISION_CAPTURE").as_deref() {
        Ok("sections") => CaptureStrategy::PerSection,
        _ => CaptureStrategy::WholePage,
    }
}

pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Login credentials from LINKEDIN_EMAIL / LINKEDIN_PASSWORD.
    /// Missing credentials are fatal: nothing works unauthenticated.
    pub fn from_env() -> Result<Self> {
        let email = match env::var("LINKEDIN_EMAIL") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => bail!("LINKEDIN_EMAIL is not set"),
        };
        let password = match env::var("LINKEDIN_PASSWORD") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => bail!("LINKEDIN_PASSWORD is not set"),
        };
        Ok(Credentials { email, password })
    }
}

/// OPENAI_API_KEY, or None to run with the vision channel disabled
/// (structural fields are still collected).
pub fn vision_api_key() -> Option<String> {
    env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
}
