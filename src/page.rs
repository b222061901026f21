use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;

use crate::config;
use crate::session::{ElementRef, Session};

/// The lazily-loaded profile sections we care about, located by matching
/// their heading text rather than by class names (which rotate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Experience,
    Education,
    Licenses,
    Volunteering,
}

impl SectionKind {
    pub fn label(self) -> &'static str {
        match self {
            SectionKind::Experience => "experience",
            SectionKind::Education => "education",
            SectionKind::Licenses => "licenses",
            SectionKind::Volunteering => "volunteering",
        }
    }

    /// Match a section heading to a kind, tolerant of suffixes like
    /// "Licenses & certifications".
    pub fn from_heading(heading: &str) -> Option<SectionKind> {
        static PATTERNS: OnceLock<[(Regex, SectionKind); 4]> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                (Regex::new(r"(?i)^experience").unwrap(), SectionKind::Experience),
                (Regex::new(r"(?i)^education").unwrap(), SectionKind::Education),
                (Regex::new(r"(?i)^licenses? &").unwrap(), SectionKind::Licenses),
                (Regex::new(r"(?i)^volunteer").unwrap(), SectionKind::Volunteering),
            ]
        });
        let trimmed = heading.trim();
        patterns
            .iter()
            .find(|(re, _)| re.is_match(trimmed))
            .map(|&(_, kind)| kind)
    }
}

/// Decides when progressive scrolling is done. Pure state machine so the
/// termination guarantee is testable without a browser: stops at the
/// bottom, on no forward progress, or after `max_steps` regardless of
/// what the page reports.
pub struct ScrollTracker {
    last_seen: i64,
    steps: usize,
    max_steps: usize,
}

impl ScrollTracker {
    pub fn new(max_steps: usize) -> Self {
        ScrollTracker { last_seen: -1, steps: 0, max_steps }
    }

    /// Feed one post-scroll observation; returns true while scrolling
    /// should continue.
    pub fn keep_going(&mut self, seen_bottom: i64, page_height: i64) -> bool {
        self.steps += 1;
        if self.steps >= self.max_steps {
            return false;
        }
        if seen_bottom >= page_height || seen_bottom == self.last_seen {
            return false;
        }
        self.last_seen = seen_bottom;
        true
    }
}

/// Navigate to a profile and leave it fully rendered: header landmark
/// present, lazy sections materialized, viewport back at the top.
/// A page that never shows any header landmark is a profile-level
/// failure, propagated to the collection loop.
pub fn load_profile(session: &Session, url: &str) -> Result<()> {
    session.navigate(url)?;

    session
        .wait_for_any(config::HEAD_SELECTORS, config::WAIT_HEAD)
        .context("profile header never rendered")?;

    ensure_sections_loaded(session)?;

    session.execute("window.scrollTo(0, 0);", vec![])?;
    thread::sleep(Duration::from_millis(600));
    Ok(())
}

/// Scroll each known section heading into view, then step to the bottom
/// so every lazy section has had a chance to load.
fn ensure_sections_loaded(session: &Session) -> Result<()> {
    for (kind, el) in section_elements(session) {
        debug!("Scrolling {} section into view", kind.label());
        session.scroll_into_view(&el)?;
        thread::sleep(Duration::from_millis(400));
    }

    let mut tracker = ScrollTracker::new(config::MAX_SCROLL_STEPS);
    loop {
        session.execute(&format!("window.scrollBy(0, {});", config::SCROLL_STEP_PX), vec![])?;
        thread::sleep(Duration::from_millis(config::SCROLL_PAUSE_MS));

        let seen = session
            .execute("return window.pageYOffset + window.innerHeight;", vec![])?
            .as_f64()
            .unwrap_or(0.0) as i64;
        let total = session
            .execute("return document.body.scrollHeight;", vec![])?
            .as_f64()
            .unwrap_or(0.0) as i64;

        if !tracker.keep_going(seen, total) {
            break;
        }
    }
    debug!("Lazy sections loaded.");
    Ok(())
}

/// Locate the enclosing <section> element for each recognized heading.
pub fn section_elements(session: &Session) -> Vec<(SectionKind, ElementRef)> {
    let mut found = Vec::new();
    for section in session.find_elements("main section") {
        let Some(heading) = session.find_in(&section, "h2") else {
            continue;
        };
        if let Some(kind) = SectionKind::from_heading(&session.text(&heading)) {
            if !found.iter().any(|(k, _)| *k == kind) {
                found.push((kind, section));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_stops_at_bottom() {
        let mut t = ScrollTracker::new(60);
        assert!(t.keep_going(700, 5000));
        assert!(t.keep_going(1400, 5000));
        assert!(!t.keep_going(5000, 5000));
    }

    #[test]
    fn scroll_stops_when_stuck() {
        let mut t = ScrollTracker::new(60);
        assert!(t.keep_going(700, 5000));
        assert!(t.keep_going(900, 5000));
        // No forward progress: same position twice in a row.
        assert!(!t.keep_going(900, 5000));
    }

    #[test]
    fn scroll_bounded_on_infinite_page() {
        // Page height grows faster than we scroll, forever.
        let mut t = ScrollTracker::new(10);
        let mut steps = 0;
        let mut pos = 0;
        let mut height = 10_000;
        while t.keep_going(pos, height) {
            pos += 700;
            height += 1_000;
            steps += 1;
            assert!(steps < 100, "tracker failed to terminate");
        }
        assert!(steps <= 10);
    }

    #[test]
    fn heading_matching() {
        assert_eq!(SectionKind::from_heading("Experience"), Some(SectionKind::Experience));
        assert_eq!(SectionKind::from_heading("  education "), Some(SectionKind::Education));
        assert_eq!(
            SectionKind::from_heading("Licenses & certifications"),
            Some(SectionKind::Licenses)
        );
        assert_eq!(SectionKind::from_heading("Volunteering"), Some(SectionKind::Volunteering));
        assert_eq!(SectionKind::from_heading("About"), None);
    }
}
