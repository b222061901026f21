use log::{debug, warn};
use scraper::{Html, Selector};

use crate::config;
use crate::session::Session;

/// Fields obtainable deterministically from the page markup. These take
/// precedence over anything the vision channel returns for the same
/// logical field.
#[derive(Debug, Default, Clone)]
pub struct DomBits {
    pub profile_pic: String,
    pub email: String,
}

/// Best-effort structural extraction. The two lookups are independent:
/// failure of one never blocks the other, and neither failure is an error
/// to the caller.
pub fn extract(session: &Session) -> DomBits {
    let mut bits = DomBits::default();

    match session.page_source() {
        Ok(html) => bits.profile_pic = photo_url(&html).unwrap_or_default(),
        Err(e) => warn!("Could not read page source for photo: {}", e),
    }

    bits.email = contact_email(session).unwrap_or_default();
    bits
}

/// Profile photo URL via the ordered selector probe list; first non-empty
/// `src` wins.
pub fn photo_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for sel_str in config::PHOTO_SELECTORS {
        let selector = match Selector::parse(sel_str) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if let Some(img) = document.select(&selector).next() {
            if let Some(src) = img.value().attr("src").filter(|s| !s.is_empty()) {
                return Some(src.to_string());
            }
        }
    }
    None
}

/// Open the contact-info modal, pull a mailto address if one is shown,
/// and dismiss the modal again. Every step degrades silently; the page is
/// always left usable for whatever runs next.
fn contact_email(session: &Session) -> Option<String> {
    // Back to the top, then a small nudge so the sticky nav does not sit
    // on the contact-info control.
    session.execute("window.scrollTo(0, 0);", vec![]).ok()?;
    session.execute("window.scrollBy(0, 32);", vec![]).ok()?;

    let link = session.find_optional(config::CONTACT_INFO_SELECTOR)?;

    if let Err(e) = session.click(&link) {
        debug!("Contact-info click intercepted ({}); forcing", e);
        session.force_click(&link).ok()?;
    }

    if session
        .wait_for_any(&[config::MODAL_SELECTOR], config::WAIT_MODAL)
        .is_none()
    {
        debug!("Contact-info modal never appeared.");
        return None;
    }

    let email = session
        .page_source()
        .ok()
        .and_then(|html| email_from_html(&html));

    // Always try to close the modal, found address or not.
    if let Some(dismiss) = session.find_optional(config::MODAL_DISMISS_SELECTOR) {
        if session.click(&dismiss).is_err() {
            let _ = session.force_click(&dismiss);
        }
    }

    email
}

/// Address portion of the first `mailto:` link in the rendered page.
pub fn email_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href^='mailto:']").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim_start_matches("mailto:").to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_uses_first_matching_probe() {
        let html = r#"
            <div>
              <img class="evi-image" src="https://cdn.example/fallback.jpg">
              <img class="pv-top-card-profile-picture__image" src="https://cdn.example/photo.jpg">
            </div>"#;
        assert_eq!(photo_url(html).as_deref(), Some("https://cdn.example/photo.jpg"));
    }

    #[test]
    fn photo_missing_is_none() {
        assert!(photo_url("<html><body><img src='x.png'></body></html>").is_none());
    }

    #[test]
    fn email_extracted_from_mailto() {
        let html = r#"<section class="artdeco-modal">
            <a href="mailto:jane@example.org">jane@example.org</a>
        </section>"#;
        assert_eq!(email_from_html(html).as_deref(), Some("jane@example.org"));
    }

    #[test]
    fn no_mailto_is_none() {
        assert!(email_from_html("<a href='https://example.org'>site</a>").is_none());
    }
}
