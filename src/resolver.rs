use log::{info, warn};
use scraper::{Html, Selector};
use url::Url;

use crate::config;
use crate::session::Session;

/// Resolve a person's name to a canonical profile URL via the site's
/// people search, scoped to the configured organization. Returns None if
/// no result renders within the timeout - the caller treats that as
/// "not found" and moves on.
pub fn resolve(session: &Session, firstname: &str, lastname: &str) -> Option<String> {
    let query = format!("{} {} {}", firstname, lastname, config::SEARCH_CONTEXT);
    let search_url = format!(
        "{}?keywords={}",
        config::PEOPLE_SEARCH_URL,
        urlencoding::encode(&query)
    );

    info!("Searching for: '{}'", query);
    if let Err(e) = session.navigate(&search_url) {
        warn!("Search navigation failed: {}", e);
        return None;
    }

    if session
        .wait_for_any(config::SEARCH_RESULT_SELECTORS, config::WAIT_SEARCH)
        .is_none()
    {
        warn!("No search results rendered for '{}'", query);
        return None;
    }

    let html = match session.page_source() {
        Ok(h) => h,
        Err(e) => {
            warn!("Could not read search results page: {}", e);
            return None;
        }
    };

    match first_profile_link(&html) {
        Some(url) => {
            info!("Resolved '{} {}' -> {}", firstname, lastname, url);
            Some(url)
        }
        None => {
            warn!("No profile link in results for '{}'", query);
            None
        }
    }
}

/// First profile link in a rendered search-results page, canonicalized.
/// Walks the selector probe list in order; first hit wins.
pub fn first_profile_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for sel_str in config::PROFILE_LINK_SELECTORS {
        let selector = match Selector::parse(sel_str) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(canonical) = canonicalize_profile_url(href) {
                    return Some(canonical);
                }
            }
        }
    }
    None
}

/// Strip tracking query parameters and fragments, keep only
/// `https://host/in/<slug>`. Anything that is not a profile path is
/// rejected.
pub fn canonicalize_profile_url(href: &str) -> Option<String> {
    let mut url = Url::parse(href).ok()?;
    if !url.path().starts_with("/in/") {
        return None;
    }
    url.set_query(None);
    url.set_fragment(None);
    let mut s = url.to_string();
    while s.ends_with('/') {
        s.pop();
    }
    Some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_tracking_params() {
        assert_eq!(
            canonicalize_profile_url(
                "https://www.linkedin.com/in/jane-doe-123/?miniProfileUrn=urn%3Ali%3Afs#top"
            )
            .as_deref(),
            Some("https://www.linkedin.com/in/jane-doe-123")
        );
    }

    #[test]
    fn canonicalize_rejects_non_profile_paths() {
        assert!(canonicalize_profile_url("https://www.linkedin.com/feed/").is_none());
        assert!(canonicalize_profile_url("not a url").is_none());
    }

    #[test]
    fn first_link_uses_probe_order() {
        let html = r#"
            <ul class="reusable-search__entity-result-list">
              <li class="reusable-search__result-container">
                <span class="entity-result__title">
                  <a href="https://www.linkedin.com/in/first-hit?trk=search">First Hit</a>
                </span>
                <a class="app-aware-link" href="https://www.linkedin.com/in/second-hit">x</a>
              </li>
            </ul>"#;
        assert_eq!(
            first_profile_link(html).as_deref(),
            Some("https://www.linkedin.com/in/first-hit")
        );
    }

    #[test]
    fn no_profile_links_yields_none() {
        assert!(first_profile_link("<html><body><a href='/feed/'>x</a></body></html>").is_none());
    }
}
