use anyhow::{Context, Result};
use log::{error, info, warn};

use alumni_scraper::{config, delay, logger, page, record, resolver, store, structural};
use alumni_scraper::record::ProfileRecord;
use alumni_scraper::roster::{self, RosterEntry};
use alumni_scraper::session::Session;
use alumni_scraper::store::OutputStore;
use alumni_scraper::vision::VisionClient;

fn main() -> Result<()> {
    logger::init();
    info!("Starting alumni profile scraper...");

    // 1. Load roster
    let entries = roster::load_entries(config::ROSTER_FILE);
    if entries.is_empty() {
        error!(
            "No roster entries found in {}. Expected headers: firstname, lastname, program, linkedin_profile",
            config::ROSTER_FILE
        );
        return Ok(());
    }

    // 2. Resumption state comes from the output store itself
    let mut done = store::DoneSet::load(config::OUTPUT_CSV);
    let mut output = OutputStore::open(config::OUTPUT_CSV)?;

    // 3. Authenticated session + vision client
    let creds = config::Credentials::from_env()?;
    let session = Session::new(config::WEBDRIVER_URL)?;
    session.login(&creds.email, &creds.password)?;
    let vision = VisionClient::new(config::vision_api_key())?;
    let strategy = config::capture_strategy();

    let total = entries.len();
    let mut processed = 0usize;
    let mut rows_in_store = done.len();

    for (i, entry) in entries.iter().enumerate() {
        // Resolve the identifier first; it is the resumption key.
        let profile_url = match resolve_identifier(&session, entry) {
            Some(url) => url,
            None => {
                warn!(
                    "No profile for {} {} - skipped.",
                    entry.firstname, entry.lastname
                );
                continue;
            }
        };

        // Claiming covers both prior runs and duplicate roster rows that
        // resolve to the same person within this one.
        if !done.claim(&profile_url) {
            continue;
        }

        processed += 1;
        info!(
            "Processing {} / {} : {} {} ({})",
            i + 1,
            total,
            entry.firstname,
            entry.lastname,
            profile_url
        );

        if processed > 1 {
            delay::random_profile_delay();
        }

        // Anything that escapes the per-profile pipeline still produces a
        // row: the entry is done either way, failures are not retried by
        // rerunning forever.
        let record = match scrape_one(&session, &vision, strategy, entry, &profile_url) {
            Ok(record) => record,
            Err(e) => {
                error!("Profile failed ({}): {} - recording empty row.", profile_url, e);
                ProfileRecord::empty_for(entry, &profile_url)
            }
        };

        // Store I/O failure is the one thing that must stop the run.
        output
            .append(&record)
            .context("output store write failed; stopping to avoid losing data")?;
        rows_in_store += 1;
    }

    info!(
        "Run complete. {} new profiles processed; {} rows now in {}.",
        output.appended(),
        rows_in_store,
        config::OUTPUT_CSV
    );
    Ok(())
}

/// Identifier for a roster entry: the pre-resolved URL when present,
/// otherwise one live search by name. Either way it is canonicalized so
/// resumption keys stay stable across runs.
fn resolve_identifier(session: &Session, entry: &RosterEntry) -> Option<String> {
    if let Some(raw) = entry.linkedin_profile.as_deref() {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("not found") {
            if let Some(url) = resolver::canonicalize_profile_url(trimmed) {
                return Some(url);
            }
            warn!("Roster URL {:?} is not a profile URL; falling back to search.", trimmed);
        }
    }
    resolver::resolve(session, &entry.firstname, &entry.lastname)
}

/// The per-profile pipeline: load & render, structural extraction,
/// vision extraction, reconcile.
fn scrape_one(
    session: &Session,
    vision: &VisionClient,
    strategy: config::CaptureStrategy,
    entry: &RosterEntry,
    profile_url: &str,
) -> Result<ProfileRecord> {
    page::load_profile(session, profile_url)?;

    let dom = structural::extract(session);
    let vis = vision.extract_profile(session, strategy);

    Ok(record::merge(entry, profile_url, &dom, &vis))
}
