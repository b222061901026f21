use std::collections::HashSet;

use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;

use crate::record::{self, ProfileRecord};

/// Child row for one item of a "; "-joined list field.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SectionRow {
    pub linkedin_profile: String,
    pub section: String,
    pub seq: usize,
    pub value: String,
}

/// Typed child row for one experience entry, dates parsed best-effort.
/// An open-ended position ("Present") has no end date.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperienceRow {
    pub linkedin_profile: String,
    pub seq: usize,
    pub title: String,
    pub company: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

const LIST_FIELDS: [&str; 4] = ["experience", "education", "licenses", "volunteering"];

/// Clean the raw record set: collapse whitespace, drop duplicate
/// identifiers (keep first), strip inline base64 images, and reduce the
/// connections field to a parsed integer or empty.
pub fn clean_records(records: Vec<ProfileRecord>) -> Vec<ProfileRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut cleaned = Vec::with_capacity(records.len());

    for mut record in records {
        normalize_record_fields(&mut record);
        if !seen.insert(record.linkedin_profile.clone()) {
            debug!("Dropping duplicate record for {}", record.linkedin_profile);
            continue;
        }
        record.profile_pic = strip_inline_image(&record.profile_pic);
        record.connections = parse_connections(&record.connections)
            .map(|n| n.to_string())
            .unwrap_or_default();
        cleaned.push(record);
    }

    info!("Cleaned record set: {} rows.", cleaned.len());
    cleaned
}

fn normalize_record_fields(record: &mut ProfileRecord) {
    for field in [
        &mut record.firstname,
        &mut record.lastname,
        &mut record.program,
        &mut record.linkedin_profile,
        &mut record.current_title,
        &mut record.current_company,
        &mut record.second_title,
        &mut record.second_company,
        &mut record.third_title,
        &mut record.third_company,
        &mut record.location,
        &mut record.connections,
        &mut record.headline,
        &mut record.profile_pic,
        &mut record.email,
        &mut record.experience,
        &mut record.education,
        &mut record.licenses,
        &mut record.volunteering,
    ] {
        *field = normalize_text(field);
    }
}

/// Collapse newlines and runs of whitespace to single spaces, trim ends.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Inline base64 images blow up cell sizes in downstream tabular tools;
/// replace them with nothing rather than a truncated blob.
pub fn strip_inline_image(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("data:image/") && lower.contains(";base64,") {
        String::new()
    } else {
        s.to_string()
    }
}

/// "500+" -> 500, "1,234" -> 1234. First run of digits after commas are
/// removed; anything without digits is None, never zero.
pub fn parse_connections(s: &str) -> Option<u32> {
    let cleaned = s.replace(',', "");
    let digits: String = cleaned
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Explode every list field of every record into child rows keyed by
/// (identifier, section, sequence).
pub fn section_rows(records: &[ProfileRecord]) -> Vec<SectionRow> {
    let mut rows = Vec::new();
    for record in records {
        for section in LIST_FIELDS {
            let joined = match section {
                "experience" => &record.experience,
                "education" => &record.education,
                "licenses" => &record.licenses,
                _ => &record.volunteering,
            };
            for (seq, value) in split_list(joined).enumerate() {
                rows.push(SectionRow {
                    linkedin_profile: record.linkedin_profile.clone(),
                    section: section.to_string(),
                    seq: seq + 1,
                    value: value.to_string(),
                });
            }
        }
    }
    rows
}

/// Re-apply the title/company/date decomposition to every experience
/// entry. Entries that miss the delimiter convention or have unparseable
/// dates degrade to empty/None fields; nothing here raises.
pub fn experience_rows(records: &[ProfileRecord]) -> Vec<ExperienceRow> {
    let mut rows = Vec::new();
    for record in records {
        for (seq, entry) in split_list(&record.experience).enumerate() {
            let (title, company, start, end) = match record::split_experience_entry(entry) {
                Some(parts) => {
                    let (start, end) = split_date_range(&parts.dates);
                    (parts.title, parts.company, start, end)
                }
                None => {
                    debug!("Unstructured experience entry kept as title only: {:?}", entry);
                    (entry.to_string(), String::new(), None, None)
                }
            };
            rows.push(ExperienceRow {
                linkedin_profile: record.linkedin_profile.clone(),
                seq: seq + 1,
                title,
                company,
                start_date: start,
                end_date: end,
            });
        }
    }
    rows
}

fn split_list(joined: &str) -> impl Iterator<Item = &str> {
    joined
        .split("; ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// "Jan 2019-Mar 2022" -> (Some(2019-01-01), Some(2022-03-01)).
/// "Present"/"current"/"now" as the end token means an open-ended role.
pub fn split_date_range(dates: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let dates = dates.trim();
    if dates.is_empty() {
        return (None, None);
    }

    let (start_tok, end_tok) = match dates.split_once(&['-', '–'][..]) {
        Some((a, b)) => (a.trim(), Some(b.trim())),
        None => (dates, None),
    };

    let start = parse_fuzzy_date(start_tok);
    let end = match end_tok {
        Some(tok) if is_open_ended(tok) => None,
        Some(tok) => parse_fuzzy_date(tok),
        None => None,
    };
    (start, end)
}

fn is_open_ended(token: &str) -> bool {
    matches!(token.trim().to_ascii_lowercase().as_str(), "present" | "current" | "now")
}

/// Best-effort parse of a free-text date token. Month-year tokens default
/// to the first of the month, year-only tokens to January 1st.
pub fn parse_fuzzy_date(token: &str) -> Option<NaiveDate> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%b %d, %Y", "%B %d, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(token, fmt) {
            return Some(d);
        }
    }
    // Month-year: prepend a day so chrono has a full date to parse.
    let with_day = format!("1 {}", token);
    for fmt in ["%d %b %Y", "%d %B %Y", "%d %m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&with_day, fmt) {
            return Some(d);
        }
    }
    // Bare year.
    if let Ok(year) = token.parse::<i32>() {
        if (1900..=2100).contains(&year) {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}
