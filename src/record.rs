use log::warn;
use serde::{Deserialize, Serialize};

use crate::roster::RosterEntry;
use crate::structural::DomBits;
use crate::vision::{VisionFields, VisionOutcome};

/// One output row: roster identity + everything extracted from the
/// profile. Every extraction field is a plain string and empty means
/// "visited but nothing extracted" - the row itself is the proof the
/// profile was attempted. Field order here is the CSV column order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileRecord {
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub program: String,
    pub linkedin_profile: String,
    #[serde(default)]
    pub current_title: String,
    #[serde(default)]
    pub current_company: String,
    #[serde(default)]
    pub second_title: String,
    #[serde(default)]
    pub second_company: String,
    #[serde(default)]
    pub third_title: String,
    #[serde(default)]
    pub third_company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub connections: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub profile_pic: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub licenses: String,
    #[serde(default)]
    pub volunteering: String,
}

impl ProfileRecord {
    /// Row for a profile that was attempted but yielded nothing (load
    /// timeout, navigation failure). Keeps the roster entry marked done.
    pub fn empty_for(entry: &RosterEntry, profile_url: &str) -> Self {
        ProfileRecord {
            firstname: entry.firstname.clone(),
            lastname: entry.lastname.clone(),
            program: entry.program.clone().unwrap_or_default(),
            linkedin_profile: profile_url.to_string(),
            ..ProfileRecord::default()
        }
    }
}

/// Parsed pieces of one `"Title @ Company – dates"` experience entry.
/// The dates part is optional and left as free text; the normalizer does
/// the date parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceParts {
    pub title: String,
    pub company: String,
    pub dates: String,
}

/// Split one experience entry by the delimiter convention agreed with the
/// vision prompt. None when the entry does not contain the " @ "
/// separator at all.
pub fn split_experience_entry(entry: &str) -> Option<ExperienceParts> {
    let (title, rest) = entry.split_once(" @ ")?;
    let title = title.trim();
    if title.is_empty() {
        return None;
    }

    // Company and dates are separated by a spaced dash; tolerate both the
    // en dash the prompt asks for and a plain hyphen.
    let (company, dates) = ["–", " - "]
        .iter()
        .find_map(|d| rest.split_once(d))
        .map(|(c, d)| (c.trim(), d.trim()))
        .unwrap_or((rest.trim(), ""));

    if company.is_empty() {
        return None;
    }
    Some(ExperienceParts {
        title: title.to_string(),
        company: company.to_string(),
        dates: dates.to_string(),
    })
}

const LIST_DELIM: &str = "; ";

/// Merge both channels into one record.
///
/// Precedence: the structural channel wins for photo and email - it came
/// deterministically from the markup. Vision values for those are used
/// only when structural found nothing. All other fields come from vision
/// alone and default to empty when the payload was missing or malformed.
pub fn merge(
    entry: &RosterEntry,
    profile_url: &str,
    dom: &DomBits,
    vision: &VisionOutcome,
) -> ProfileRecord {
    let fields_storage;
    let fields: &VisionFields = match vision {
        VisionOutcome::Parsed(f) => f,
        VisionOutcome::Empty => {
            fields_storage = VisionFields::default();
            &fields_storage
        }
    };

    let mut record = ProfileRecord {
        firstname: entry.firstname.clone(),
        lastname: entry.lastname.clone(),
        program: entry.program.clone().unwrap_or_default(),
        linkedin_profile: profile_url.to_string(),
        current_title: fields.current_title.clone(),
        current_company: fields.current_company.clone(),
        second_title: fields.second_title.clone(),
        second_company: fields.second_company.clone(),
        third_title: fields.third_title.clone(),
        third_company: fields.third_company.clone(),
        location: fields.location.clone(),
        connections: fields.connections.clone(),
        headline: fields.headline.clone(),
        profile_pic: prefer(&dom.profile_pic, &fields.profile_pic),
        email: prefer(&dom.email, &fields.email),
        experience: fields.experience.join(LIST_DELIM),
        education: fields.education.join(LIST_DELIM),
        licenses: fields.licenses.join(LIST_DELIM),
        volunteering: fields.volunteering.join(LIST_DELIM),
    };

    decompose_positions(&mut record, &fields.experience, profile_url);
    record
}

fn prefer(structural: &str, vision: &str) -> String {
    if structural.is_empty() { vision.to_string() } else { structural.to_string() }
}

/// Fill the three positional title/company pairs from the top-3
/// experience list, without overwriting anything the vision scalars
/// already supplied. An entry that does not match the delimiter
/// convention is logged and leaves its pair alone - never aborts the
/// record.
fn decompose_positions(record: &mut ProfileRecord, experience: &[String], profile_url: &str) {
    let slots: [(&mut String, &mut String); 3] = [
        (&mut record.current_title, &mut record.current_company),
        (&mut record.second_title, &mut record.second_company),
        (&mut record.third_title, &mut record.third_company),
    ];

    for (entry, (title, company)) in experience.iter().take(3).zip(slots) {
        match split_experience_entry(entry) {
            Some(parts) => {
                if title.is_empty() {
                    *title = parts.title;
                }
                if company.is_empty() {
                    *company = parts.company;
                }
            }
            None => warn!(
                "Experience entry for {} did not match 'title @ company': {:?}",
                profile_url, entry
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RosterEntry {
        RosterEntry {
            firstname: "Jane".into(),
            lastname: "Doe".into(),
            program: Some("MS-IT".into()),
            linkedin_profile: Some("https://www.linkedin.com/in/jane".into()),
        }
    }

    #[test]
    fn structural_email_wins_over_vision() {
        let dom = DomBits { profile_pic: "".into(), email: "a@x.com".into() };
        let vision = VisionOutcome::Parsed(VisionFields {
            email: "b@y.com".into(),
            ..VisionFields::default()
        });
        let record = merge(&entry(), "https://www.linkedin.com/in/jane", &dom, &vision);
        assert_eq!(record.email, "a@x.com");
    }

    #[test]
    fn vision_email_used_when_structural_empty() {
        let dom = DomBits::default();
        let vision = VisionOutcome::Parsed(VisionFields {
            email: "b@y.com".into(),
            ..VisionFields::default()
        });
        let record = merge(&entry(), "https://www.linkedin.com/in/jane", &dom, &vision);
        assert_eq!(record.email, "b@y.com");
    }

    #[test]
    fn empty_vision_still_yields_structural_fields_and_empty_strings() {
        let dom = DomBits { profile_pic: "https://cdn/p.jpg".into(), email: "a@x.com".into() };
        let record = merge(&entry(), "https://www.linkedin.com/in/jane", &dom, &VisionOutcome::Empty);
        assert_eq!(record.profile_pic, "https://cdn/p.jpg");
        assert_eq!(record.email, "a@x.com");
        assert_eq!(record.current_title, "");
        assert_eq!(record.experience, "");
        assert_eq!(record.volunteering, "");
    }

    #[test]
    fn lists_flattened_with_semicolon_delimiter() {
        let vision = VisionOutcome::Parsed(VisionFields {
            education: vec!["A University".into(), "B College".into()],
            ..VisionFields::default()
        });
        let record = merge(&entry(), "u", &DomBits::default(), &vision);
        assert_eq!(record.education, "A University; B College");
    }

    #[test]
    fn experience_list_fills_positional_pairs() {
        let vision = VisionOutcome::Parsed(VisionFields {
            experience: vec![
                "Senior Engineer @ Acme Corp – Jan 2019-Mar 2022".into(),
                "Engineer @ Initech – 2015-2019".into(),
                "Intern @ Hooli – 2014".into(),
            ],
            ..VisionFields::default()
        });
        let record = merge(&entry(), "u", &DomBits::default(), &vision);
        assert_eq!(record.current_title, "Senior Engineer");
        assert_eq!(record.current_company, "Acme Corp");
        assert_eq!(record.second_title, "Engineer");
        assert_eq!(record.second_company, "Initech");
        assert_eq!(record.third_title, "Intern");
        assert_eq!(record.third_company, "Hooli");
    }

    #[test]
    fn scalar_fields_not_overwritten_by_decomposition() {
        let vision = VisionOutcome::Parsed(VisionFields {
            current_title: "Chief Engineer".into(),
            experience: vec!["Senior Engineer @ Acme Corp – 2019-2022".into()],
            ..VisionFields::default()
        });
        let record = merge(&entry(), "u", &DomBits::default(), &vision);
        assert_eq!(record.current_title, "Chief Engineer");
        assert_eq!(record.current_company, "Acme Corp");
    }

    #[test]
    fn malformed_experience_entry_leaves_pair_empty() {
        let vision = VisionOutcome::Parsed(VisionFields {
            experience: vec!["just some text without the separator".into()],
            ..VisionFields::default()
        });
        let record = merge(&entry(), "u", &DomBits::default(), &vision);
        assert_eq!(record.current_title, "");
        assert_eq!(record.current_company, "");
    }

    #[test]
    fn split_entry_variants() {
        let parts = split_experience_entry("Senior Engineer @ Acme Corp – Jan 2019-Mar 2022").unwrap();
        assert_eq!(parts.title, "Senior Engineer");
        assert_eq!(parts.company, "Acme Corp");
        assert_eq!(parts.dates, "Jan 2019-Mar 2022");

        let no_dates = split_experience_entry("Analyst @ RAND").unwrap();
        assert_eq!(no_dates.company, "RAND");
        assert_eq!(no_dates.dates, "");

        assert!(split_experience_entry("no separator here").is_none());
        assert!(split_experience_entry(" @ Acme – 2020").is_none());
    }
}
