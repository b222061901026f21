use std::fs::File;
use std::path::Path;
use log::{info, error};
use serde::Deserialize;
use calamine::{Reader, Xlsx, open_workbook};

/// One person from the input roster. The profile URL column is optional:
/// entries without one go through the name resolver first.
#[derive(Debug, Deserialize, Clone)]
pub struct RosterEntry {
    #[serde(rename = "firstname", alias = "Firstname", alias = "first_name", alias = "First Name", alias = "given_name")]
    pub firstname: String,
    #[serde(rename = "lastname", alias = "Lastname", alias = "last_name", alias = "Last Name", alias = "family_name")]
    pub lastname: String,
    #[serde(default, rename = "program", alias = "Program", alias = "cohort", alias = "Cohort")]
    pub program: Option<String>,
    #[serde(default, rename = "linkedin_profile", alias = "profile_url", alias = "url", alias = "URL")]
    pub linkedin_profile: Option<String>,
}

pub fn load_entries<P: AsRef<Path>>(filename: P) -> Vec<RosterEntry> {
    let path_ref = filename.as_ref();

    if !path_ref.exists() {
        error!("Roster file {:?} does not exist.", path_ref);
        return Vec::new();
    }

    let is_excel = path_ref.extension().map_or(false, |ext| ext == "xlsx" || ext == "xls");
    if is_excel {
        return load_excel(path_ref);
    }
    load_csv(path_ref)
}

fn load_csv(path: &Path) -> Vec<RosterEntry> {
    let mut entries = Vec::new();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            error!("Could not open roster CSV: {}", e);
            return entries;
        }
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    for result in rdr.deserialize() {
        match result {
            Ok(entry) => entries.push(entry),
            Err(e) => error!("Error parsing roster row: {}", e),
        }
    }
    info!("Loaded {} roster entries from CSV {:?}", entries.len(), path);
    entries
}

fn load_excel(path: &Path) -> Vec<RosterEntry> {
    let mut entries = Vec::new();
    let mut excel: Xlsx<_> = match open_workbook(path) {
        Ok(wb) => wb,
        Err(e) => {
            error!("Could not open Excel roster: {}", e);
            return entries;
        }
    };

    let worksheets = excel.worksheets();
    if let Some((_name, range)) = worksheets.get(0) {
        let mut first_idx = None;
        let mut last_idx = None;
        let mut program_idx = None;
        let mut url_idx = None;

        for (row_idx, row) in range.rows().enumerate() {
            if row_idx == 0 {
                for (col_idx, cell) in row.iter().enumerate() {
                    let header = cell.to_string().to_lowercase();
                    if header.contains("first") || header.contains("given") { first_idx = Some(col_idx); }
                    else if header.contains("last") || header.contains("family") { last_idx = Some(col_idx); }
                    else if header.contains("program") || header.contains("cohort") { program_idx = Some(col_idx); }
                    else if header.contains("profile") || header.contains("url") { url_idx = Some(col_idx); }
                }

                if first_idx.is_none() || last_idx.is_none() {
                    error!("Excel roster missing firstname/lastname columns");
                    return entries;
                }
                continue;
            }

            let firstname = first_idx.and_then(|i| row.get(i)).map(|c| c.to_string()).unwrap_or_default();
            let lastname = last_idx.and_then(|i| row.get(i)).map(|c| c.to_string()).unwrap_or_default();
            let program = program_idx.and_then(|i| row.get(i)).map(|c| c.to_string()).filter(|s| !s.is_empty());
            let linkedin_profile = url_idx.and_then(|i| row.get(i)).map(|c| c.to_string()).filter(|s| !s.is_empty());

            if !firstname.is_empty() || !lastname.is_empty() {
                entries.push(RosterEntry {
                    firstname,
                    lastname,
                    program,
                    linkedin_profile,
                });
            }
        }
    }

    info!("Loaded {} roster entries from Excel {:?}", entries.len(), path);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_csv(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "roster_test_{}_{}.csv",
            std::process::id(),
            contents.len()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_csv_with_optional_columns() {
        let path = temp_csv(
            "firstname,lastname,program,linkedin_profile\n\
             Ada,Lovelace,CS,https://www.linkedin.com/in/ada\n\
             Alan,Turing,,\n",
        );
        let entries = load_entries(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].firstname, "Ada");
        assert_eq!(entries[0].linkedin_profile.as_deref(), Some("https://www.linkedin.com/in/ada"));
        assert_eq!(entries[1].program, None);
        assert_eq!(entries[1].linkedin_profile, None);
    }

    #[test]
    fn missing_file_yields_empty() {
        assert!(load_entries("definitely/not/here.csv").is_empty());
    }
}
