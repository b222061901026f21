use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::record::ProfileRecord;

/// Append-only CSV store of finished profile records. The store itself is
/// the resumption state: the set of identifiers read back at startup is
/// the only gate on reprocessing, so there is no separate progress file
/// to drift out of sync.
pub struct OutputStore {
    writer: csv::Writer<File>,
    rows: usize,
}

impl OutputStore {
    /// Open for appending. The header is written exactly once, when the
    /// file is new or empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("could not create {:?}", parent))?;
            }
        }

        let has_rows = path.exists() && path.metadata().map_or(false, |m| m.len() > 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("could not open output store {:?}", path))?;

        let writer = csv::WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file);

        Ok(OutputStore { writer, rows: 0 })
    }

    /// Serialize one record and flush it to disk before returning, so an
    /// interruption after row N leaves rows 1..N durably complete. Any
    /// failure here must stop the run.
    pub fn append(&mut self, record: &ProfileRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .context("failed to serialize record to output store")?;
        self.writer
            .flush()
            .context("failed to flush output store")?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended by this run.
    pub fn appended(&self) -> usize {
        self.rows
    }
}

/// Identifiers already written, seeded from the store at startup and
/// extended as the run appends. Claiming is the single gate on
/// processing: an identifier claims true exactly once, whether it first
/// appeared in a prior run or earlier in this one.
pub struct DoneSet(HashSet<String>);

impl DoneSet {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        DoneSet(load_done(path))
    }

    /// True the first time `id` is seen; marks it seen either way.
    pub fn claim(&mut self, id: &str) -> bool {
        self.0.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read every previously written record and collect the processed
/// identifiers. Missing file means a fresh start. Unreadable rows are
/// skipped with a warning; they cannot be resumed against anyway.
pub fn load_done<P: AsRef<Path>>(path: P) -> HashSet<String> {
    let path = path.as_ref();
    if !path.exists() {
        info!("No existing output store. Starting fresh.");
        return HashSet::new();
    }

    let mut done = HashSet::new();
    match csv::Reader::from_path(path) {
        Ok(mut rdr) => {
            for result in rdr.deserialize::<ProfileRecord>() {
                match result {
                    Ok(record) if !record.linkedin_profile.is_empty() => {
                        done.insert(record.linkedin_profile);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable store row: {}", e),
                }
            }
        }
        Err(e) => warn!("Could not read output store {:?}: {}", path, e),
    }
    info!("Resuming - {} profiles already done.", done.len());
    done
}

/// All records currently in the store, in file order.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<ProfileRecord>> {
    let mut rdr = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("could not open {:?}", path.as_ref()))?;
    let mut records = Vec::new();
    for result in rdr.deserialize::<ProfileRecord>() {
        records.push(result.context("bad row in record store")?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProfileRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_store() -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "store_test_{}_{}.csv",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn record(url: &str) -> ProfileRecord {
        ProfileRecord {
            firstname: "Jane".into(),
            lastname: "Doe".into(),
            linkedin_profile: url.into(),
            email: "jane@example.org".into(),
            ..ProfileRecord::default()
        }
    }

    #[test]
    fn roundtrip_and_resume_set() {
        let path = temp_store();
        {
            let mut store = OutputStore::open(&path).unwrap();
            store.append(&record("https://www.linkedin.com/in/a")).unwrap();
            store.append(&record("https://www.linkedin.com/in/b")).unwrap();
            assert_eq!(store.appended(), 2);
        }

        let done = load_done(&path);
        assert_eq!(done.len(), 2);
        assert!(done.contains("https://www.linkedin.com/in/a"));

        let rows = load_records(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email, "jane@example.org");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reopen_appends_without_second_header() {
        let path = temp_store();
        {
            let mut store = OutputStore::open(&path).unwrap();
            store.append(&record("https://www.linkedin.com/in/a")).unwrap();
        }
        {
            let mut store = OutputStore::open(&path).unwrap();
            store.append(&record("https://www.linkedin.com/in/b")).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let header_count = contents
            .lines()
            .filter(|l| l.starts_with("firstname,"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(load_records(&path).unwrap().len(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn second_run_processes_nothing_new() {
        // Resumption idempotence: a roster fully covered by the store
        // leaves nothing to do and the store untouched.
        let path = temp_store();
        let roster_urls = ["https://www.linkedin.com/in/a", "https://www.linkedin.com/in/b"];
        {
            let mut store = OutputStore::open(&path).unwrap();
            for url in roster_urls {
                store.append(&record(url)).unwrap();
            }
        }
        let before = std::fs::read_to_string(&path).unwrap();

        let done = load_done(&path);
        let pending: Vec<_> = roster_urls.iter().filter(|u| !done.contains(**u)).collect();
        assert!(pending.is_empty());

        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(before, after);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn duplicate_roster_rows_write_once() {
        // Two roster rows resolving to the same identifier within one run
        // produce exactly one stored row.
        let path = temp_store();
        let resolved = [
            "https://www.linkedin.com/in/a",
            "https://www.linkedin.com/in/b",
            "https://www.linkedin.com/in/a",
        ];
        {
            let mut done = DoneSet::load(&path);
            let mut store = OutputStore::open(&path).unwrap();
            for url in resolved {
                if !done.claim(url) {
                    continue;
                }
                store.append(&record(url)).unwrap();
            }
        }
        assert_eq!(load_records(&path).unwrap().len(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn claim_is_exactly_once_across_runs() {
        let path = temp_store();
        {
            let mut store = OutputStore::open(&path).unwrap();
            store.append(&record("https://www.linkedin.com/in/a")).unwrap();
        }

        let mut done = DoneSet::load(&path);
        assert_eq!(done.len(), 1);
        assert!(!done.claim("https://www.linkedin.com/in/a"));
        assert!(done.claim("https://www.linkedin.com/in/b"));
        assert!(!done.claim("https://www.linkedin.com/in/b"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_store_is_fresh_start() {
        assert!(load_done("no/such/store.csv").is_empty());
    }
}
