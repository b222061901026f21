//! Post-processing stage: reads the raw record store produced by the
//! collection loop and writes the cleaned table plus exploded child-row
//! tables. Safe to rerun at any time; it never touches the raw store.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use alumni_scraper::{config, logger, normalize, store};

fn main() -> Result<()> {
    logger::init();

    let raw_path = config::OUTPUT_CSV;
    info!("Normalizing record store {}...", raw_path);

    let records = store::load_records(raw_path)
        .context("could not read the raw record store; run the scraper first")?;
    info!("Loaded {} raw rows.", records.len());

    let cleaned = normalize::clean_records(records);
    let sections = normalize::section_rows(&cleaned);
    let experience = normalize::experience_rows(&cleaned);

    let clean_path = derived_path(raw_path, "_clean");
    let sections_path = derived_path(raw_path, "_sections");
    let experience_path = derived_path(raw_path, "_experience");

    write_csv(&clean_path, &cleaned)?;
    write_csv(&sections_path, &sections)?;
    write_csv(&experience_path, &experience)?;

    info!(
        "Done. {} clean rows -> {}; {} section rows -> {}; {} experience rows -> {}.",
        cleaned.len(),
        clean_path,
        sections.len(),
        sections_path,
        experience.len(),
        experience_path
    );
    Ok(())
}

fn derived_path(raw: &str, suffix: &str) -> String {
    let path = Path::new(raw);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    match path.parent().and_then(|p| p.to_str()).filter(|p| !p.is_empty()) {
        Some(parent) => format!("{}/{}{}.csv", parent, stem, suffix),
        None => format!("{}{}.csv", stem, suffix),
    }
}

fn write_csv<T: Serialize>(path: &str, rows: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("could not create {}", path))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write row to {}", path))?;
    }
    writer.flush().with_context(|| format!("failed to flush {}", path))?;
    Ok(())
}
