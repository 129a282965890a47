use include_dir::{Dir, include_dir};
use lazy_static::lazy_static;
use std::path::Path;

mod csv_parser;
mod dataset;
mod record;
mod types;

pub use dataset::scan_dataset;
pub use record::ScanRecord;
use types::Error;

const SCANS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/../test-data/scans");

fn try_scan_records<P>(path: P) -> Result<Vec<ScanRecord>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = SCANS_DIR
        .get_file(path)
        .ok_or_else(|| Error::MissingFile(path.display().to_string()))?;
    csv_parser::records_from_reader(file.contents())
}

/// Records of a scan file, e.g. `scan_a.csv`
pub fn scan_records<P>(path: P) -> Vec<ScanRecord>
where
    P: AsRef<Path>,
{
    try_scan_records(path).unwrap()
}

pub fn iter_scans() -> impl Iterator<Item = (String, Vec<ScanRecord>)> {
    SCANS_DIR.find("**/*.csv").unwrap().filter_map(|entry| {
        let path = entry.as_file()?.path();
        Some((path.to_str()?.to_owned(), try_scan_records(path).ok()?))
    })
}

/// Distinct run IDs of the records in order of appearance
pub fn scan_run_ids(records: &[ScanRecord]) -> Vec<i32> {
    csv_parser::run_ids(records)
}

lazy_static! {
    pub static ref ALL_SCANS: Vec<(String, Vec<ScanRecord>)> = {
        let mut scans: Vec<_> = iter_scans().collect();
        scans.sort_by(|a, b| a.0.cmp(&b.0));
        scans
    };
}
