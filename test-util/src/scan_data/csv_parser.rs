use crate::scan_data::{Error, ScanRecord};

use itertools::Itertools;
use std::io::Read;

pub(super) fn records_from_reader<R>(reader: R) -> Result<Vec<ScanRecord>, Error>
where
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new().from_reader(reader);
    let records = csv_reader
        .deserialize()
        .collect::<Result<Vec<ScanRecord>, _>>()?;
    Ok(records)
}

pub(super) fn run_ids(records: &[ScanRecord]) -> Vec<i32> {
    records
        .iter()
        .map(|record| record.run_id)
        .dedup()
        .collect()
}
