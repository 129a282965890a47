pub use scan_data::{
    ALL_SCANS, ScanRecord, iter_scans, scan_dataset, scan_records, scan_run_ids,
};

mod scan_data;
