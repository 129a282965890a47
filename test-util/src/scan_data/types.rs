#[derive(Debug, thiserror::Error)]
pub(super) enum Error {
    #[error(transparent)]
    CsvError(#[from] csv::Error),

    #[error("no scan file {0}")]
    MissingFile(String),
}
