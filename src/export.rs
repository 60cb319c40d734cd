/// CSV rendering of a history result set.
///
/// One row per reading; the header is the `Reading` field names. Timestamps
/// are RFC 3339, missing values are empty cells.

use std::io::Write;

use thiserror::Error;

use crate::model::{Reading, READING_FIELDS};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Write `readings` as CSV. The header is written even when there are no rows.
pub fn write_history_csv<W: Write>(readings: &[Reading], writer: W) -> Result<(), ExportError> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(READING_FIELDS)?;
    for reading in readings {
        csv.serialize(reading)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn history_csv(readings: &[Reading]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_history_csv(readings, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
