//! CSV writing operations.

use std::io::Write;

use polars::{frame::DataFrame, io::SerWriter, prelude::CsvWriter};

use crate::error::Result;

/// Write a DataFrame as CSV with a header row.
pub(crate) fn write_csv<W: Write>(df: &mut DataFrame, writer: W) -> Result<()> {
    CsvWriter::new(writer)
        .include_header(true)
        .finish(df)?;
    Ok(())
}
