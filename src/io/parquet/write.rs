//! Parquet writing operations.

use std::io::Write;

use polars::{frame::DataFrame, prelude::ParquetWriter};

use crate::error::Result;

/// Write a DataFrame as a Parquet file.
pub(crate) fn write_parquet<W: Write>(df: &mut DataFrame, writer: W) -> Result<()> {
    ParquetWriter::new(writer).finish(df)?;
    Ok(())
}
