//! Parquet writing.
//!
//! This module is only available when the `parquet` feature is enabled.

mod write;

pub(crate) use write::*;
