//! CSV writing.

mod write;

pub(crate) use write::*;
