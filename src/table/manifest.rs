use std::{fs, io::Read, path::Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{config::ZonalConfig, error::Result};
use super::ResultTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHash {
    pub sha256: String,
}

impl FileHash {
    /// Hash a file's contents.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self { sha256: hex::encode(hasher.finalize()) })
    }
}

/// Sidecar written next to every result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    /// File name of the table, relative to the manifest.
    pub table: String,
    pub format: String,
    pub version: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub total_converted: f64,
    #[serde(default)]
    pub imprecise_zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    pub file: FileHash,
}

impl TableManifest {
    pub(crate) fn new(table: &ResultTable, file_name: &str, format: &str, file: FileHash) -> Result<Self> {
        Ok(Self {
            table: file_name.to_string(),
            format: format.to_string(),
            version: "1".into(),
            rows: table.len(),
            columns: table.column_names(),
            total_converted: table.total_converted(),
            imprecise_zones: table.imprecise().iter().map(|id| id.to_string()).collect(),
            config: table.config().map(serde_json::to_value::<&ZonalConfig>).transpose()?,
            file,
        })
    }

    /// Read a manifest written by [`write_table`](super::write_table).
    pub fn read(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Whether the table at `path` still matches the recorded hash.
    pub fn verify(&self, path: &Path) -> Result<bool> {
        Ok(FileHash::of_file(path)? == self.file)
    }
}
