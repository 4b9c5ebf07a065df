use std::{fmt, sync::Arc};

/// Stable key for a zone (e.g. a county GEOID such as `"26163"`).
/// Keeps the original text, leading zeros included, behind a cheap-clone `Arc<str>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(Arc<str>);

impl ZoneId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    #[inline] pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self { Self::new(id) }
}

impl From<String> for ZoneId {
    fn from(id: String) -> Self { Self(Arc::from(id)) }
}
