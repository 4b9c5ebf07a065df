use std::{fmt, str::FromStr};

/// Rule deciding whether a cell straddling a polygon boundary counts as covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CoveragePolicy {
    /// Covered iff the cell center is inside the polygon or on its boundary.
    #[default]
    CenterIn,
    /// Covered iff the cell footprint meets the polygon at all.
    AllTouched,
}

impl CoveragePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoveragePolicy::CenterIn => "center-in",
            CoveragePolicy::AllTouched => "all-touched",
        }
    }
}

impl fmt::Display for CoveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown coverage policy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePolicyError(pub String);

impl fmt::Display for ParsePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown coverage policy '{}' (expected center-in or all-touched)", self.0)
    }
}

impl std::error::Error for ParsePolicyError {}

impl FromStr for CoveragePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "center-in" | "centre-in" | "center" => Ok(CoveragePolicy::CenterIn),
            "all-touched" | "touched" => Ok(CoveragePolicy::AllTouched),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}
