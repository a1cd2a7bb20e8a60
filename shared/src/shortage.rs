use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShortagePriority {
    Critical,
    High,
    Medium,
    Low,
}

impl ShortagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// Sort key, most urgent first. Unknown priorities sort last.
    pub fn rank(value: &str) -> u8 {
        match value.parse::<ShortagePriority>() {
            Ok(Self::Critical) => 0,
            Ok(Self::High) => 1,
            Ok(Self::Medium) => 2,
            Ok(Self::Low) => 3,
            Err(_) => 4,
        }
    }
}

impl FromStr for ShortagePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(format!("unknown priority {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShortageResolution {
    Pending,
    #[default]
    Resolved,
    Ignored,
    Escalated,
}

impl ShortageResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
            Self::Ignored => "IGNORED",
            Self::Escalated => "ESCALATED",
        }
    }
}

impl fmt::Display for ShortageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the `status` query parameter narrows the shortage list.
///
/// Rows written by the inventory check before resolution tracking existed
/// have no resolution status at all, and count as pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    PendingOrUnset,
    All,
    Exactly(String),
}

impl StatusFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::PendingOrUnset,
            Some(s) if s.eq_ignore_ascii_case("PENDING") => Self::PendingOrUnset,
            Some(s) if s.eq_ignore_ascii_case("ALL") => Self::All,
            Some(s) => Self::Exactly(s.to_string()),
        }
    }
}
