//! Summary length presets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requested summary length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
    Xl,
    Xxl,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown length '{0}' (expected short|medium|long|xl|xxl)")]
pub struct LengthParseError(String);

impl SummaryLength {
    /// Character budget handed to the prompt builder as a hard limit.
    pub fn target_characters(&self) -> u32 {
        match self {
            SummaryLength::Short => 600,
            SummaryLength::Medium => 1500,
            SummaryLength::Long => 3000,
            SummaryLength::Xl => 6000,
            SummaryLength::Xxl => 12000,
        }
    }

    /// The CLI flag value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLength::Short => "short",
            SummaryLength::Medium => "medium",
            SummaryLength::Long => "long",
            SummaryLength::Xl => "xl",
            SummaryLength::Xxl => "xxl",
        }
    }
}

impl std::str::FromStr for SummaryLength {
    type Err = LengthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(SummaryLength::Short),
            "medium" => Ok(SummaryLength::Medium),
            "long" => Ok(SummaryLength::Long),
            "xl" => Ok(SummaryLength::Xl),
            "xxl" => Ok(SummaryLength::Xxl),
            other => Err(LengthParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_roundtrip() {
        for s in ["short", "medium", "long", "xl", "xxl"] {
            let parsed: SummaryLength = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("huge".parse::<SummaryLength>().is_err());
    }

    #[test]
    fn test_budgets_increase() {
        let budgets: Vec<u32> = [
            SummaryLength::Short,
            SummaryLength::Medium,
            SummaryLength::Long,
            SummaryLength::Xl,
            SummaryLength::Xxl,
        ]
        .iter()
        .map(|l| l.target_characters())
        .collect();
        assert!(budgets.windows(2).all(|w| w[0] < w[1]));
    }
}
