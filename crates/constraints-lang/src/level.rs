//! Language levels and the syntax features they gate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target language level.
///
/// Resolved once per process; every unit in every bundle is lexed and
/// parsed at the same level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LanguageLevel {
    #[serde(rename = "2019")]
    L2019,
    #[serde(rename = "2020")]
    L2020,
    #[default]
    #[serde(rename = "2021")]
    L2021,
    #[serde(rename = "2022")]
    L2022,
}

/// Syntax features that only exist from a given level on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// `a ** b`
    ExponentOperator,
    /// `1_000_000`
    NumericSeparators,
    /// `f(a, b,)` and `fn f(a: T,)`
    TrailingCommas,
}

impl Feature {
    pub fn minimum_level(self) -> LanguageLevel {
        match self {
            Feature::ExponentOperator => LanguageLevel::L2020,
            Feature::NumericSeparators => LanguageLevel::L2021,
            Feature::TrailingCommas => LanguageLevel::L2022,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Feature::ExponentOperator => "the '**' operator",
            Feature::NumericSeparators => "numeric separators",
            Feature::TrailingCommas => "trailing commas in parameter and argument lists",
        }
    }
}

impl LanguageLevel {
    pub const ALL: [LanguageLevel; 4] = [
        LanguageLevel::L2019,
        LanguageLevel::L2020,
        LanguageLevel::L2021,
        LanguageLevel::L2022,
    ];

    pub fn supports(self, feature: Feature) -> bool {
        self >= feature.minimum_level()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageLevel::L2019 => "2019",
            LanguageLevel::L2020 => "2020",
            LanguageLevel::L2021 => "2021",
            LanguageLevel::L2022 => "2022",
        }
    }

    /// Message reported when `feature` is used below its level.
    pub fn unsupported_message(self, feature: Feature) -> String {
        format!(
            "{} requires language level {} or later (current level is {})",
            feature.description(),
            feature.minimum_level(),
            self
        )
    }
}

impl fmt::Display for LanguageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language level '{0}' (expected one of 2019, 2020, 2021, 2022)")]
pub struct UnknownLevel(pub String);

impl FromStr for LanguageLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        LanguageLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == trimmed)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}
