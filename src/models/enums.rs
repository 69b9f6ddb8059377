use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: '{value}'")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + case-insensitive std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($s) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(InvalidEnum {
                    field: stringify!($name).into(),
                    value: s.into(),
                })
            }
        }
    };
}

// Declaration order is the severity order: LOW < MEDIUM < HIGH < CRITICAL.
str_enum!(Severity {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Critical => "CRITICAL",
});

str_enum!(GuidanceDomain {
    Symptom => "symptom",
    Risk => "risk",
    Emergency => "emergency",
    Plan => "plan",
    Advice => "advice",
    MentalHealth => "mental_health",
    Nutrition => "nutrition",
});

impl GuidanceDomain {
    pub const ALL: [GuidanceDomain; 7] = [
        GuidanceDomain::Symptom,
        GuidanceDomain::Risk,
        GuidanceDomain::Emergency,
        GuidanceDomain::Plan,
        GuidanceDomain::Advice,
        GuidanceDomain::MentalHealth,
        GuidanceDomain::Nutrition,
    ];
}
