pub mod cancel;
pub mod client;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod schema;

pub use cancel::*;
pub use client::*;
pub use orchestrator::*;
pub use parser::*;
pub use prompt::*;
pub use schema::*;

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::enums::GuidanceDomain;

/// Why a generation call produced no usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationFailureKind {
    /// Connection failure, timeout, or non-2xx status.
    Transport,
    /// 2xx response whose body has no candidate text.
    Shape,
    /// The caller cancelled the request.
    Cancelled,
}

impl std::fmt::Display for GenerationFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport",
            Self::Shape => "shape",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Error, Debug)]
pub enum GuidanceError {
    #[error("Generation failed ({kind}): {detail}")]
    Generation {
        kind: GenerationFailureKind,
        detail: String,
    },

    #[error("Could not extract {domain} response, missing fields: {}", .missing.join(", "))]
    Parse {
        domain: GuidanceDomain,
        missing: Vec<String>,
    },

    #[error("Extracted {domain} response is incomplete: {reason}")]
    Validation {
        domain: GuidanceDomain,
        reason: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GuidanceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            GuidanceError::Generation {
                kind: GenerationFailureKind::Cancelled,
                ..
            }
        )
    }
}
