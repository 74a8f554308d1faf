//! Error types for the CTE engine.
//!
//! Every fallible core operation returns [`Result`]. Errors are synchronous and
//! raised at the point of detection; none of them leave a fragment map half
//! updated. The async command layer flattens them to `String` at its boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which input the structural parser rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseInput {
    MainQuery,
    CteDefinitions,
    SourceQuery,
    ComposedQuery,
    Fragment(String),
}

impl fmt::Display for ParseInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseInput::MainQuery => write!(f, "main query"),
            ParseInput::CteDefinitions => write!(f, "CTE definitions"),
            ParseInput::SourceQuery => write!(f, "source query"),
            ParseInput::ComposedQuery => write!(f, "composed query"),
            ParseInput::Fragment(name) => write!(f, "fragment '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CteError {
    /// The structural parser rejected one of the inputs. `message` is the
    /// parser's own message.
    #[error("failed to parse {input}: {message}")]
    Parse { input: ParseInput, message: String },

    /// A back-edge was found while ordering fragments. The path starts and
    /// ends with the same name.
    #[error("circular dependency detected: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("fragment not found: {0}")]
    NotFound(String),

    #[error("invalid fragment: {0}")]
    InvalidFragment(String),
}

impl CteError {
    pub fn parse(input: ParseInput, message: impl Into<String>) -> Self {
        CteError::Parse {
            input,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CteError>;
