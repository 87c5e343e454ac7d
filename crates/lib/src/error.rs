//! Error type shared by every backend and the operation registry.

use std::time::Duration;

/// Longest excerpt of raw tool output carried inside an error message.
pub const EXCERPT_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum BeansError {
    /// Malformed or out-of-range input, rejected before any backend call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A resolved path escapes its permitted root; rejected before any I/O.
    #[error("path escapes sandbox: {0}")]
    Sandbox(String),

    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("beans exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("beans timed out after {0:?}")]
    Timeout(Duration),

    #[error("beans output exceeded {0} bytes")]
    OutputTooLarge(usize),

    #[error("could not parse beans output ({message}): {excerpt}")]
    Parse { message: String, excerpt: String },

    /// Business-rule refusal (e.g. deleting a bean that is still active).
    #[error("refused: {0}")]
    Refused(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl BeansError {
    /// Short class name reported to clients next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            BeansError::Validation(_) => "validation",
            BeansError::Sandbox(_) => "sandbox",
            BeansError::Spawn { .. }
            | BeansError::Exit { .. }
            | BeansError::Timeout(_)
            | BeansError::OutputTooLarge(_)
            | BeansError::Parse { .. } => "tool",
            BeansError::Refused(_) => "refused",
            BeansError::NotFound(_) => "notFound",
            BeansError::Io(_) => "io",
            BeansError::Config(_) => "config",
        }
    }

    /// Build a parse error carrying a bounded excerpt of the raw output.
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        BeansError::Parse {
            message: message.into(),
            excerpt: excerpt(raw),
        }
    }
}

/// First [`EXCERPT_LIMIT`] characters of `raw`, trimmed, with an ellipsis when cut.
pub fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out: String = trimmed.chars().take(EXCERPT_LIMIT).collect();
    if trimmed.chars().count() > EXCERPT_LIMIT {
        out.push('…');
    }
    out
}
