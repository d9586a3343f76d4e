//! Error types for report generation
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits on the generation backend
//! - NonRetryable: configuration errors, unreadable input files
//!
//! Validation failures of a generated report are not errors here; the
//! generation loop retries them and reports exhaustion as an item outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the text-generation backend.
///
/// Any of these ends the whole batch; the loop does not retry service calls.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Generation request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Generation API rate limit exceeded")]
    RateLimited,

    #[error("Generation API returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Generation API response missing text content")]
    EmptyResponse,

    #[error("Generation API key is not configured")]
    MissingApiKey,
}

impl GenerationError {
    /// Returns true if re-running the batch later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::Network(_) | GenerationError::Timeout(_) | GenerationError::RateLimited
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            GenerationError::Network(_) => "Check your internet connection and try again.",
            GenerationError::Timeout(_) => "The generation service took too long. Try again.",
            GenerationError::RateLimited => {
                "Wait a few minutes, or raise pacingSecs in the config."
            }
            GenerationError::Backend { .. } => "Check the model name and API key.",
            GenerationError::EmptyResponse => "Try again; the model returned no text.",
            GenerationError::MissingApiKey => {
                "Set GEMINI_API_KEY in the environment or pass --api-key."
            }
        }
    }
}

/// Configuration loading/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found at {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Lab-score workbook errors.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Unsupported workbook format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Failed to open workbook: {0}")]
    Open(String),

    #[error("Workbook has no worksheets")]
    NoWorksheet,
}

/// Record table lookup errors.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("No subject identifier given")]
    MissingId,

    #[error("No record found for identifier: {0}")]
    NotFound(String),

    #[error("Failed to load records: {0}")]
    Load(String),
}

/// Top-level error surfaced by the CLI.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::Io(err.to_string())
    }
}

impl ReportError {
    /// True when rerunning later may succeed without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Generation(e) if e.is_retryable())
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ReportError::Generation(e) => e.recovery_suggestion(),
            ReportError::Config(_) => "Check your configuration in ~/.labreport/config.json",
            ReportError::Sheet(_) => "Check the workbook is a valid .xlsx file.",
            ReportError::Record(_) => "Check the record table path and identifier column.",
            ReportError::Io(_) => "Check file permissions and disk space.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout(120).is_retryable());
        assert!(GenerationError::RateLimited.is_retryable());
        assert!(!GenerationError::MissingApiKey.is_retryable());
        assert!(!GenerationError::Backend {
            status: 400,
            body: "bad".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_report_error_wraps_generation_suggestion() {
        let err: ReportError = GenerationError::MissingApiKey.into();
        assert!(err.recovery_suggestion().contains("GEMINI_API_KEY"));
        assert_eq!(err.to_string(), "Generation API key is not configured");
    }

    #[test]
    fn test_report_error_retryable_only_for_transient_generation() {
        let rate_limited: ReportError = GenerationError::RateLimited.into();
        assert!(rate_limited.is_retryable());
        let timeout: ReportError = GenerationError::Timeout(120).into();
        assert!(timeout.is_retryable());
        let missing_key: ReportError = GenerationError::MissingApiKey.into();
        assert!(!missing_key.is_retryable());
        let sheet: ReportError = SheetError::NoWorksheet.into();
        assert!(!sheet.is_retryable());
    }
}
