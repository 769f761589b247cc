//! Error taxonomy for inspections and record streams.
//!
//! Transport failures are classified at the adapter boundary into
//! [`HarnessError::ConnectionFailed`], [`HarnessError::AuthenticationFailed`]
//! and [`HarnessError::TargetNotFound`]; they are never passed through as raw
//! I/O errors because callers retry them differently.

use thiserror::Error;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no source adapter accepts '{uri}'")]
    NoAdapterFound { uri: String },

    #[error("connection to '{uri}' failed: {message}")]
    ConnectionFailed { uri: String, message: String },

    #[error("authentication for '{uri}' failed: {message}")]
    AuthenticationFailed { uri: String, message: String },

    #[error("'{uri}' not found")]
    TargetNotFound { uri: String },

    #[error("could not detect the format of '{name}' (reported as {reported}) and no parser was chosen")]
    FormatUndetectable { name: String, reported: String },

    #[error("no parser registered for '{mime}' (stream '{name}')")]
    ParserNotFound { mime: String, name: String },

    #[error("no entry in '{container}' matches file name filter '{filter}'")]
    NoMatchingContainerEntry { container: String, filter: String },

    #[error("configuration for '{uri}' is incomplete: missing '{parameter}'")]
    ConfigurationIncomplete { uri: String, parameter: String },

    #[error("invalid parser setting '{setting}' for '{name}': {message}")]
    InvalidParserSetting {
        name: String,
        setting: String,
        message: String,
    },

    #[error("failed to parse '{name}': {message}")]
    Parse { name: String, message: String },

    #[error("stream '{name}' cannot be read as {method}, the update method of its set")]
    UnsupportedUpdateMethod { name: String, method: String },

    /// A [`Prompter`](crate::prompt::Prompter) gave up. Prompters may leave
    /// `uri` empty; the inspector fills in the source being inspected.
    #[error("prompt for '{uri}' failed: {message}")]
    Prompt { uri: String, message: String },

    #[error("config error in '{origin}': {message}")]
    Config { origin: String, message: String },
}

impl HarnessError {
    pub fn connection(uri: impl Into<String>, err: impl std::fmt::Display) -> Self {
        HarnessError::ConnectionFailed {
            uri: uri.into(),
            message: err.to_string(),
        }
    }

    pub fn auth(uri: impl Into<String>, err: impl std::fmt::Display) -> Self {
        HarnessError::AuthenticationFailed {
            uri: uri.into(),
            message: err.to_string(),
        }
    }

    pub fn not_found(uri: impl Into<String>) -> Self {
        HarnessError::TargetNotFound { uri: uri.into() }
    }

    pub fn parse(name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        HarnessError::Parse {
            name: name.into(),
            message: err.to_string(),
        }
    }

    /// A prompter failure, not yet tied to a source.
    pub fn prompt(err: impl std::fmt::Display) -> Self {
        HarnessError::Prompt {
            uri: String::new(),
            message: err.to_string(),
        }
    }

    pub fn config(origin: impl Into<String>, message: impl Into<String>) -> Self {
        HarnessError::Config {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Attach `uri` to a prompt failure that does not name its source yet.
    pub fn for_uri(self, uri: &str) -> Self {
        match self {
            HarnessError::Prompt { uri: known, message } if known.is_empty() => {
                HarnessError::Prompt {
                    uri: uri.to_string(),
                    message,
                }
            }
            other => other,
        }
    }

    /// Classify a local I/O error for `uri`.
    pub fn from_io(uri: impl Into<String>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HarnessError::not_found(uri),
            std::io::ErrorKind::PermissionDenied => HarnessError::auth(uri, err),
            // corrupt compressed data surfaces from decoders as InvalidData
            std::io::ErrorKind::InvalidData => HarnessError::parse(uri, err),
            _ => HarnessError::connection(uri, err),
        }
    }

    /// Only connection failures are worth retrying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarnessError::ConnectionFailed { .. })
    }
}
