//! Error taxonomy shared by the client, the data API and both publishers.
//!
//! Every pipeline step fails fast: nothing is retried, and the error carries
//! enough context (step description, offending path, HTTP status) for the
//! caller to report it.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// A single entry of the `errors` array in a Hub error document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body the Hub returns alongside a non-2xx status.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorDocument {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// Missing or invalid configuration, raised before any network I/O.
    #[error("{0}")]
    Config(String),

    #[error("No authentication credentials configured")]
    NoCredentials,

    /// Connect, timeout, DNS or TLS failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response from the Hub.
    #[error("{message} ({status})")]
    Hub {
        status: u16,
        message: String,
        errors: Vec<FieldError>,
    },

    /// A response violated a precondition of the pipeline.
    #[error("{0}")]
    Invariant(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A 2xx response whose body could not be interpreted.
    #[error("invalid response: {0}")]
    Decode(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PublishError>,
    },
}

impl PublishError {
    /// Build a `Hub` error from a status code and the raw response body.
    ///
    /// The body is parsed as the Hub's JSON error document; anything else is
    /// kept verbatim as the message.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorDocument>(body) {
            Ok(doc) => PublishError::Hub {
                status,
                message: doc
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("HTTP {status}")),
                errors: doc.errors,
            },
            Err(_) => PublishError::Hub {
                status,
                message: if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.trim().to_string()
                },
                errors: Vec::new(),
            },
        }
    }

    /// Wrap the error with a description of the step that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        PublishError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// HTTP status of the underlying Hub error, looking through context layers.
    pub fn status(&self) -> Option<u16> {
        match self {
            PublishError::Hub { status, .. } => Some(*status),
            PublishError::Context { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Attach step context to the error side of a result.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T, PublishError>;
}

impl<T> ResultExt<T> for Result<T, PublishError> {
    fn context(self, context: &str) -> Result<T, PublishError> {
        self.map_err(|e| e.context(context))
    }
}
