//! Error types for listing fetches.

use serde::Serialize;

/// Why a listing could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FetchError {
    /// Couldn't reach the system.
    Connection { url: String, message: String },
    /// The system answered with an error.
    Remote { code: u16, message: String },
    /// The listing was cancelled before it finished.
    Cancelled { query: String },
    /// The listed entity no longer exists.
    NotFound { query: String },
}

impl FetchError {
    /// Returns a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection { url, .. } => format!("Error: Check connection to {}", url),
            Self::Remote { code, message } => format!("Error {}: {}", code, message),
            Self::Cancelled { .. } => "Fetching was cancelled.".to_string(),
            Self::NotFound { query } => format!("{} no longer exists.", query),
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection { url, message } => write!(f, "connection to {url} failed: {message}"),
            Self::Remote { code, message } => write!(f, "remote error {code}: {message}"),
            Self::Cancelled { query } => write!(f, "fetch cancelled: {query}"),
            Self::NotFound { query } => write!(f, "not found: {query}"),
        }
    }
}

impl std::error::Error for FetchError {}
