// Error taxonomy for the feed pipeline
// Lookup -> fetch -> decode failures are reported per feed; normalization skips are never surfaced.

use std::time::Duration;

// ============================================================================
// Fetch Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Timeout { url: String, after: Duration },
    HttpStatus { url: String, code: u16 },
    Network { url: String, detail: String },
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout { url, after } => {
                write!(f, "Timed out after {}ms fetching {}", after.as_millis(), url)
            }
            FetchError::HttpStatus { url, code } => {
                write!(f, "HTTP error! status: {} from {}", code, url)
            }
            FetchError::Network { url, detail } => {
                write!(f, "Network error fetching {}: {}", url, detail)
            }
        }
    }
}

impl std::error::Error for FetchError {}

// ============================================================================
// Decode Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to decode GTFS-RT feed: {}", self.0)
    }
}

impl std::error::Error for DecodeError {}

impl From<prost::DecodeError> for DecodeError {
    fn from(e: prost::DecodeError) -> Self {
        DecodeError(e.to_string())
    }
}

// ============================================================================
// Pipeline Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    NotFound(String),
    Fetch(FetchError),
    Decode(DecodeError),
    Config(String),
    Join(String),
}

impl FeedError {
    /// Which step of the pipeline produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            FeedError::NotFound(_) => "lookup",
            FeedError::Fetch(_) => "fetch",
            FeedError::Decode(_) => "decode",
            FeedError::Config(_) => "config",
            FeedError::Join(_) => "internal",
        }
    }

    /// Status the HTTP layer should answer with when this error ends a single-feed request.
    pub fn http_status(&self) -> u16 {
        match self {
            FeedError::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Upstream HTTP status, when the upstream answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            FeedError::Fetch(e) => e.status_code(),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::NotFound(id) => write!(f, "Feed '{}' not found", id),
            FeedError::Fetch(e) => write!(f, "{}", e),
            FeedError::Decode(e) => write!(f, "{}", e),
            FeedError::Config(e) => write!(f, "Configuration error: {}", e),
            FeedError::Join(e) => write!(f, "Feed pipeline aborted: {}", e),
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedError::Fetch(e) => Some(e),
            FeedError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FetchError> for FeedError {
    fn from(e: FetchError) -> Self {
        FeedError::Fetch(e)
    }
}

impl From<DecodeError> for FeedError {
    fn from(e: DecodeError) -> Self {
        FeedError::Decode(e)
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
