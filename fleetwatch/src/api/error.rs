//! REST client errors.

/// Failure of a backend request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Envelope with `success: false`.
    #[error("backend rejected the request: {0}")]
    Rejected(String),

    /// The requested session is not in the collection.
    #[error("session {0} not found")]
    NotFound(String),

    /// Response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub(crate) fn decode(reason: impl std::fmt::Display) -> Self {
        Self::Decode(reason.to_string())
    }
}
