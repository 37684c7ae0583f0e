//! Error taxonomy for the client.
//!
//! Three outcomes are part of the public contract: [`Error::AuthExpired`]
//! (session torn down, caller should route to login), [`Error::LoadFailed`]
//! (a read failed, retry is manual), and [`Error::MutationFailed`] (a write
//! failed, caches untouched). Transport and status failures are classified
//! into one of the latter two at the typed-endpoint layer.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to the API.
#[derive(Debug, Error)]
pub enum Error {
    /// The refresh flow failed, or a replayed request was still
    /// unauthorized. The session has been cleared.
    #[error("authentication expired, please log in again")]
    AuthExpired,

    /// A collection or detail read failed for a non-auth reason. Nothing
    /// was mutated; the caller may re-issue the same query.
    #[error("load failed: {0}")]
    LoadFailed(String),

    /// A create, update, or delete call failed. Caches were left untouched.
    #[error("mutation failed: {0}")]
    MutationFailed(String),

    /// The request could not be sent or its response could not be decoded.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an unexpected status outside the auth flow.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, when one was readable.
        message: String,
    },

    /// A request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// The client was built with an unusable configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Turn a non-success response into a [`Error::Status`], keeping the
    /// body as the human-readable message.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Self::Status { status, message }
    }

    /// Classify a failure observed on a read path.
    #[must_use]
    pub(crate) fn into_load_failed(self) -> Self {
        match self {
            Self::AuthExpired | Self::LoadFailed(_) | Self::MutationFailed(_) => self,
            other => Self::LoadFailed(other.to_string()),
        }
    }

    /// Classify a failure observed on a mutation path.
    #[must_use]
    pub(crate) fn into_mutation_failed(self) -> Self {
        match self {
            Self::AuthExpired | Self::LoadFailed(_) | Self::MutationFailed(_) => self,
            other => Self::MutationFailed(other.to_string()),
        }
    }
}
