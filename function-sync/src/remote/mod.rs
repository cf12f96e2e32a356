//! Remote function service access.
//!
//! The engine only talks to the service through [`FunctionClient`], so the
//! watch loop can be exercised against an in-memory double in tests.

pub mod download;
pub mod lambda;

use crate::utils::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use download::PackageDownloader;
pub use lambda::LambdaClient;

/// Provider error code for "an update is already in progress".
pub const CONFLICT_CODE: &str = "ResourceConflictException";

/// Code used when no credentials could be resolved for a request.
pub const CREDENTIALS_CODE: &str = "CredentialsError";

/// Error codes for bad, expired or missing credentials.
pub const AUTH_ERROR_CODES: &[&str] = &[
    CREDENTIALS_CODE,
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "AccessDeniedException",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
];

pub fn is_auth_code(code: Option<&str>) -> bool {
    code.is_some_and(|code| AUTH_ERROR_CODES.contains(&code))
}

/// A push rejected by the provider or lost in transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    /// Provider error code, or `Network` for transport failures
    pub code: String,

    pub message: String,

    /// Transport-level failures (timeouts, resets) are safe to retry
    pub retryable: bool,
}

/// Result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { detail: Option<String> },

    /// The push overlapped an update that is still in flight.
    Conflict { detail: Option<String> },

    Failure(RemoteFailure),
}

impl RemoteFailure {
    /// Retrying cannot help; the process has to stop.
    pub fn is_authentication(&self) -> bool {
        is_auth_code(Some(self.code.as_str()))
    }
}

impl UploadOutcome {
    pub fn network_failure(message: impl Into<String>) -> Self {
        UploadOutcome::Failure(RemoteFailure {
            code: "Network".to_string(),
            message: message.into(),
            retryable: true,
        })
    }
}

#[async_trait]
pub trait FunctionClient: Send + Sync {
    /// Retrievable location of the currently deployed package.
    async fn fetch_package_location(&self, function_identifier: &str) -> Result<String>;

    /// Package bytes behind a location returned by `fetch_package_location`.
    async fn download(&self, url: &str) -> Result<Bytes>;

    /// Replace the function's code with `package`.
    async fn push_package(&self, function_identifier: &str, package: Vec<u8>) -> UploadOutcome;
}
