//! Verification pipeline: hash the local upload, fetch and hash the remote
//! file, compare.
//!
//! Steps run strictly in order and the first failure ends the run. Whatever
//! was already computed (the local digest) is kept in the result.

use crate::checksum::{self, StreamDigest};
use crate::config::HashmatchConfig;
use crate::fetch::{FetchError, FetchOptions, RemoteFetcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use thiserror::Error;

/// Every way a verification can fail.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("request parameter '{0}' must not be empty")]
    MissingParameter(&'static str),
    #[error("request body too large (max {limit})")]
    PayloadTooLarge { limit: String },
    #[error("could not parse form data: {0}")]
    MalformedRequest(String),
    #[error("only POST is supported")]
    MethodNotAllowed,
    #[error("failed to hash local file: {0}")]
    LocalRead(#[source] io::Error),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to encode response: {0}")]
    Encode(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl VerifyError {
    /// HTTP status reported for this failure.
    pub fn status(&self) -> u16 {
        match self {
            VerifyError::MissingParameter(_)
            | VerifyError::PayloadTooLarge { .. }
            | VerifyError::MalformedRequest(_) => 400,
            VerifyError::MethodNotAllowed => 405,
            VerifyError::LocalRead(_) | VerifyError::Encode(_) | VerifyError::Internal(_) => 500,
            VerifyError::Fetch(e) => e.status(),
        }
    }

    pub fn payload_too_large(limit_bytes: u64) -> Self {
        VerifyError::PayloadTooLarge {
            limit: crate::config::format_bytes(limit_bytes),
        }
    }
}

/// One verification call: the local upload and where to fetch its twin.
pub struct VerificationRequest {
    pub local: Box<dyn Read + Send>,
    pub remote_url: String,
}

impl VerificationRequest {
    pub fn new(local: impl Read + Send + 'static, remote_url: impl Into<String>) -> Self {
        Self {
            local: Box::new(local),
            remote_url: remote_url.into(),
        }
    }
}

impl fmt::Debug for VerificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationRequest")
            .field("remote_url", &self.remote_url)
            .finish_non_exhaustive()
    }
}

/// Body returned to the caller. Digests that were not computed are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(rename = "local_file_hash")]
    pub local_digest: String,
    #[serde(rename = "remote_file_hash")]
    pub remote_digest: String,
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    /// Successful comparison. `matched` is derived, never passed in.
    pub fn compared(local_digest: String, remote_digest: String) -> Self {
        let matched = local_digest == remote_digest;
        Self {
            local_digest,
            remote_digest,
            matched,
            error: None,
        }
    }

    /// Failed run; keeps the local digest if it was already computed.
    pub fn failed(err: &VerifyError, local_digest: Option<String>) -> Self {
        Self {
            local_digest: local_digest.unwrap_or_default(),
            remote_digest: String::new(),
            matched: false,
            error: Some(err.to_string()),
        }
    }
}

/// Outcome of a run: the body plus the HTTP status chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub status: u16,
    pub result: VerificationResult,
}

impl Verification {
    pub fn ok(result: VerificationResult) -> Self {
        Self {
            status: 200,
            result,
        }
    }

    pub fn error(err: &VerifyError, local_digest: Option<String>) -> Self {
        Self {
            status: err.status(),
            result: VerificationResult::failed(err, local_digest),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Runs the local-then-remote comparison. Holds only the fetcher
/// configuration, so one value serves any number of concurrent calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier {
    fetcher: RemoteFetcher,
}

impl Verifier {
    pub fn new(fetcher: RemoteFetcher) -> Self {
        Self { fetcher }
    }

    pub fn from_config(cfg: &HashmatchConfig) -> Self {
        Self::new(RemoteFetcher::new(FetchOptions::from(cfg)))
    }

    /// Blocking: reads the local stream and performs the remote transfer on
    /// the current thread.
    pub fn verify(&self, request: VerificationRequest) -> Verification {
        let VerificationRequest { local, remote_url } = request;
        let span = tracing::info_span!("verify", url = %remote_url);
        let _enter = span.enter();

        let local_digest = match checksum::sha256_reader(local) {
            Ok(d) => d,
            Err(e) => {
                let err = VerifyError::LocalRead(e);
                tracing::warn!("local digest failed: {}", err);
                return Verification::error(&err, None);
            }
        };
        tracing::debug!(local = %local_digest, "local file hashed");

        let mut remote = StreamDigest::new();
        if let Err(e) = self.fetcher.fetch_to(&remote_url, &mut remote) {
            if e.is_body_read() {
                tracing::warn!(local = %local_digest, "remote body cut short: {}", e);
            } else {
                tracing::warn!(local = %local_digest, status = e.status(), "fetch failed: {}", e);
            }
            let err = VerifyError::from(e);
            return Verification::error(&err, Some(local_digest));
        }
        let bytes = remote.bytes();
        let remote_digest = remote.finish_hex();
        tracing::debug!(remote = %remote_digest, bytes, "remote file hashed");

        let result = VerificationResult::compared(local_digest, remote_digest);
        tracing::info!(matched = result.matched, "verification complete");
        Verification::ok(result)
    }
}
