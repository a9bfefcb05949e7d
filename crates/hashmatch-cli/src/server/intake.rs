//! Request intake: turn a multipart upload into a `VerificationRequest`.
//!
//! The whole body is read before any hashing so size and shape errors are
//! reported first. The file part is spooled (memory, then a temp file);
//! once the spool is on disk, writes move to the blocking pool.

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use hashmatch_core::verify::{VerificationRequest, VerifyError};
use axum::body::Bytes;
use std::io::{Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

pub const URL_FIELD: &str = "remote_file_url";
pub const FILE_FIELD: &str = "local_file";

/// Uploads larger than this are moved from memory to a temp file.
const SPOOL_IN_MEMORY: usize = 1 << 20;

fn classify(err: MultipartError, max_upload_bytes: u64) -> VerifyError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        VerifyError::payload_too_large(max_upload_bytes)
    } else {
        VerifyError::MalformedRequest(err.body_text())
    }
}

async fn spool_chunk(
    mut spool: SpooledTempFile,
    chunk: Bytes,
) -> Result<SpooledTempFile, VerifyError> {
    if !spool.is_rolled() {
        spool.write_all(&chunk).map_err(VerifyError::LocalRead)?;
        return Ok(spool);
    }
    tokio::task::spawn_blocking(move || spool.write_all(&chunk).map(|()| spool))
        .await
        .map_err(|e| VerifyError::Internal(e.to_string()))?
        .map_err(VerifyError::LocalRead)
}

pub async fn read_request(
    multipart: Result<Multipart, MultipartRejection>,
    max_upload_bytes: u64,
) -> Result<VerificationRequest, VerifyError> {
    let mut multipart =
        multipart.map_err(|rejection| VerifyError::MalformedRequest(rejection.body_text()))?;

    let mut remote_url: Option<String> = None;
    let mut local: Option<SpooledTempFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| classify(e, max_upload_bytes))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            URL_FIELD => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| classify(e, max_upload_bytes))?;
                remote_url = Some(text);
            }
            FILE_FIELD => {
                let mut spool = SpooledTempFile::new(SPOOL_IN_MEMORY);
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| classify(e, max_upload_bytes))?
                {
                    spool = spool_chunk(spool, chunk).await?;
                }
                local = Some(spool);
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    let remote_url = remote_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(VerifyError::MissingParameter(URL_FIELD))?;
    let mut local = local.ok_or(VerifyError::MissingParameter(FILE_FIELD))?;
    local
        .seek(SeekFrom::Start(0))
        .map_err(VerifyError::LocalRead)?;

    Ok(VerificationRequest::new(local, remote_url))
}
