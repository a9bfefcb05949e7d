//! Response emitter: `Verification` -> HTTP response.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use hashmatch_core::verify::{Verification, VerificationResult, VerifyError};

pub fn emit(verification: Verification) -> Response {
    emit_with(verification, |result| {
        serde_json::to_vec(result).map_err(|e| e.to_string())
    })
}

/// JSON body with the chosen status. If encoding fails the caller still gets
/// the error message as plain text; a success that cannot be encoded
/// becomes a 500.
pub(crate) fn emit_with<F>(verification: Verification, encode: F) -> Response
where
    F: FnOnce(&VerificationResult) -> Result<Vec<u8>, String>,
{
    let status =
        StatusCode::from_u16(verification.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let succeeded = verification.is_success();
    match encode(&verification.result) {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            let encode_err = VerifyError::Encode(e);
            tracing::error!("{}", encode_err);
            let (status, message) = match verification.result.error {
                Some(original) if !succeeded => (status, original),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, encode_err.to_string()),
            };
            (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                message,
            )
                .into_response()
        }
    }
}
