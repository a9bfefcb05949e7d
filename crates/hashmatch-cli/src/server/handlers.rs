use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use hashmatch_core::verify::{Verification, VerifyError};

use super::{intake, response, AppState};

/// POST /verify
pub async fn verify(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request = match intake::read_request(multipart, state.max_upload_bytes).await {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(status = err.status(), "rejected verification request: {}", err);
            return response::emit(Verification::error(&err, None));
        }
    };
    tracing::info!(url = %request.remote_url, "verification requested");

    let verifier = state.verifier;
    let verification = match tokio::task::spawn_blocking(move || verifier.verify(request)).await {
        Ok(v) => v,
        Err(join_err) => {
            let err = VerifyError::Internal(join_err.to_string());
            tracing::error!("verification task failed: {}", err);
            Verification::error(&err, None)
        }
    };
    response::emit(verification)
}

/// Any other method on /verify.
pub async fn method_not_allowed() -> Response {
    let mut res = response::emit(Verification::error(&VerifyError::MethodNotAllowed, None));
    res.headers_mut()
        .insert(header::ALLOW, header::HeaderValue::from_static("POST"));
    res
}

/// GET / -> `<static_dir>/index.html`.
pub async fn index(State(state): State<AppState>) -> Response {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(bytes) => Html(bytes).into_response(),
        Err(e) => {
            tracing::debug!(path = %path.display(), "index not served: {}", e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
