use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::{AppError, AuthError};
use crate::webhook::signer::{HmacSigner, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Largest body the authenticator will buffer
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Reject any request whose `X-Timestamp`/`X-Signature` headers do not
/// authenticate the raw body. The body is buffered, verified, and handed
/// on unchanged.
pub async fn hmac_auth(
    State(signer): State<HmacSigner>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AuthError::UnreadableBody)?;

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    if let Err(reason) = signer.verify(
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
        &bytes,
        now_ms,
    ) {
        warn!(path = %parts.uri.path(), %reason, "Rejected unauthenticated request");
        return Err(reason.into());
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}
