use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use ufb_types::api::TokenKind;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the access token from the Authorization header and
/// expose its claims to handlers as an extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode_token(&state.config.jwt_secret, token, TokenKind::Access)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
