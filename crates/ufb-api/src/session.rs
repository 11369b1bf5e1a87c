use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use serde_json::json;
use tracing::{error, warn};

use ufb_types::api::{OAuthExchangeRequest, TokenPair};

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "ufb_session";

pub fn encode_session(tokens: &TokenPair) -> Result<String, ApiError> {
    let raw = serde_json::to_vec(tokens).map_err(anyhow::Error::from)?;
    Ok(B64.encode(raw))
}

pub fn decode_session(value: &str) -> Option<TokenPair> {
    let raw = B64.decode(value).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// A failure that never produced an upstream response.
fn local_failure(message: String, code: &str) -> ApiError {
    error!("Session exchange failed ({}): {}", code, message);
    ApiError::Upstream {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({ "message": message, "code": code }),
    }
}

/// Trade an OAuth authorization code for a token pair via the API's own
/// sign-in route and keep the pair in a signed session cookie.
pub async fn exchange(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Json(req): Json<OAuthExchangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = format!(
        "{}/api/auth/signIn/oauth",
        state.config.session_upstream_url.trim_end_matches('/')
    );

    let resp = state
        .http
        .get(&url)
        .query(&[("code", req.code.as_str())])
        .send()
        .await
        .map_err(|e| local_failure(e.to_string(), "TransportError"))?;

    if resp.status() != StatusCode::OK {
        return Err(ApiError::from_upstream(resp).await);
    }

    let tokens: TokenPair = resp
        .json()
        .await
        .map_err(|e| local_failure(e.to_string(), "DecodeError"))?;

    let cookie = Cookie::build((SESSION_COOKIE, encode_session(&tokens)?))
        .path("/")
        .http_only(true)
        .secure(state.config.secure_cookies)
        .same_site(SameSite::Lax);

    Ok((jar.add(cookie), Json(tokens)))
}

pub async fn current(jar: SignedCookieJar) -> Result<impl IntoResponse, ApiError> {
    let cookie = jar.get(SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
    let tokens = decode_session(cookie.value()).ok_or_else(|| {
        warn!("Discarding unreadable session cookie");
        ApiError::Unauthorized
    })?;
    Ok(Json(tokens))
}

pub async fn clear(jar: SignedCookieJar) -> impl IntoResponse {
    (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), StatusCode::NO_CONTENT)
}
