use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use ufb_db::models::CustomAuthRow;
use ufb_types::api::{OAuthLoginUrlQuery, OAuthLoginUrlResponse, OAuthSignInQuery};
use ufb_types::models::UserType;

use crate::auth::{issue_tokens, validate_email};
use crate::error::ApiError;
use crate::state::AppState;

/// Provider name recorded on linked accounts.
pub const PROVIDER: &str = "oauth";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn enabled_provider(state: &AppState) -> Result<CustomAuthRow, ApiError> {
    state
        .with_db(|db| db.get_custom_auth())
        .await?
        .filter(|auth| auth.enabled)
        .ok_or_else(|| ApiError::bad_request("oauth sign-in is not enabled"))
}

/// Authorize URL the browser is sent to.
pub fn build_login_url(auth: &CustomAuthRow, callback_url: Option<&str>) -> Result<String, ApiError> {
    let mut params = vec![
        ("response_type", "code"),
        ("client_id", auth.client_id.as_str()),
    ];
    if let Some(callback) = callback_url {
        params.push(("redirect_uri", callback));
    }
    if !auth.scope.is_empty() {
        params.push(("scope", auth.scope.as_str()));
    }

    let url = reqwest::Url::parse_with_params(&auth.authorize_url, &params)
        .map_err(|e| ApiError::bad_request(format!("invalid authorize url: {}", e)))?;
    Ok(url.into())
}

/// Follow a dotted key path (`data.account.email`) into a userinfo payload.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Stable provider-side account id: `sub`, then `id`, else the email.
fn provider_account_id(userinfo: &Value, email: &str) -> String {
    ["sub", "id"]
        .iter()
        .find_map(|key| match userinfo.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| email.to_string())
}

fn transport_error(e: reqwest::Error) -> ApiError {
    warn!("OAuth provider request failed: {}", e);
    ApiError::Upstream {
        status: StatusCode::BAD_GATEWAY,
        body: json!({ "message": "oauth provider unreachable" }),
    }
}

pub async fn login_url(
    State(state): State<AppState>,
    Query(query): Query<OAuthLoginUrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = enabled_provider(&state).await?;
    let url = build_login_url(&auth, query.callback_url.as_deref())?;
    Ok(Json(OAuthLoginUrlResponse { url }))
}

/// Exchange the authorization code, read the user's email from the
/// provider and sign them in, creating the user on first visit.
pub async fn sign_in(
    State(state): State<AppState>,
    Query(query): Query<OAuthSignInQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = enabled_provider(&state).await?;

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", query.code.as_str()),
    ];
    if let Some(callback) = query.callback_url.as_deref() {
        form.push(("redirect_uri", callback));
    }

    let resp = state
        .http
        .post(&auth.token_url)
        .basic_auth(&auth.client_id, Some(&auth.client_secret))
        .form(&form)
        .send()
        .await
        .map_err(transport_error)?;
    if !resp.status().is_success() {
        return Err(ApiError::from_upstream(resp).await);
    }
    let token: TokenResponse = resp.json().await.map_err(transport_error)?;

    let resp = state
        .http
        .get(&auth.userinfo_url)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .map_err(transport_error)?;
    if !resp.status().is_success() {
        return Err(ApiError::from_upstream(resp).await);
    }
    let userinfo: Value = resp.json().await.map_err(transport_error)?;

    let email = lookup_path(&userinfo, &auth.email_key)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request(format!("userinfo has no '{}'", auth.email_key)))?;
    let email = validate_email(email)?;
    let account_id = provider_account_id(&userinfo, &email);

    let (user_id, user_email) = state
        .with_db(move |db| {
            let linked = match db.find_account_user(PROVIDER, &account_id)? {
                Some(id) => db.get_user_by_id(&id)?,
                None => None,
            };
            let existing = match linked {
                Some(user) => Some(user),
                None => db.get_user_by_email(&email)?,
            };
            let (id, email) = match existing {
                Some(user) => (user.id, user.email),
                None => {
                    let id = Uuid::new_v4().to_string();
                    db.create_user(&id, &email, UserType::General.as_str(), None)?;
                    info!("Created user {} from oauth sign-in", id);
                    (id, email)
                }
            };
            db.link_account(&id, PROVIDER, &account_id)?;
            Ok::<_, anyhow::Error>((id, email))
        })
        .await?;

    let user_id: Uuid = user_id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user_id, e))?;
    Ok(Json(issue_tokens(&state.config, user_id, &user_email)?))
}
