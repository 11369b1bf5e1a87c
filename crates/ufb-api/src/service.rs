use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use ufb_db::models::{CustomAuthRow, NewUser, ServiceRow};
use ufb_types::api::{
    Claims, CustomAuthResponse, ServiceResponse, SetupServiceRequest, UpdateCustomAuthRequest,
    UpdateServiceRequest,
};
use ufb_types::models::{Permission, UserType};
use ufb_types::timezone::TimezoneOffset;

use crate::auth::{hash_password, issue_tokens, validate_email, validate_password};
use crate::error::ApiError;
use crate::permissions::authorize;
use crate::state::AppState;

fn service_view(row: ServiceRow) -> ServiceResponse {
    let timezone_offset = row.timezone_offset.parse().unwrap_or_else(|e| {
        warn!("Corrupt service timezone: {}", e);
        TimezoneOffset::UTC
    });
    ServiceResponse {
        name: row.name,
        description: row.description,
        logo_url: row.logo_url,
        timezone_offset,
    }
}

fn custom_auth_view(row: Option<CustomAuthRow>) -> CustomAuthResponse {
    match row {
        Some(row) => CustomAuthResponse {
            enabled: row.enabled,
            authorize_url: row.authorize_url,
            token_url: row.token_url,
            userinfo_url: row.userinfo_url,
            client_id: row.client_id,
            client_secret_set: !row.client_secret.is_empty(),
            scope: row.scope,
            email_key: row.email_key,
        },
        None => CustomAuthResponse {
            enabled: false,
            authorize_url: String::new(),
            token_url: String::new(),
            userinfo_url: String::new(),
            client_id: String::new(),
            client_secret_set: false,
            scope: String::new(),
            email_key: "email".to_string(),
        },
    }
}

fn required_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("service name is required"));
    }
    Ok(name.to_string())
}

/// The service's configured offset, UTC when the service isn't set up yet.
pub fn service_offset(db: &ufb_db::Database) -> anyhow::Result<TimezoneOffset> {
    Ok(db
        .get_service()?
        .map(|row| service_view(row).timezone_offset)
        .unwrap_or(TimezoneOffset::UTC))
}

pub async fn get(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .with_db(|db| db.get_service())
        .await?
        .ok_or_else(|| ApiError::not_found("service is not set up"))?;
    Ok(Json(service_view(row)))
}

/// One-time bootstrap: creates the service and its first SUPER user.
pub async fn setup(
    State(state): State<AppState>,
    Json(req): Json<SetupServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_name(&req.name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let password_hash = hash_password(&req.password)?;
    let offset = req.timezone_offset.unwrap_or(TimezoneOffset::UTC);

    let user_id = Uuid::new_v4();
    let key = email.clone();
    state
        .with_db(move |db| {
            if db.get_user_by_email(&key)?.is_some() {
                return Err(ApiError::conflict("email already registered"));
            }
            let id = user_id.to_string();
            let owner = NewUser {
                id: &id,
                email: &key,
                user_type: UserType::Super.as_str(),
                password_hash: Some(password_hash.as_str()),
            };
            let created = db.setup_service(
                &name,
                req.description.as_deref(),
                req.logo_url.as_deref(),
                &offset.to_string(),
                &owner,
            )?;
            if !created {
                return Err(ApiError::conflict("service is already set up"));
            }
            info!("Service '{}' set up by {}", name, key);
            Ok(())
        })
        .await?;

    let tokens = issue_tokens(&state.config, user_id, &email)?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateServiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;
    let name = required_name(&req.name)?;

    let row = state
        .with_db(move |db| {
            let updated = db.update_service(
                &name,
                req.description.as_deref(),
                req.logo_url.as_deref(),
                &req.timezone_offset.to_string(),
            )?;
            if !updated {
                return Err(ApiError::not_found("service is not set up"));
            }
            db.get_service()?
                .ok_or_else(|| ApiError::not_found("service is not set up"))
        })
        .await?;
    Ok(Json(service_view(row)))
}

pub async fn get_oauth(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;
    let row = state.with_db(|db| db.get_custom_auth()).await?;
    Ok(Json(custom_auth_view(row)))
}

/// Replace the OAuth provider settings. An omitted client secret keeps the
/// stored one.
pub async fn update_oauth(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateCustomAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    if req.enabled {
        for (label, url) in [
            ("authorizeUrl", &req.authorize_url),
            ("tokenUrl", &req.token_url),
            ("userinfoUrl", &req.userinfo_url),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| ApiError::bad_request(format!("invalid {}: {}", label, e)))?;
        }
        if req.client_id.trim().is_empty() {
            return Err(ApiError::bad_request("clientId is required"));
        }
    }
    if req.email_key.trim().is_empty() {
        return Err(ApiError::bad_request("emailKey is required"));
    }

    let row = state
        .with_db(move |db| {
            let client_secret = match req.client_secret {
                Some(secret) => secret,
                None => db
                    .get_custom_auth()?
                    .map(|existing| existing.client_secret)
                    .unwrap_or_default(),
            };
            db.upsert_custom_auth(&CustomAuthRow {
                enabled: req.enabled,
                authorize_url: req.authorize_url,
                token_url: req.token_url,
                userinfo_url: req.userinfo_url,
                client_id: req.client_id,
                client_secret,
                scope: req.scope,
                email_key: req.email_key.trim().to_string(),
            })?;
            db.get_custom_auth()
        })
        .await?;

    info!("OAuth provider settings updated by {}", claims.sub);
    Ok(Json(custom_auth_view(row)))
}
