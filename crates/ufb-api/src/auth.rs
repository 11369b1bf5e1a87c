use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::SaltString,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use ufb_types::api::{
    Claims, CodeIssuedResponse, EmailCodeRequest, EmailSignInRequest, EmailSignUpRequest,
    InvitationSignUpRequest, ResetPasswordRequest, TokenKind, TokenPair, VerifyEmailCodeRequest,
};
use ufb_db::models::NewUser;
use ufb_types::models::{CodeType, UserType};

use crate::codes;
use crate::error::ApiError;
use crate::state::{ApiConfig, AppState};

pub const MIN_PASSWORD_LENGTH: usize = 8;

// -- Tokens --

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    kind: TokenKind,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        kind,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn issue_tokens(config: &ApiConfig, user_id: Uuid, email: &str) -> Result<TokenPair, ApiError> {
    Ok(TokenPair {
        access_token: create_token(&config.jwt_secret, user_id, email, TokenKind::Access, config.access_token_ttl)?,
        refresh_token: create_token(&config.jwt_secret, user_id, email, TokenKind::Refresh, config.refresh_token_ttl)?,
    })
}

/// Validate signature and expiry, and reject a token of the wrong kind so a
/// refresh token can't be used as an access token or vice versa.
pub fn decode_token(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    if data.claims.kind != expected {
        return Err(ApiError::Unauthorized);
    }
    Ok(data.claims)
}

// -- Credentials --

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| anyhow::anyhow!("salt encoding failed: {}", e))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Trim and lowercase an email, requiring a non-empty local part and domain.
pub fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.contains(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(ApiError::bad_request("invalid email")),
    }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

// -- Handlers --

pub async fn send_email_code(
    State(state): State<AppState>,
    Json(req): Json<EmailCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;

    let key = email.clone();
    let issued = state
        .with_db(move |db| {
            if db.get_user_by_email(&key)?.is_some() {
                return Err(ApiError::conflict("email already registered"));
            }
            codes::set_code(db, CodeType::EmailVerification, &key, None, Utc::now())
        })
        .await?;

    state.mailer.send_code(&email, CodeType::EmailVerification, &issued.code)?;

    Ok(Json(CodeIssuedResponse {
        expired_at: issued.expired_at,
    }))
}

pub async fn verify_email_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    state
        .with_db(move |db| {
            codes::verify_code(db, CodeType::EmailVerification, &email, req.code.trim(), Utc::now())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sign_up_email(
    State(state): State<AppState>,
    Json(req): Json<EmailSignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();
    let key = email.clone();
    state
        .with_db(move |db| {
            if !codes::is_verified(db, CodeType::EmailVerification, &key, Utc::now())? {
                return Err(ApiError::bad_request("email not verified"));
            }
            if db.get_user_by_email(&key)?.is_some() {
                return Err(ApiError::conflict("email already registered"));
            }
            db.create_user(
                &user_id.to_string(),
                &key,
                UserType::General.as_str(),
                Some(&password_hash),
            )?;
            codes::consume(db, CodeType::EmailVerification, &key)
        })
        .await?;

    info!("User {} signed up with email", user_id);
    let tokens = issue_tokens(&state.config, user_id, &email)?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

pub async fn sign_up_invitation(
    State(state): State<AppState>,
    Json(req): Json<InvitationSignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();
    let key = email.clone();
    state
        .with_db(move |db| {
            if db.get_user_by_email(&key)?.is_some() {
                return Err(ApiError::conflict("email already registered"));
            }
            let (code_id, invitation) = codes::check_invitation(db, &key, req.code.trim(), Utc::now())?;
            let id = user_id.to_string();
            let user = NewUser {
                id: &id,
                email: &key,
                user_type: invitation.user_type.as_str(),
                password_hash: Some(password_hash.as_str()),
            };
            let role_bound = db
                .redeem_invitation(code_id, &user, invitation.role_id)?
                .ok_or_else(|| ApiError::not_found("code not found"))?;

            if let (Some(role_id), false) = (invitation.role_id, role_bound) {
                warn!("Invited role {} no longer exists, skipping binding", role_id);
            }
            Ok::<_, ApiError>(())
        })
        .await?;

    info!("User {} signed up through an invitation", user_id);
    let tokens = issue_tokens(&state.config, user_id, &email)?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

pub async fn sign_in_email(
    State(state): State<AppState>,
    Json(req): Json<EmailSignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    let (user, hash) = state
        .with_db(move |db| {
            let user = db.get_user_by_email(&email)?.ok_or(ApiError::Unauthorized)?;
            let hash = db.get_password_hash(&user.id)?.ok_or(ApiError::Unauthorized)?;
            Ok::<_, ApiError>((user, hash))
        })
        .await?;

    if !verify_password(&req.password, &hash) {
        return Err(ApiError::Unauthorized);
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    Ok(Json(issue_tokens(&state.config, user_id, &user.email)?))
}

/// Exchange a refresh token for a new pair. The user must still exist.
pub async fn refresh(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<impl IntoResponse, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.config.jwt_secret, bearer.token(), TokenKind::Refresh)?;

    let id = claims.sub.to_string();
    let user = state
        .with_db(move |db| db.get_user_by_id(&id)?.ok_or(ApiError::Unauthorized))
        .await?;

    Ok(Json(issue_tokens(&state.config, claims.sub, &user.email)?))
}

pub async fn reset_password_code(
    State(state): State<AppState>,
    Json(req): Json<EmailCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;

    let key = email.clone();
    let issued = state
        .with_db(move |db| {
            if db.get_user_by_email(&key)?.is_none() {
                return Err(ApiError::not_found("user not found"));
            }
            codes::set_code(db, CodeType::ResetPassword, &key, None, Utc::now())
        })
        .await?;

    state.mailer.send_code(&email, CodeType::ResetPassword, &issued.code)?;

    Ok(Json(CodeIssuedResponse {
        expired_at: issued.expired_at,
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let password_hash = hash_password(&req.password)?;

    state
        .with_db(move |db| {
            let user = db
                .get_user_by_email(&email)?
                .ok_or_else(|| ApiError::not_found("user not found"))?;
            let row = codes::verify_code(db, CodeType::ResetPassword, &email, req.code.trim(), Utc::now())?;
            db.set_password_hash(&user.id, &password_hash)?;
            db.delete_code(row.id)?;
            info!("Password reset for user {}", user.id);
            Ok::<_, ApiError>(())
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
