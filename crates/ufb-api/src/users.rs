use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use ufb_db::Database;
use ufb_types::api::{
    ChangePasswordRequest, Claims, CodeIssuedResponse, InviteUserRequest, Page, PageMeta, PageQuery,
    UpdateProfileRequest, UserResponse,
};
use ufb_types::models::{CodeType, InvitationData, Permission, UserType};

use crate::auth::{hash_password, validate_email, validate_password, verify_password};
use crate::codes;
use crate::error::ApiError;
use crate::permissions::{authorize, current_actor};
use crate::state::AppState;
use crate::views;

fn load_user(db: &Database, id: &str) -> Result<UserResponse, ApiError> {
    let row = db
        .get_user_by_id(id)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    let roles = db.get_user_roles(id)?;
    let granted = db.get_user_permissions(id)?;
    Ok(views::user(row, roles, &granted))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let user = state
        .with_db(move |db| match load_user(db, &id) {
            Err(ApiError::NotFound(_)) => Err(ApiError::Unauthorized),
            other => other,
        })
        .await?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let nickname = trimmed(req.nickname);
    if nickname.as_ref().is_some_and(|n| n.chars().count() > 64) {
        return Err(ApiError::bad_request("nickname is too long"));
    }
    let avatar_url = trimmed(req.avatar_url);

    let id = claims.sub.to_string();
    let user = state
        .with_db(move |db| {
            if db.get_user_by_id(&id)?.is_none() {
                return Err(ApiError::Unauthorized);
            }
            db.update_profile(&id, nickname.as_deref(), avatar_url.as_deref())?;
            load_user(db, &id)
        })
        .await?;
    Ok(Json(user))
}

/// Change the caller's password. Users without an email credential (OAuth
/// only) can't use this.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&req.new_password)?;

    let id = claims.sub.to_string();
    let current_hash = state
        .with_db(move |db| {
            db.get_password_hash(&id)?
                .ok_or_else(|| ApiError::bad_request("account has no password"))
        })
        .await?;

    if !verify_password(&req.current_password, &current_hash) {
        return Err(ApiError::bad_request("current password does not match"));
    }

    let new_hash = hash_password(&req.new_password)?;
    let id = claims.sub.to_string();
    state.with_db(move |db| db.set_password_hash(&id, &new_hash)).await?;

    info!("User {} changed password", claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ReadUsers).await?;

    let (limit, offset) = query.limit_offset();
    let (items, total) = state
        .with_db(move |db| {
            let (rows, total) = db.list_users(limit, offset)?;
            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let roles = db.get_user_roles(&row.id)?;
                let granted = db.get_user_permissions(&row.id)?;
                items.push(views::user(row, roles, &granted));
            }
            Ok::<_, anyhow::Error>((items, total))
        })
        .await?;

    Ok(Json(Page {
        items,
        meta: PageMeta {
            page: query.page.max(1),
            limit,
            total,
        },
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = authorize(&state, &claims, Permission::ManageUsers).await?;
    if actor.id == user_id {
        return Err(ApiError::bad_request("cannot delete yourself"));
    }

    let id = user_id.to_string();
    let deleted = state.with_db(move |db| db.delete_user(&id)).await?;
    if !deleted {
        return Err(ApiError::not_found("user not found"));
    }

    info!("User {} deleted by {}", user_id, actor.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Issue an invitation code. Inviting a SUPER user needs a SUPER inviter.
pub async fn invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InviteUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = current_actor(&state, &claims).await?;
    if !actor.has(Permission::ManageUsers) {
        return Err(ApiError::Forbidden);
    }
    if req.user_type == UserType::Super && !actor.is_super() {
        return Err(ApiError::Forbidden);
    }

    let email = validate_email(&req.email)?;
    let data = InvitationData {
        role_id: req.role_id,
        user_type: req.user_type,
        invited_by: actor.id,
    };
    let payload = serde_json::to_value(&data).map_err(anyhow::Error::from)?;

    let key = email.clone();
    let issued = state
        .with_db(move |db| {
            if db.get_user_by_email(&key)?.is_some() {
                return Err(ApiError::conflict("email already registered"));
            }
            if let Some(role_id) = data.role_id {
                if !db.role_exists(role_id)? {
                    return Err(ApiError::not_found("role not found"));
                }
            }
            codes::set_code(db, CodeType::UserInvitation, &key, Some(&payload), Utc::now())
        })
        .await?;

    state.mailer.send_code(&email, CodeType::UserInvitation, &issued.code)?;
    info!("User {} invited {}", actor.id, email);

    Ok((
        StatusCode::CREATED,
        Json(CodeIssuedResponse {
            expired_at: issued.expired_at,
        }),
    ))
}
