use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use ufb_db::Database;
use ufb_db::models::RoleRow;
use ufb_types::api::{
    Claims, CreateRoleRequest, PermissionBindingRequest, RoleNameQuery, UserBindingRequest,
};
use ufb_types::models::Permission;

use crate::error::ApiError;
use crate::permissions::authorize;
use crate::state::AppState;
use crate::views;

fn find_role(db: &Database, name: &str) -> Result<(RoleRow, Vec<String>), ApiError> {
    db.get_role_by_name(name)?
        .ok_or_else(|| ApiError::not_found(format!("role '{}' not found", name)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    let roles = state.with_db(|db| db.list_roles()).await?;
    let views: Vec<_> = roles
        .into_iter()
        .map(|(role, granted)| views::role(role, &granted))
        .collect();
    Ok(Json(views))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("role name is required"));
    }

    let role = state
        .with_db(move |db| {
            if db.get_role_by_name(&name)?.is_some() {
                return Err(ApiError::conflict(format!("role '{}' already exists", name)));
            }
            let permissions: Vec<&str> = req.permissions.iter().map(Permission::as_str).collect();
            db.create_role(&name, req.description.as_deref(), &permissions)?;
            find_role(db, &name)
        })
        .await?;

    info!("Role '{}' created", role.0.name);
    Ok((StatusCode::CREATED, Json(views::role(role.0, &role.1))))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    let (role, granted) = state.with_db(move |db| find_role(db, &role_name)).await?;
    Ok(Json(views::role(role, &granted)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    state
        .with_db(move |db| {
            let (role, _) = find_role(db, &role_name)?;
            db.delete_role(role.id)?;
            info!("Role '{}' deleted", role.name);
            Ok::<_, ApiError>(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Permission bindings --

pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RoleNameQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    let (_, granted) = state
        .with_db(move |db| find_role(db, &query.role_name))
        .await?;
    Ok(Json(views::permissions(&granted)))
}

pub async fn bind_permission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PermissionBindingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    state
        .with_db(move |db| {
            let (role, _) = find_role(db, &req.role_name)?;
            if !db.bind_permission(role.id, req.permission.as_str())? {
                return Err(ApiError::conflict(format!(
                    "role '{}' already has {}",
                    role.name, req.permission
                )));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn unbind_permission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PermissionBindingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    state
        .with_db(move |db| {
            let (role, _) = find_role(db, &req.role_name)?;
            if !db.unbind_permission(role.id, req.permission.as_str())? {
                return Err(ApiError::not_found(format!(
                    "role '{}' does not have {}",
                    role.name, req.permission
                )));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- User bindings --

pub async fn bind_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UserBindingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    state
        .with_db(move |db| {
            let (role, _) = find_role(db, &req.role_name)?;
            let user_id = req.user_id.to_string();
            if db.get_user_by_id(&user_id)?.is_none() {
                return Err(ApiError::not_found("user not found"));
            }
            if !db.bind_user(role.id, &user_id)? {
                return Err(ApiError::conflict(format!(
                    "user already bound to role '{}'",
                    role.name
                )));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn unbind_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UserBindingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageTenant).await?;

    state
        .with_db(move |db| {
            let (role, _) = find_role(db, &req.role_name)?;
            if !db.unbind_user(role.id, &req.user_id.to_string())? {
                return Err(ApiError::not_found(format!(
                    "user is not bound to role '{}'",
                    role.name
                )));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
