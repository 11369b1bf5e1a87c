use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use ufb_types::api::{
    Claims, CommentRequest, Page, PageMeta, PageQuery, PostRequest, VoteResponse,
};
use ufb_types::models::Permission;

use crate::error::ApiError;
use crate::permissions::current_actor;
use crate::state::AppState;
use crate::views;

const MAX_TITLE_LENGTH: usize = 200;

fn validate_post(req: &PostRequest) -> Result<(String, String), ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::bad_request("title is too long"));
    }
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }
    Ok((title.to_string(), req.content.clone()))
}

/// Authors may change their own posts and comments; MANAGE_POSTS may change
/// anyone's.
async fn ensure_can_modify(state: &AppState, claims: &Claims, author_id: &str) -> Result<(), ApiError> {
    if author_id == claims.sub.to_string() {
        return Ok(());
    }
    let actor = current_actor(state, claims).await?;
    if actor.has(Permission::ManagePosts) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

async fn post_author(state: &AppState, id: i64, viewer: String) -> Result<String, ApiError> {
    let post = state
        .with_db(move |db| db.get_post(id, &viewer))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("post {} not found", id)))?;
    Ok(post.author_id)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = query.limit_offset();
    let viewer = claims.sub.to_string();
    let (rows, total) = state
        .with_db(move |db| db.list_posts(&viewer, limit, offset))
        .await?;

    Ok(Json(Page {
        items: rows.into_iter().map(views::post).collect(),
        meta: PageMeta {
            page: query.page.max(1),
            limit,
            total,
        },
    }))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (title, content) = validate_post(&req)?;

    let author = claims.sub.to_string();
    let post = state
        .with_db(move |db| {
            let id = db.create_post(&author, &title, &content)?;
            db.get_post(id, &author)?
                .ok_or_else(|| anyhow::anyhow!("post {} vanished", id))
        })
        .await?;

    info!("Post {} created by {}", post.id, claims.sub);
    Ok((StatusCode::CREATED, Json(views::post(post))))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let post = state
        .with_db(move |db| db.get_post(id, &viewer))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("post {} not found", id)))?;
    Ok(Json(views::post(post)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (title, content) = validate_post(&req)?;
    let author = post_author(&state, id, claims.sub.to_string()).await?;
    ensure_can_modify(&state, &claims, &author).await?;

    let viewer = claims.sub.to_string();
    let post = state
        .with_db(move |db| {
            if !db.update_post(id, &title, &content)? {
                return Err(ApiError::not_found(format!("post {} not found", id)));
            }
            db.get_post(id, &viewer)?
                .ok_or_else(|| ApiError::not_found(format!("post {} not found", id)))
        })
        .await?;
    Ok(Json(views::post(post)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let author = post_author(&state, id, claims.sub.to_string()).await?;
    ensure_can_modify(&state, &claims, &author).await?;

    if !state.with_db(move |db| db.delete_post(id)).await? {
        return Err(ApiError::not_found(format!("post {} not found", id)));
    }
    info!("Post {} deleted by {}", id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_vote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let (voted, vote_count) = state
        .with_db(move |db| {
            if db.get_post(id, &user_id)?.is_none() {
                return Err(ApiError::not_found(format!("post {} not found", id)));
            }
            Ok(db.toggle_vote(id, &user_id)?)
        })
        .await?;
    Ok(Json(VoteResponse { voted, vote_count }))
}

// -- Comments --

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let rows = state
        .with_db(move |db| {
            if db.get_post(id, &viewer)?.is_none() {
                return Err(ApiError::not_found(format!("post {} not found", id)));
            }
            Ok(db.list_comments(id)?)
        })
        .await?;
    let views: Vec<_> = rows.into_iter().map(views::comment).collect();
    Ok(Json(views))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }

    let author = claims.sub.to_string();
    let row = state
        .with_db(move |db| {
            if db.get_post(id, &author)?.is_none() {
                return Err(ApiError::not_found(format!("post {} not found", id)));
            }
            Ok(db.create_comment(id, &author, &req.content)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(views::comment(row))))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .with_db(move |db| db.get_comment(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("comment {} not found", id)))?;
    ensure_can_modify(&state, &claims, &comment.author_id).await?;

    state.with_db(move |db| db.delete_comment(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
