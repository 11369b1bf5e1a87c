use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Map, Value};
use tracing::{info, warn};

use ufb_db::Database;
use ufb_types::api::{
    Claims, DeleteResponsesRequest, FeedbackRequest, FeedbackView, Page, PageMeta, ResponseListQuery,
    ResponseView, SubmitResponseRequest,
};
use ufb_types::models::Permission;

use crate::error::ApiError;
use crate::permissions::authorize;
use crate::service::service_offset;
use crate::state::AppState;
use crate::statistics::local_day_start;
use crate::validation::{check_format_changes, validate_fields, validate_response};
use crate::views;

fn load_feedback(db: &Database, id: i64) -> Result<FeedbackView, ApiError> {
    let (row, fields) = db
        .get_feedback(id)?
        .ok_or_else(|| ApiError::not_found(format!("feedback {} not found", id)))?;
    Ok(views::feedback(row, fields))
}

fn required_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("feedback name is required"));
    }
    Ok(name.to_string())
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ReadFeedbacks).await?;

    let rows = state.with_db(|db| db.list_feedbacks()).await?;
    let views: Vec<_> = rows
        .into_iter()
        .map(|(row, fields)| views::feedback(row, fields))
        .collect();
    Ok(Json(views))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageFeedbacks).await?;
    let name = required_name(&req.name)?;
    let fields = validate_fields(&req.fields)?;

    let view = state
        .with_db(move |db| {
            if db.feedback_name_taken(&name, None)? {
                return Err(ApiError::conflict(format!("feedback '{}' already exists", name)));
            }
            let id = db.create_feedback(&name, req.description.as_deref(), &fields)?;
            load_feedback(db, id)
        })
        .await?;

    info!("Feedback {} '{}' created", view.id, view.name);
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ReadFeedbacks).await?;
    let view = state.with_db(move |db| load_feedback(db, id)).await?;
    Ok(Json(view))
}

/// Replace the feedback's name, description and field set. Fields are
/// matched by key; keys left out are removed with their values.
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageFeedbacks).await?;
    let name = required_name(&req.name)?;
    let fields = validate_fields(&req.fields)?;

    let view = state
        .with_db(move |db| {
            let current = load_feedback(db, id)?;
            check_format_changes(&current.fields, &req.fields)?;
            if db.feedback_name_taken(&name, Some(id))? {
                return Err(ApiError::conflict(format!("feedback '{}' already exists", name)));
            }
            if !db.update_feedback(id, &name, req.description.as_deref(), &fields)? {
                return Err(ApiError::not_found(format!("feedback {} not found", id)));
            }
            load_feedback(db, id)
        })
        .await?;

    Ok(Json(view))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageFeedbacks).await?;

    let deleted = state.with_db(move |db| db.delete_feedback(id)).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("feedback {} not found", id)));
    }
    info!("Feedback {} deleted by {}", id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

// -- Responses --

/// Any signed-in user may submit.
pub async fn submit_response(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<SubmitResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let view = state
        .with_db(move |db| {
            let feedback = load_feedback(db, id)?;
            let values = validate_response(&feedback.fields, &req.fields)?;
            let row = db.insert_response(id, Some(&user_id), &values)?;

            let mut fields = req.fields;
            fields.retain(|_, v| !v.is_null());
            Ok::<_, ApiError>(ResponseView {
                id: row.id,
                feedback_id: row.feedback_id,
                user_id: row.user_id.as_deref().map(views::uuid),
                created_at: views::timestamp(&row.created_at),
                fields,
            })
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_responses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Query(query): Query<ResponseListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ReadFeedbacks).await?;

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if to < from {
            return Err(ApiError::bad_request("'to' must not be before 'from'"));
        }
    }

    let paging = query.paging();
    let (limit, offset) = paging.limit_offset();
    let (items, total) = state
        .with_db(move |db| {
            load_feedback(db, id)?;

            // Dates are local to the service; `to` is inclusive.
            let tz = service_offset(db)?;
            let from = match query.from {
                Some(d) => Some(ufb_db::time::format(local_day_start(d, tz)?)),
                None => None,
            };
            let to = match query.to {
                Some(d) => {
                    let end = d
                        .succ_opt()
                        .ok_or_else(|| ApiError::bad_request("'to' is out of range"))?;
                    Some(ufb_db::time::format(local_day_start(end, tz)?))
                }
                None => None,
            };

            let (rows, total) = db.list_responses(id, from.as_deref(), to.as_deref(), limit, offset)?;
            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

            let mut values: HashMap<i64, Map<String, Value>> = HashMap::new();
            for v in db.get_response_values(&ids)? {
                let parsed = serde_json::from_str(&v.value).unwrap_or_else(|e| {
                    warn!("Corrupt value on response {} field '{}': {}", v.response_id, v.key, e);
                    Value::Null
                });
                values.entry(v.response_id).or_default().insert(v.key, parsed);
            }

            let items: Vec<ResponseView> = rows
                .into_iter()
                .map(|row| ResponseView {
                    id: row.id,
                    feedback_id: row.feedback_id,
                    user_id: row.user_id.as_deref().map(views::uuid),
                    created_at: views::timestamp(&row.created_at),
                    fields: values.remove(&row.id).unwrap_or_default(),
                })
                .collect();
            Ok::<_, ApiError>((items, total))
        })
        .await?;

    Ok(Json(Page {
        items,
        meta: PageMeta {
            page: paging.page.max(1),
            limit,
            total,
        },
    }))
}

pub async fn delete_responses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<DeleteResponsesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &claims, Permission::ManageFeedbacks).await?;
    if req.ids.is_empty() {
        return Err(ApiError::bad_request("ids must not be empty"));
    }

    let deleted = state
        .with_db(move |db| {
            load_feedback(db, id)?;
            Ok::<_, ApiError>(db.delete_responses(id, &req.ids)?)
        })
        .await?;

    info!("Deleted {} responses from feedback {}", deleted, id);
    Ok(StatusCode::NO_CONTENT)
}
