//! Row -> wire conversions. Corrupt stored values are logged and replaced
//! with a default rather than failing the whole request.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use ufb_db::models::{CommentRow, FeedbackFieldRow, FeedbackRow, PostRow, RoleRow, UserRow};
use ufb_types::api::{
    CommentView, FeedbackView, FieldView, PostView, ProfileResponse, RoleResponse, UserResponse,
};
use ufb_types::models::{FieldFormat, Permission};

use crate::permissions::{effective_permissions, parse_user_type};

pub(crate) fn timestamp(raw: &str) -> DateTime<Utc> {
    ufb_db::time::parse(raw).unwrap_or_else(|e| {
        warn!("Corrupt timestamp: {}", e);
        DateTime::<Utc>::UNIX_EPOCH
    })
}

pub(crate) fn uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}': {}", raw, e);
        Uuid::nil()
    })
}

pub(crate) fn permissions(raw: &[String]) -> Vec<Permission> {
    raw.iter()
        .filter_map(|p| match p.parse() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring stored permission: {}", e);
                None
            }
        })
        .collect()
}

pub(crate) fn user(row: UserRow, roles: Vec<String>, granted: &[String]) -> UserResponse {
    let user_type = parse_user_type(&row);
    UserResponse {
        id: uuid(&row.id),
        email: row.email,
        user_type,
        profile: ProfileResponse {
            nickname: row.nickname,
            avatar_url: row.avatar_url,
        },
        roles,
        permissions: effective_permissions(user_type, granted).into_iter().collect(),
        created_at: timestamp(&row.created_at),
    }
}

pub(crate) fn role(row: RoleRow, granted: &[String]) -> RoleResponse {
    RoleResponse {
        id: row.id,
        name: row.name,
        description: row.description,
        permissions: permissions(granted),
    }
}

pub(crate) fn field(row: FeedbackFieldRow) -> FieldView {
    let format = row.format.parse().unwrap_or_else(|e| {
        warn!("Corrupt format on field {}: {}", row.id, e);
        FieldFormat::Text
    });
    let options = serde_json::from_str(&row.options).unwrap_or_else(|e| {
        warn!("Corrupt options on field {}: {}", row.id, e);
        Vec::new()
    });
    FieldView {
        id: row.id,
        key: row.key,
        name: row.name,
        description: row.description,
        format,
        options,
        required: row.is_required,
    }
}

pub(crate) fn feedback(row: FeedbackRow, fields: Vec<FeedbackFieldRow>) -> FeedbackView {
    FeedbackView {
        id: row.id,
        name: row.name,
        description: row.description,
        fields: fields.into_iter().map(field).collect(),
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
    }
}

pub(crate) fn post(row: PostRow) -> PostView {
    PostView {
        id: row.id,
        author_id: uuid(&row.author_id),
        author_nickname: row.author_nickname,
        title: row.title,
        content: row.content,
        vote_count: row.vote_count,
        comment_count: row.comment_count,
        voted: row.voted,
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
    }
}

pub(crate) fn comment(row: CommentRow) -> CommentView {
    CommentView {
        id: row.id,
        post_id: row.post_id,
        author_id: uuid(&row.author_id),
        author_nickname: row.author_nickname,
        content: row.content,
        created_at: timestamp(&row.created_at),
    }
}
