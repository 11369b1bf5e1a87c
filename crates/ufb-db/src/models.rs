//! Database row types. These map directly to SQLite rows and keep the
//! storage layer independent of the wire types in ufb-types.

pub struct ServiceRow {
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub timezone_offset: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CustomAuthRow {
    pub enabled: bool,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub email_key: String,
}

/// A user to insert, with its email credential when `password_hash` is set.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub user_type: &'a str,
    pub password_hash: Option<&'a str>,
}

/// User joined with its profile.
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub user_type: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct CodeRow {
    pub id: i64,
    pub code_type: String,
    pub key: String,
    pub code: String,
    pub data: Option<String>,
    pub is_verified: bool,
    pub expired_at: String,
}

pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

pub struct FeedbackRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct FeedbackFieldRow {
    pub id: i64,
    pub feedback_id: i64,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub format: String,
    /// JSON array of strings.
    pub options: String,
    pub is_required: bool,
    pub position: i64,
}

/// Field definition to insert or update, matched by `key`.
pub struct NewField {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub format: String,
    pub options: String,
    pub is_required: bool,
}

pub struct FeedbackResponseRow {
    pub id: i64,
    pub feedback_id: i64,
    pub user_id: Option<String>,
    pub created_at: String,
}

pub struct ResponseValueRow {
    pub response_id: i64,
    pub key: String,
    /// JSON-encoded value.
    pub value: String,
}

pub struct PostRow {
    pub id: i64,
    pub author_id: String,
    pub author_nickname: Option<String>,
    pub title: String,
    pub content: String,
    pub vote_count: i64,
    pub comment_count: i64,
    pub voted: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub author_id: String,
    pub author_nickname: Option<String>,
    pub content: String,
    pub created_at: String,
}
