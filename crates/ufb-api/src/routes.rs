use axum::{
    Json, Router, middleware,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, feedback, oauth, posts, roles, service, session, statistics, users};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the full API router. Cross-cutting layers (CORS, tracing) are
/// added by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/email/code", post(auth::send_email_code))
        .route("/api/auth/email/code/verify", post(auth::verify_email_code))
        .route("/api/auth/signUp/email", post(auth::sign_up_email))
        .route("/api/auth/signUp/invitation", post(auth::sign_up_invitation))
        .route("/api/auth/signIn/email", post(auth::sign_in_email))
        .route("/api/auth/signIn/oauth/loginURL", get(oauth::login_url))
        .route("/api/auth/signIn/oauth", get(oauth::sign_in))
        .route("/api/auth/refresh", get(auth::refresh))
        .route("/api/auth/password/reset/code", post(auth::reset_password_code))
        .route("/api/auth/password/reset", post(auth::reset_password))
        .route("/api/service", get(service::get))
        .route("/api/service/setup", post(service::setup))
        .route("/session/oauth", post(session::exchange))
        .route("/session", get(session::current).delete(session::clear));

    let protected_routes = Router::new()
        // Users
        .route("/api/users/me", get(users::me))
        .route("/api/users/me/profile", put(users::update_profile))
        .route("/api/users/me/password", put(users::change_password))
        .route("/api/users", get(users::list))
        .route("/api/users/invite", post(users::invite))
        .route("/api/users/{user_id}", delete(users::delete))
        // Roles
        .route("/api/admin/roles", get(roles::list).post(roles::create))
        .route("/api/admin/roles/{role_name}", get(roles::get).delete(roles::delete))
        .route(
            "/api/admin/roles/binding/permission",
            get(roles::list_permissions)
                .post(roles::bind_permission)
                .delete(roles::unbind_permission),
        )
        .route(
            "/api/admin/roles/binding/user",
            post(roles::bind_user).delete(roles::unbind_user),
        )
        // Service
        .route("/api/service", put(service::update))
        .route("/api/service/oauth", get(service::get_oauth).put(service::update_oauth))
        // Feedback
        .route("/api/feedbacks", get(feedback::list).post(feedback::create))
        .route(
            "/api/feedbacks/{id}",
            get(feedback::get).put(feedback::update).delete(feedback::delete),
        )
        .route(
            "/api/feedbacks/{id}/responses",
            get(feedback::list_responses)
                .post(feedback::submit_response)
                .delete(feedback::delete_responses),
        )
        // Posts
        .route("/api/posts", get(posts::list).post(posts::create))
        .route(
            "/api/posts/{id}",
            get(posts::get).put(posts::update).delete(posts::delete),
        )
        .route("/api/posts/{id}/vote", post(posts::toggle_vote))
        .route(
            "/api/posts/{id}/comments",
            get(posts::list_comments).post(posts::create_comment),
        )
        .route("/api/comments/{id}", delete(posts::delete_comment))
        // Statistics
        .route(
            "/api/statistics/feedback-responses",
            get(statistics::feedback_responses),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
