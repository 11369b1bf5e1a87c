mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use common::{PASSWORD, SUPER_EMAIL, app};
use ufb_types::models::CodeType;

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn setup_runs_once_and_creates_super_user() {
    let app = app();
    let (status, _) = app.call("GET", "/api/service", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let token = app.setup().await;

    let (status, service) = app.call("GET", "/api/service", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(service["name"], "ufb");
    assert_eq!(service["timezoneOffset"], "+09:00");

    let (status, me) = app.call("GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], SUPER_EMAIL);
    assert_eq!(me["userType"], "SUPER");
    assert_eq!(me["permissions"].as_array().map(Vec::len), Some(6));

    let (status, _) = app
        .call(
            "POST",
            "/api/service/setup",
            None,
            Some(json!({ "name": "again", "email": "other@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The rejected setup must not leave its user behind.
    let (status, _) = app
        .call(
            "POST",
            "/api/auth/signIn/email",
            None,
            Some(json!({ "email": "other@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_valid_access_token() {
    let app = app();
    let (status, _) = app.call("GET", "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("GET", "/api/users/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A refresh token is not an access token.
    let _ = app.setup().await;
    let (_, pair) = app
        .call(
            "POST",
            "/api/auth/signIn/email",
            None,
            Some(json!({ "email": SUPER_EMAIL, "password": PASSWORD })),
        )
        .await;
    let refresh = pair["refreshToken"].as_str().unwrap();
    let (status, _) = app.call("GET", "/api/users/me", Some(refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, renewed) = app.call("GET", "/api/auth/refresh", Some(refresh), None).await;
    assert_eq!(status, StatusCode::OK);
    let access = renewed["accessToken"].as_str().unwrap();
    let (status, _) = app.call("GET", "/api/users/me", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn email_sign_up_and_sign_in() {
    let app = app();
    let token = app.sign_up("alice@example.com").await;

    let (status, me) = app.call("GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["userType"], "GENERAL");
    assert_eq!(me["permissions"], json!([]));

    // Already registered.
    let (status, _) = app
        .call("POST", "/api/auth/email/code", None, Some(json!({ "email": "alice@example.com" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/signIn/email",
            None,
            Some(json!({ "email": "ALICE@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/signIn/email",
            None,
            Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_up_requires_verified_email() {
    let app = app();
    let (status, _) = app
        .call("POST", "/api/auth/email/code", None, Some(json!({ "email": "bob@example.com" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/signUp/email",
            None,
            Some(json!({ "email": "bob@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn code_verification_errors() {
    let app = app();
    let (status, _) = app
        .call(
            "POST",
            "/api/auth/email/code/verify",
            None,
            Some(json!({ "email": "nobody@example.com", "code": "123456" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, issued) = app
        .call("POST", "/api/auth/email/code", None, Some(json!({ "email": "carol@example.com" })))
        .await;
    let expired_at: chrono::DateTime<Utc> = serde_json::from_value(issued["expiredAt"].clone()).unwrap();
    assert!(expired_at > Utc::now());

    let code = app.mailer.last_code("carol@example.com", CodeType::EmailVerification);
    assert_eq!(code.len(), 6);
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, body) = app
        .call(
            "POST",
            "/api/auth/email/code/verify",
            None,
            Some(json!({ "email": "carol@example.com", "code": wrong })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["statusCode"], 400);
}

#[tokio::test]
async fn password_reset_flow() {
    let app = app();
    let _ = app.sign_up("dave@example.com").await;

    let (status, _) = app
        .call("POST", "/api/auth/password/reset/code", None, Some(json!({ "email": "ghost@example.com" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call("POST", "/api/auth/password/reset/code", None, Some(json!({ "email": "dave@example.com" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = app.mailer.last_code("dave@example.com", CodeType::ResetPassword);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/password/reset",
            None,
            Some(json!({ "email": "dave@example.com", "code": code, "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/signIn/email",
            None,
            Some(json!({ "email": "dave@example.com", "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn roles_grant_permissions() {
    let app = app();
    let admin = app.setup().await;
    let user = app.sign_up("erin@example.com").await;
    let user_id = app.user_id(&user).await;

    let (status, _) = app.call("GET", "/api/feedbacks", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("GET", "/api/admin/roles", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, role) = app
        .call(
            "POST",
            "/api/admin/roles",
            Some(&admin),
            Some(json!({ "name": "viewer", "permissions": ["READ_USERS"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["permissions"], json!(["READ_USERS"]));

    let binding = json!({ "roleName": "viewer", "permission": "READ_FEEDBACKS" });
    let (status, _) = app
        .call("POST", "/api/admin/roles/binding/permission", Some(&admin), Some(binding.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call("POST", "/api/admin/roles/binding/permission", Some(&admin), Some(binding))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, perms) = app
        .call("GET", "/api/admin/roles/binding/permission?roleName=viewer", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perms, json!(["READ_FEEDBACKS", "READ_USERS"]));

    let (status, _) = app
        .call(
            "POST",
            "/api/admin/roles/binding/user",
            Some(&admin),
            Some(json!({ "roleName": "viewer", "userId": user_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.call("GET", "/api/feedbacks", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, page) = app.call("GET", "/api/users?limit=1", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 2);
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));

    let (status, _) = app
        .call("DELETE", "/api/admin/roles/viewer", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("GET", "/api/feedbacks", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invitation_sign_up() {
    let app = app();
    let admin = app.setup().await;

    let (status, _) = app
        .call(
            "POST",
            "/api/users/invite",
            Some(&admin),
            Some(json!({ "email": "frank@example.com", "userType": "GENERAL" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = app.mailer.last_code("frank@example.com", CodeType::UserInvitation);

    let (status, pair) = app
        .call(
            "POST",
            "/api/auth/signUp/invitation",
            None,
            Some(json!({ "email": "frank@example.com", "code": code, "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let token = pair["accessToken"].as_str().unwrap();
    let (status, me) = app.call("GET", "/api/users/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "frank@example.com");

    // GENERAL users can't invite.
    let (status, _) = app
        .call(
            "POST",
            "/api/users/invite",
            Some(token),
            Some(json!({ "email": "gina@example.com", "userType": "SUPER" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn users_cannot_delete_themselves() {
    let app = app();
    let admin = app.setup().await;
    let admin_id = app.user_id(&admin).await;
    let user = app.sign_up("hank@example.com").await;
    let user_id = app.user_id(&user).await;

    let (status, _) = app
        .call("DELETE", &format!("/api/users/{}", admin_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("DELETE", &format!("/api/users/{}", user_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Token outlives the user but no longer authenticates.
    let (status, _) = app.call("GET", "/api/users/me", Some(&user), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn feedback_lifecycle_and_statistics() {
    let app = app();
    let admin = app.setup().await;

    let (status, feedback) = app
        .call(
            "POST",
            "/api/feedbacks",
            Some(&admin),
            Some(json!({
                "name": "bugs",
                "fields": [
                    { "key": "title", "name": "Title", "format": "text", "required": true },
                    { "key": "severity", "name": "Severity", "format": "select", "options": ["low", "high"] }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{feedback}");
    let id = feedback["id"].as_i64().unwrap();

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/feedbacks/{}/responses", id),
            Some(&admin),
            Some(json!({ "fields": { "severity": "low" } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let user = app.sign_up("ivy@example.com").await;
    let (status, response) = app
        .call(
            "POST",
            &format!("/api/feedbacks/{}/responses", id),
            Some(&user),
            Some(json!({ "fields": { "title": "crash on save", "severity": "high" } })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{response}");

    let (status, page) = app
        .call("GET", &format!("/api/feedbacks/{}/responses", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["items"][0]["fields"]["title"], "crash on save");

    // Changing a field's format is rejected.
    let (status, _) = app
        .call(
            "PUT",
            &format!("/api/feedbacks/{}", id),
            Some(&admin),
            Some(json!({
                "name": "bugs",
                "fields": [{ "key": "title", "name": "Title", "format": "number" }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let service_today = (Utc::now() + chrono::Duration::hours(9)).date_naive();
    let from = service_today - chrono::Duration::days(2);
    let (status, stats) = app
        .call(
            "GET",
            &format!(
                "/api/statistics/feedback-responses?from={}&to={}&feedbackId={}",
                from, service_today, id
            ),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{stats}");
    let buckets = stats["statistics"].as_array().unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[2]["date"], service_today.to_string());
    assert_eq!(buckets[2]["count"], 1);
    assert_eq!(buckets[0]["count"], 0);

    let (status, _) = app
        .call(
            "GET",
            &format!("/api/statistics/feedback-responses?from={}&to={}", service_today, from),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response_id = response["id"].as_i64().unwrap();
    let (status, _) = app
        .call(
            "DELETE",
            &format!("/api/feedbacks/{}/responses", id),
            Some(&admin),
            Some(json!({ "ids": [response_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, page) = app
        .call("GET", &format!("/api/feedbacks/{}/responses", id), Some(&admin), None)
        .await;
    assert_eq!(page["meta"]["total"], 0);
}

#[tokio::test]
async fn posts_votes_and_comments() {
    let app = app();
    let admin = app.setup().await;
    let alice = app.sign_up("alice@example.com").await;
    let bob = app.sign_up("bob@example.com").await;

    let (status, post) = app
        .call(
            "POST",
            "/api/posts",
            Some(&alice),
            Some(json!({ "title": "Dark mode", "content": "Please" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = post["id"].as_i64().unwrap();

    let (_, vote) = app.call("POST", &format!("/api/posts/{}/vote", id), Some(&bob), None).await;
    assert_eq!(vote, json!({ "voted": true, "voteCount": 1 }));
    let (_, vote) = app.call("POST", &format!("/api/posts/{}/vote", id), Some(&bob), None).await;
    assert_eq!(vote, json!({ "voted": false, "voteCount": 0 }));

    let (status, comment) = app
        .call(
            "POST",
            &format!("/api/posts/{}/comments", id),
            Some(&bob),
            Some(json!({ "content": "+1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Only the author or MANAGE_POSTS may edit.
    let edit = json!({ "title": "Dark theme", "content": "Please!" });
    let (status, _) = app
        .call("PUT", &format!("/api/posts/{}", id), Some(&bob), Some(edit.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, updated) = app
        .call("PUT", &format!("/api/posts/{}", id), Some(&alice), Some(edit))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["commentCount"], 1);

    let comment_id = comment["id"].as_i64().unwrap();
    let (status, _) = app
        .call("DELETE", &format!("/api/comments/{}", comment_id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call("DELETE", &format!("/api/comments/{}", comment_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call("DELETE", &format!("/api/posts/{}", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("GET", &format!("/api/posts/{}", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oauth_settings_mask_the_secret() {
    let app = app();
    let admin = app.setup().await;

    let (status, saved) = app
        .call(
            "PUT",
            "/api/service/oauth",
            Some(&admin),
            Some(json!({
                "enabled": true,
                "authorizeUrl": "https://idp.example.com/authorize",
                "tokenUrl": "https://idp.example.com/token",
                "userinfoUrl": "https://idp.example.com/userinfo",
                "clientId": "ufb",
                "clientSecret": "hunter2",
                "emailKey": "email"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{saved}");
    assert_eq!(saved["clientSecretSet"], true);
    assert!(!saved.to_string().contains("hunter2"));

    let (status, url) = app
        .call("GET", "/api/auth/signIn/oauth/loginURL?callbackUrl=https://app.example.com/cb", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(url["url"].as_str().unwrap().starts_with("https://idp.example.com/authorize?"));
}

#[tokio::test]
async fn huge_page_numbers_return_an_empty_page() {
    let app = app();
    let admin = app.setup().await;

    let (status, body) = app
        .call("GET", "/api/users?page=50000000&limit=100", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["meta"]["total"], 1);

    let (status, _) = app
        .call("GET", &format!("/api/posts?page={}", u32::MAX), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unrepresentable_dates_are_bad_requests() {
    let app = app();
    let admin = app.setup().await;

    let (status, body) = app
        .call(
            "GET",
            "/api/statistics/feedback-responses?from=-262143-01-01&to=-262143-01-01&interval=day",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, feedback) = app
        .call("POST", "/api/feedbacks", Some(&admin), Some(json!({ "name": "edge", "fields": [] })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{feedback}");
    let (status, _) = app
        .call(
            "GET",
            &format!("/api/feedbacks/{}/responses?from=-262143-01-01", feedback["id"]),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
