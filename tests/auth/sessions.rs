use axum::{
    body::Body,
    http::{header, Method, StatusCode},
};
use campeiro::auth::session::NewSession;
use campeiro::storage::{Filter, RecordStore, SessionRepository};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::support::{json_request, register_body, request, send_to, TestApp, CPF, PASSWORD};

#[tokio::test]
async fn refresh_rotation_lifecycle() {
    let app = TestApp::new();

    let registered = app.register("ana@example.com").await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body["user"]["email"], "ana@example.com");
    assert_eq!(registered.body["user"]["role"], "client");
    assert!(registered.body["user"].get("passwordHash").is_none());
    assert!(registered.body["user"].get("cpf").is_none());

    let cookie = registered.set_cookie().expect("refresh cookie set");
    assert!(cookie.starts_with("rtok="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/auth"));
    assert!(cookie.contains("Domain=localhost"));
    assert!(cookie.contains("Expires="));
    assert!(!cookie.contains("Secure"));

    let first_session = registered.session_id();
    let first_token = registered.refresh_token().expect("refresh token");

    let rotated = app.refresh(Some(&first_token)).await;
    assert_eq!(rotated.status, StatusCode::OK);
    let second_session = rotated.session_id();
    assert_ne!(second_session, first_session);
    assert!(!rotated.access_token().is_empty());
    let second_token = rotated.refresh_token().expect("rotated refresh token");
    assert_ne!(second_token, first_token);

    let previous = app.sessions().get_session(&first_session).await.unwrap().unwrap();
    assert!(previous.is_revoked);
    let current = app.sessions().get_session(&second_session).await.unwrap().unwrap();
    assert!(!current.is_revoked);
    assert_eq!(current.expires_at, previous.expires_at);

    let stale = app.refresh(Some(&first_token)).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
    assert_eq!(stale.body, json!({ "error": "unauthorized", "message": "Invalid session" }));

    let logout = app.logout(Some(&second_token)).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    let cleared = logout.set_cookie().expect("cleared cookie");
    assert!(cleared.starts_with("rtok=;"));
    assert!(cleared.contains("Max-Age=0"));
    assert!(cleared.contains("Path=/auth"));
    assert!(logout.refresh_token().is_none());

    let after_logout = app.refresh(Some(&second_token)).await;
    assert_eq!(after_logout.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after_logout.body["message"], "Invalid session");
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = TestApp::new();
    let token = app.register("bia@example.com").await.refresh_token().unwrap();

    for attempt in [Some(token.as_str()), Some(token.as_str()), None, Some("not-a-jwt")] {
        let response = app.logout(attempt).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT, "logout with {:?}", attempt);
        assert!(response.set_cookie().unwrap().contains("Max-Age=0"));
    }
}

#[tokio::test]
async fn refresh_without_cookie_is_rejected() {
    let app = TestApp::new();

    let response = app.refresh(None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "unauthorized");
    assert!(response.set_cookie().is_none());
}

#[tokio::test]
async fn login_opens_an_independent_session() {
    let app = TestApp::new();
    let registered = app.register("caio@example.com").await;

    let login = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "CAIO@example.com", "password": PASSWORD }),
        ))
        .await;

    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.user_id(), registered.user_id());
    assert_ne!(login.session_id(), registered.session_id());

    // both sessions stay usable
    assert_eq!(app.refresh(registered.refresh_token().as_deref()).await.status, StatusCode::OK);
    assert_eq!(app.refresh(login.refresh_token().as_deref()).await.status, StatusCode::OK);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::new();
    assert_eq!(app.register("dani@example.com").await.status, StatusCode::CREATED);

    let again = app.register("dani@example.com").await;

    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["error"], "conflict");
    assert!(again.set_cookie().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_create_one_account() {
    let app = TestApp::new();

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let register =
                json_request(Method::POST, "/auth/register", register_body("dup@example.com"));
            tokio::spawn(send_to(app.router(), register))
        })
        .collect();

    let mut created = 0;
    for attempt in attempts {
        let response = attempt.await.unwrap();
        match response.status {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {
                assert_eq!(response.body["message"], "Email already registered");
                assert!(response.set_cookie().is_none());
            }
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(created, 1);

    let accounts = app
        .state
        .store
        .find_many("users", &Filter::new().eq("email", "dup@example.com"))
        .await
        .unwrap();
    assert_eq!(accounts.len(), 1);

    let login = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "dup@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.user_id(), accounts[0]["id"].as_str().unwrap());
}

#[tokio::test]
async fn incomplete_registration_body_reports_missing_field() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            json!({ "name": "Ana", "email": "ana@example.com" }),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");
    assert_eq!(response.body["errors"]["cpf"], json!(["is required"]));
    assert!(response.set_cookie().is_none());
}

#[tokio::test]
async fn unreadable_login_bodies_are_validation_errors() {
    let app = TestApp::new();

    let not_json = app
        .send(
            request(Method::POST, "/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("email=ana@example.com"))
                .unwrap(),
        )
        .await;
    assert_eq!(not_json.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_json.body["error"], "validation_error");
    assert!(not_json.body["errors"].get("body").is_some());

    let wrong_type = app
        .send(
            request(Method::POST, "/auth/login")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);
    assert!(wrong_type.body["errors"].get("body").is_some());

    let wrong_field = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "ana@example.com", "password": 123456 }),
        ))
        .await;
    assert_eq!(wrong_field.status, StatusCode::BAD_REQUEST);
    assert!(wrong_field.body["errors"].get("password").is_some());
}

#[tokio::test]
async fn invalid_profile_reports_fields() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            json!({
                "name": "Eva",
                "email": "eva@example.com",
                "cpf": "123.456",
                "phone": "12",
                "password": PASSWORD,
            }),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "validation_error");
    assert!(response.body["errors"].get("cpf").is_some());
    assert!(response.body["errors"].get("phone").is_some());
    assert!(response.body["errors"].get("email").is_none());
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let app = TestApp::new();
    app.register("fabi@example.com").await;

    let wrong_password = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "fabi@example.com", "password": "not-it" }),
        ))
        .await;
    let unknown_email = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "ghost@example.com", "password": "not-it" }),
        ))
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_email.body);
    assert!(wrong_password.set_cookie().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_have_one_winner() {
    let app = TestApp::new();
    let token = app.register("gil@example.com").await.refresh_token().unwrap();

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let router = app.router();
            let request = crate::support::cookie_request("/auth/refresh", Some(&token));
            tokio::spawn(send_to(router, request))
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        let response = attempt.await.unwrap();
        match response.status {
            StatusCode::OK => successes += 1,
            StatusCode::UNAUTHORIZED => assert_eq!(response.body["message"], "Invalid session"),
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn foreign_session_is_rejected() {
    let app = TestApp::new();
    let ana = app.register("ana@example.com").await;
    let bob = app.register("bob@example.com").await;

    let forged = app.tokens().issue_refresh(&bob.user_id(), &ana.session_id()).unwrap();
    let response = app.refresh(Some(&forged)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({ "error": "unauthorized", "message": "Invalid session" }));

    let errors = app.audit_events("HTTP_ERROR").await;
    assert!(errors.iter().any(|message| message["detail"]["reason"] == "session_owner_mismatch"));

    let untouched = app.sessions().get_session(&ana.session_id()).await.unwrap().unwrap();
    assert!(!untouched.is_revoked);
}

#[tokio::test]
async fn expired_and_revoked_sessions_differ_only_in_the_audit_trail() {
    let app = TestApp::new();
    let registered = app.register("hugo@example.com").await;
    let user_id = registered.user_id();

    let expired = app
        .sessions()
        .create_session(NewSession {
            user_id: user_id.clone(),
            user_agent: None,
            ip_address: None,
            expires_at: Utc::now() - Duration::days(1),
        })
        .await
        .unwrap();
    let expired_token = app.tokens().issue_refresh(&user_id, &expired.id).unwrap();

    let revoked_token = registered.refresh_token().unwrap();
    assert_eq!(app.logout(Some(&revoked_token)).await.status, StatusCode::NO_CONTENT);

    let expired_response = app.refresh(Some(&expired_token)).await;
    let revoked_response = app.refresh(Some(&revoked_token)).await;

    assert_eq!(expired_response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(revoked_response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(expired_response.body, revoked_response.body);

    let reasons: Vec<_> = app
        .audit_events("HTTP_ERROR")
        .await
        .into_iter()
        .map(|message| message["detail"]["reason"].clone())
        .collect();
    assert!(reasons.contains(&json!("session_expired")));
    assert!(reasons.contains(&json!("session_revoked")));
}

#[tokio::test]
async fn revoke_all_ends_every_session() {
    let app = TestApp::new();
    let registered = app.register("ines@example.com").await;
    let login = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            json!({ "email": "ines@example.com", "password": PASSWORD }),
        ))
        .await;

    let response = app
        .send(crate::support::bearer_request(
            Method::POST,
            "/auth/sessions/revoke-all",
            &login.access_token(),
        ))
        .await;

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.set_cookie().unwrap().contains("Max-Age=0"));
    assert_eq!(app.refresh(registered.refresh_token().as_deref()).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.refresh(login.refresh_token().as_deref()).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoke_all_requires_a_bearer_token() {
    let app = TestApp::with_environment(campeiro::Environment::Development);

    let response = app
        .send(crate::support::request(Method::POST, "/auth/sessions/revoke-all")
            .body(axum::body::Body::empty())
            .unwrap())
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_keeps_cpf_out_of_responses() {
    let app = TestApp::new();

    let registered = app.register("joao@example.com").await;

    assert!(!registered.body.to_string().contains(CPF));
}
