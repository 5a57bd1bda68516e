mod common;

use chrono::Duration;
use common::{spawn_app, token, ACCESS_TOKEN_EXPIRY};
use serde_json::{json, Value};
use uuid::Uuid;

// --- Health ---

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .get(&format!("{}/health_check", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

// --- Registration ---

#[tokio::test]
async fn register_returns_201_without_password_digest() {
    let app = spawn_app().await;

    let response = app.register("alice", "Correct-pw1").await;
    assert_eq!(201, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("id").is_some());
    assert!(body.get("password_hash").is_none());
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app().await;

    let cases = vec![
        (json!({"username": "al", "email": "al@example.com", "password": "Correct-pw1"}), "short username"),
        (json!({"username": "alice", "email": "not-an-email", "password": "Correct-pw1"}), "bad email"),
        (json!({"username": "alice", "email": "alice@example.com", "password": "short"}), "short password"),
        (json!({"username": "alice", "email": "alice@example.com", "password": "alllowercase1"}), "weak password"),
    ];

    for (body, description) in cases {
        let response = app
            .api_client
            .post(&format!("{}/users", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(), "Should reject {}", description);
    }
}

#[tokio::test]
async fn register_returns_409_for_taken_username() {
    let app = spawn_app().await;

    assert_eq!(201, app.register("alice", "Correct-pw1").await.status().as_u16());
    assert_eq!(409, app.register("alice", "Correct-pw1").await.status().as_u16());
}

// --- Login ---

#[tokio::test]
async fn login_returns_user_and_token_pair() {
    let app = spawn_app().await;
    app.register("alice", "Correct-pw1").await;

    let response = app.login("alice", "Correct-pw1").await;
    assert_eq!(201, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], ACCESS_TOKEN_EXPIRY);

    let user_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let rows = app.store.refresh_tokens_for(user_id);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].revoked_at.is_none());
    assert_ne!(rows[0].token_hash, token(&body, "refresh_token"));
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app().await;
    app.register("alice", "Correct-pw1").await;

    let wrong_password = app.login("alice", "Wrong-pw1").await;
    let unknown_user = app.login("nobody", "Correct-pw1").await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_user.status().as_u16());

    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_user.json().await.unwrap();
    assert_eq!(a["code"], "UNAUTHORIZED");
    assert_eq!(a["code"], b["code"]);
    assert_eq!(a["message"], b["message"]);
}

// --- Access token lifecycle ---

#[tokio::test]
async fn expired_access_token_is_recovered_by_refresh() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;
    let a1 = token(&login, "access_token");
    let r1 = token(&login, "refresh_token");

    assert_eq!(200, app.get_me(&a1).await.status().as_u16());

    app.clock.advance(Duration::seconds(ACCESS_TOKEN_EXPIRY));
    assert_eq!(401, app.get_me(&a1).await.status().as_u16());

    let response = app.post_with_bearer("/auth/refresh", &r1).await;
    assert_eq!(201, response.status().as_u16());
    let pair: Value = response.json().await.unwrap();
    let a2 = token(&pair, "access_token");
    let r2 = token(&pair, "refresh_token");
    assert_ne!(r1, r2);

    assert_eq!(200, app.get_me(&a2).await.status().as_u16());

    // The consumed refresh token cannot be replayed.
    let replay = app.post_with_bearer("/auth/refresh", &r1).await;
    assert_eq!(401, replay.status().as_u16());

    // Its successor still works.
    let next = app.post_with_bearer("/auth/refresh", &r2).await;
    assert_eq!(201, next.status().as_u16());
}

#[tokio::test]
async fn protected_routes_reject_bad_credentials() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;
    let refresh_token = token(&login, "refresh_token");

    let missing = app
        .api_client
        .get(&format!("{}/users/me", &app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(401, missing.status().as_u16());

    let wrong_scheme = app
        .api_client
        .get(&format!("{}/users/me", &app.address))
        .header("Authorization", format!("Token {}", token(&login, "access_token")))
        .send()
        .await
        .unwrap();
    assert_eq!(401, wrong_scheme.status().as_u16());

    assert_eq!(401, app.get_me("not.a.jwt").await.status().as_u16());
    // A refresh token is not an access token.
    assert_eq!(401, app.get_me(&refresh_token).await.status().as_u16());
}

#[tokio::test]
async fn refresh_requires_a_known_token() {
    let app = spawn_app().await;

    let unknown = app.post_with_bearer("/auth/refresh", "no-such-token").await;
    assert_eq!(401, unknown.status().as_u16());

    let missing = app
        .api_client
        .post(&format!("{}/auth/refresh", &app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(401, missing.status().as_u16());
}

#[tokio::test]
async fn refresh_token_expires() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;

    app.clock
        .advance(Duration::seconds(common::REFRESH_TOKEN_EXPIRY));

    let response = app
        .post_with_bearer("/auth/refresh", &token(&login, "refresh_token"))
        .await;
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn concurrent_refreshes_of_one_token_have_one_winner() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;
    let r1 = token(&login, "refresh_token");

    let (a, b) = tokio::join!(
        app.post_with_bearer("/auth/refresh", &r1),
        app.post_with_bearer("/auth/refresh", &r1),
    );

    let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, vec![201, 401]);
    assert_eq!(app.store.refresh_token_count(), 2);
}

// --- Revoke ---

#[tokio::test]
async fn revoke_returns_204_then_404() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;
    let r1 = token(&login, "refresh_token");

    assert_eq!(204, app.post_with_bearer("/auth/revoke", &r1).await.status().as_u16());
    assert_eq!(404, app.post_with_bearer("/auth/revoke", &r1).await.status().as_u16());
    assert_eq!(404, app.post_with_bearer("/auth/revoke", "unknown").await.status().as_u16());

    assert_eq!(401, app.post_with_bearer("/auth/refresh", &r1).await.status().as_u16());
}

#[tokio::test]
async fn revoking_one_session_leaves_others_alone() {
    let app = spawn_app().await;
    let first = app.signed_in("alice", "Correct-pw1").await;
    let second: Value = app.login("alice", "Correct-pw1").await.json().await.unwrap();

    app.post_with_bearer("/auth/revoke", &token(&first, "refresh_token"))
        .await;

    let response = app
        .post_with_bearer("/auth/refresh", &token(&second, "refresh_token"))
        .await;
    assert_eq!(201, response.status().as_u16());
}

// --- Logout ---

#[tokio::test]
async fn logout_revokes_every_refresh_token_of_the_user() {
    let app = spawn_app().await;
    let first = app.signed_in("alice", "Correct-pw1").await;
    let second: Value = app.login("alice", "Correct-pw1").await.json().await.unwrap();
    let bob = app.signed_in("bob_smith", "Correct-pw1").await;

    let response = app
        .post_with_bearer("/auth/logout", &token(&second, "access_token"))
        .await;
    assert_eq!(204, response.status().as_u16());

    for session in [&first, &second] {
        let refresh = app
            .post_with_bearer("/auth/refresh", &token(session, "refresh_token"))
            .await;
        assert_eq!(401, refresh.status().as_u16());
    }

    let other_user = app
        .post_with_bearer("/auth/refresh", &token(&bob, "refresh_token"))
        .await;
    assert_eq!(201, other_user.status().as_u16());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;
    let access_token = token(&login, "access_token");

    assert_eq!(204, app.post_with_bearer("/auth/logout", &access_token).await.status().as_u16());
    assert_eq!(204, app.post_with_bearer("/auth/logout", &access_token).await.status().as_u16());
}

#[tokio::test]
async fn logout_requires_an_access_token() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;

    let with_refresh_token = app
        .post_with_bearer("/auth/logout", &token(&login, "refresh_token"))
        .await;
    assert_eq!(401, with_refresh_token.status().as_u16());
}

// --- Account changes end sessions ---

#[tokio::test]
async fn password_reset_revokes_old_sessions() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;
    let access_token = token(&login, "access_token");

    let response = app
        .api_client
        .put(&format!("{}/users/me/password", &app.address))
        .bearer_auth(&access_token)
        .json(&json!({ "current_password": "Correct-pw1", "new_password": "Brand-new-pw2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(204, response.status().as_u16());

    let refresh = app
        .post_with_bearer("/auth/refresh", &token(&login, "refresh_token"))
        .await;
    assert_eq!(401, refresh.status().as_u16());

    assert_eq!(401, app.login("alice", "Correct-pw1").await.status().as_u16());
    assert_eq!(201, app.login("alice", "Brand-new-pw2").await.status().as_u16());
}

#[tokio::test]
async fn password_reset_with_wrong_current_password_is_rejected() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;

    let response = app
        .api_client
        .put(&format!("{}/users/me/password", &app.address))
        .bearer_auth(token(&login, "access_token"))
        .json(&json!({ "current_password": "Wrong-pw1", "new_password": "Brand-new-pw2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(401, response.status().as_u16());

    let refresh = app
        .post_with_bearer("/auth/refresh", &token(&login, "refresh_token"))
        .await;
    assert_eq!(201, refresh.status().as_u16());
}

#[tokio::test]
async fn profile_update_replaces_fields_and_revokes_sessions() {
    let app = spawn_app().await;
    let login = app.signed_in("alice", "Correct-pw1").await;

    let response = app
        .api_client
        .put(&format!("{}/users/me", &app.address))
        .bearer_auth(token(&login, "access_token"))
        .json(&json!({
            "username": "alice_b",
            "email": "alice.b@example.com",
            "password": "Another-pw3"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], "alice_b");
    assert_eq!(body["email"], "alice.b@example.com");
    assert_eq!(body["id"], login["id"]);

    let refresh = app
        .post_with_bearer("/auth/refresh", &token(&login, "refresh_token"))
        .await;
    assert_eq!(401, refresh.status().as_u16());
    assert_eq!(201, app.login("alice_b", "Another-pw3").await.status().as_u16());
}

#[tokio::test]
async fn profile_update_to_taken_username_returns_409() {
    let app = spawn_app().await;
    app.register("bob_smith", "Correct-pw1").await;
    let login = app.signed_in("alice", "Correct-pw1").await;

    let response = app
        .api_client
        .put(&format!("{}/users/me", &app.address))
        .bearer_auth(token(&login, "access_token"))
        .json(&json!({
            "username": "bob_smith",
            "email": "alice@example.com",
            "password": "Correct-pw1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(409, response.status().as_u16());
}
