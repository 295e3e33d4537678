use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RegisterRequest, TokenResponse},
        error::AuthError,
        jwt::JwtKeys,
        services,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AuthError::validation(e.body_text()))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    let req = body(payload)?;

    let user = services::register(state.users.as_ref(), req)
        .await
        .inspect_err(|e| {
            if let AuthError::Validation(msg) = e {
                warn!(reason = %msg, "registration rejected");
            }
        })?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(PublicUser::from(user))))
}

#[instrument(skip(state, keys, payload))]
pub async fn login(
    State(state): State<AppState>,
    State(keys): State<JwtKeys>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AuthError> {
    let req = body(payload)?;
    let email = services::normalize_email(&req.email);

    match services::login(state.users.as_ref(), &keys, req).await {
        Ok(token) => {
            info!(email = %email, "user logged in");
            Ok(Json(TokenResponse { token }))
        }
        Err(e) => {
            if matches!(e, AuthError::InvalidCredentials) {
                warn!(email = %email, "login rejected");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    use super::*;

    async fn call(app: &Router, uri: &str, body: String) -> (StatusCode, Vec<u8>) {
        call_raw(app, uri, Some("application/json"), &body).await
    }

    #[tokio::test]
    async fn register_and_login_over_http() {
        let (state, store) = AppState::fake();
        let app = build_app(state);

        let (status, body) = call(
            &app,
            "/api/v1/auth/register",
            json!({"username": "alice", "email": "alice@example.com", "password": "s3cret"})
                .to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let user: Value = serde_json::from_slice(&body).unwrap();
        assert!(user["id"].as_i64().unwrap() > 0);
        assert_eq!(user["email"], "alice@example.com");
        assert!(user.get("password_hash").is_none());
        assert!(user["created_at"].is_string());
        assert_eq!(store.len().await, 1);

        let (status, body) = call(
            &app,
            "/api/v1/auth/login",
            json!({"email": "alice@example.com", "password": "s3cret"}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token: Value = serde_json::from_slice(&body).unwrap();
        assert!(!token["token"].as_str().unwrap().is_empty());

        let (status, wrong_pw) = call(
            &app,
            "/api/v1/auth/login",
            json!({"email": "alice@example.com", "password": "wrong"}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, unknown) = call(
            &app,
            "/api/v1/auth/login",
            json!({"email": "nobody@example.com", "password": "wrong"}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_pw, unknown);
    }

    #[tokio::test]
    async fn bad_registration_is_400_and_stores_nothing() {
        let (state, store) = AppState::fake();
        let app = build_app(state);

        for payload in [
            json!({"username": "alice", "password": "s3cret"}).to_string(),
            json!({"username": "alice", "email": "not-an-email", "password": "s3cret"})
                .to_string(),
            "{not json".to_string(),
        ] {
            let (status, _) = call(&app, "/api/v1/auth/register", payload).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert_eq!(store.len().await, 0);
    }

    async fn call_raw(
        app: &Router,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            req = req.header(header::CONTENT_TYPE, ct);
        }
        let req = req.body(Body::from(body.to_owned())).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn wrong_content_type_is_400_on_both_routes() {
        let (state, store) = AppState::fake();
        let app = build_app(state);

        let register_body =
            json!({"username": "alice", "email": "alice@example.com", "password": "s3cret"})
                .to_string();
        let login_body = json!({"email": "alice@example.com", "password": "s3cret"}).to_string();

        for content_type in [None, Some("text/plain")] {
            let (status, _) =
                call_raw(&app, "/api/v1/auth/register", content_type, &register_body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "register with {content_type:?}");

            let (status, _) =
                call_raw(&app, "/api/v1/auth/login", content_type, &login_body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "login with {content_type:?}");
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn malformed_json_is_400_on_both_routes() {
        let (state, store) = AppState::fake();
        let app = build_app(state);

        for uri in ["/api/v1/auth/register", "/api/v1/auth/login"] {
            let (status, _) = call(&app, uri, "{not json".to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }

        let (status, _) = call(
            &app,
            "/api/v1/auth/login",
            json!({"email": "not-an-email", "password": "x"}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn storage_outage_is_500() {
        let (state, store) = AppState::fake();
        store.break_backend();
        let app = build_app(state);

        let (status, body) = call(
            &app,
            "/api/v1/auth/register",
            json!({"username": "a", "email": "a@example.com", "password": "p"}).to_string(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"internal server error");
    }

    #[tokio::test]
    async fn health_responds() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let res = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
