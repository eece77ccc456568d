use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest},
    jwt::JwtKeys,
    password::verify_password,
};
use crate::{
    error::{AppError, AppResult, ErrorResponse},
    state::AppState,
    users::model::UserRecord,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

fn issue_tokens(keys: &JwtKeys, user: UserRecord) -> AppResult<AuthResponse> {
    Ok(AuthResponse {
        access_token: keys.sign_access(user.id())?,
        refresh_token: keys.sign_refresh(user.id())?,
        user: user.into(),
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = AuthResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let username = payload.username.trim();

    let Some(user) = state.users.find_by_username(username).await? else {
        warn!(%username, "login unknown username");
        return Err(AppError::unauthorized("Invalid credentials"));
    };

    if !verify_password(&payload.password, &user.account.password_hash)? {
        warn!(user_id = %user.id(), "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    if !user.account.is_active {
        warn!(user_id = %user.id(), "login inactive user");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    state.users.touch_last_login(user.id()).await?;
    let user = state.users.get(user.id()).await?.unwrap_or(user);

    info!(user_id = %user.id(), "user logged in");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_tokens(&keys, user)?))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "A new token pair", body = AuthResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 401, description = "Invalid, expired or non-refresh token", body = ErrorResponse)
    )
)]
#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::unauthorized(e.to_string()))?;

    let user = match state.users.get(claims.user_id()).await? {
        Some(u) if u.account.is_active => u,
        _ => return Err(AppError::unauthorized("User not found")),
    };

    Ok(Json(issue_tokens(&keys, user)?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        app::build_app,
        state::AppState,
        users::{dto::UserField, memory::MemoryUserRepo, repo::UserRepo, services::create_user},
    };

    async fn seeded() -> (AppState, Arc<MemoryUserRepo>) {
        let repo = Arc::new(MemoryUserRepo::new());
        let req = serde_json::from_value(json!({
            "username": "linus",
            "email": "linus@kernel.org",
            "password": "penguin-power",
        }))
        .unwrap();
        create_user(repo.as_ref(), uuid::Uuid::nil(), req).await.unwrap();
        (AppState::fake_with(repo.clone()), repo)
    }

    async fn post(state: AppState, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = build_app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn login_issues_tokens_and_records_last_login() {
        let (state, _) = seeded().await;
        let (status, body) = post(
            state,
            "/auth/login",
            json!({ "username": "linus", "password": "penguin-power" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].as_str().is_some());
        assert!(body["refresh_token"].as_str().is_some());
        assert_eq!(body["user"]["username"], "linus");
        assert!(body["user"]["last_login"].is_string());
        assert!(body["user"].get("password").is_none());
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let (state, _) = seeded().await;
        let (status, _) = post(
            state,
            "/auth/login",
            json!({ "username": "linus", "password": "wrong" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_rejects_inactive_user() {
        let (state, repo) = seeded().await;
        let user = repo.find_by_username("linus").await.unwrap().unwrap();
        let mut fields = user.fields();
        fields.is_active = false;
        repo.update(user.id(), &fields, &[UserField::IsActive]).await.unwrap();

        let (status, _) = post(
            state,
            "/auth/login",
            json!({ "username": "linus", "password": "penguin-power" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_swaps_refresh_token_for_new_pair() {
        let (state, _) = seeded().await;
        let (_, login) = post(
            state.clone(),
            "/auth/login",
            json!({ "username": "linus", "password": "penguin-power" }),
        )
        .await;

        let (status, body) = post(
            state.clone(),
            "/auth/refresh",
            json!({ "refresh_token": login["refresh_token"] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], login["user"]["id"]);

        let (status, _) = post(
            state,
            "/auth/refresh",
            json!({ "refresh_token": login["access_token"] }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
