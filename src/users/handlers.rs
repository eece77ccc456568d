use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, Pagination, UserPatch, UserResponse},
    services,
};
use crate::{
    auth::jwt::AuthUser,
    error::{AppError, AppResult, ErrorResponse},
    state::AppState,
};

/// Route table. `AuthUser` is the first extractor on every handler, so the
/// bearer token is checked before the body is read or storage is touched.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route("/users/profile/", get(profile))
        .route(
            "/users/:id/",
            get(get_user)
                .put(put_user)
                .patch(patch_user)
                .delete(delete_user),
        )
}

/// Ids that are not UUIDs cannot name a user.
fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

#[utoipa::path(
    get,
    path = "/users/",
    tag = "users",
    params(Pagination),
    responses(
        (status = 200, description = "Users in creation order", body = [UserResponse]),
        (status = 400, description = "Invalid paging parameters", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[instrument(skip(state, page))]
pub async fn list_users(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    page: Result<Query<Pagination>, QueryRejection>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let Query(page) = page?;
    let users = services::list_users(state.users.as_ref(), caller, page).await?;
    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/users/",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid field or taken username/email", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[instrument(skip(state, payload))]
pub async fn create_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = payload?;
    let user = services::create_user(state.users.as_ref(), caller, payload).await?;
    let location = format!("/users/{}/", user.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}/",
    tag = "users",
    params(("id" = String, Path, description = "User id (UUID)")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[instrument(skip(state))]
pub async fn get_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let id = parse_id(&id)?;
    Ok(Json(services::get_user(state.users.as_ref(), caller, id).await?))
}

#[utoipa::path(
    put,
    path = "/users/{id}/",
    tag = "users",
    params(("id" = String, Path, description = "User id (UUID)")),
    request_body = UserPatch,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid field or taken username/email", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
/// Full update. `username` and `email` are required.
#[instrument(skip(state, payload))]
pub async fn put_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let id = parse_id(&id)?;
    let Json(patch) = payload?;
    Ok(Json(
        services::update_user(state.users.as_ref(), caller, id, patch, false).await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/users/{id}/",
    tag = "users",
    params(("id" = String, Path, description = "User id (UUID)")),
    request_body = UserPatch,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid field or taken username/email", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
/// Partial update. Only supplied fields are written.
#[instrument(skip(state, payload))]
pub async fn patch_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let id = parse_id(&id)?;
    let Json(patch) = payload?;
    Ok(Json(
        services::update_user(state.users.as_ref(), caller, id, patch, true).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/",
    tag = "users",
    params(("id" = String, Path, description = "User id (UUID)")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[instrument(skip(state))]
pub async fn delete_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_id(&id)?;
    services::delete_user(state.users.as_ref(), caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/profile/",
    tag = "users",
    responses(
        (status = 200, description = "The caller's own record", body = UserResponse),
        (status = 401, description = "Missing or invalid access token, or the user is gone", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
/// The caller's own record.
#[instrument(skip(state))]
pub async fn profile(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(services::profile(state.users.as_ref(), caller).await?))
}
