use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    auth::dto::{AuthResponse, LoginRequest, RefreshRequest},
    error::ErrorResponse,
    users::dto::{CreateUserRequest, UserFields, UserPatch, UserResponse},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "User Service API",
        description = "User accounts with profile details, behind bearer-token authentication"
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh,
        crate::users::handlers::list_users,
        crate::users::handlers::create_user,
        crate::users::handlers::profile,
        crate::users::handlers::get_user,
        crate::users::handlers::put_user,
        crate::users::handlers::patch_user,
        crate::users::handlers::delete_user,
    ),
    components(
        schemas(
            UserFields,
            CreateUserRequest,
            UserPatch,
            UserResponse,
            LoginRequest,
            RefreshRequest,
            AuthResponse,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "users", description = "User management"),
        (name = "auth", description = "Login and token refresh")
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
