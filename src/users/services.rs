use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::dto::{CreateUserRequest, Pagination, UserFields, UserPatch, UserResponse};
use super::model::NewUser;
use super::repo::UserRepo;
use crate::auth::password::hash_password;
use crate::config::AdminConfig;
use crate::error::{AppError, AppResult};

/// Rejects `fields` if another user already holds its username or email.
async fn ensure_unique(repo: &dyn UserRepo, fields: &UserFields, except: Option<Uuid>) -> AppResult<()> {
    if let Some(other) = repo.find_by_username(&fields.username).await? {
        if Some(other.id()) != except {
            return Err(AppError::conflict("username"));
        }
    }
    if let Some(other) = repo.find_by_email(&fields.email).await? {
        if Some(other.id()) != except {
            return Err(AppError::conflict("email"));
        }
    }
    Ok(())
}

#[instrument(skip(repo))]
pub async fn list_users(repo: &dyn UserRepo, caller: Uuid, page: Pagination) -> AppResult<Vec<UserResponse>> {
    page.validate()?;
    let users = repo.list(page.limit, page.offset).await?;
    Ok(users.into_iter().map(UserResponse::from).collect())
}

#[instrument(skip(repo, req), fields(username = %req.fields.username))]
pub async fn create_user(repo: &dyn UserRepo, caller: Uuid, mut req: CreateUserRequest) -> AppResult<UserResponse> {
    req.fields.normalize();
    req.validate()?;
    ensure_unique(repo, &req.fields, None).await?;

    let password_hash = hash_password(&req.password)?;
    let user = repo
        .create(&NewUser {
            fields: req.fields,
            password_hash,
            is_staff: false,
        })
        .await?;

    info!(user_id = %user.id(), %caller, "user created");
    Ok(user.into())
}

#[instrument(skip(repo))]
pub async fn get_user(repo: &dyn UserRepo, caller: Uuid, id: Uuid) -> AppResult<UserResponse> {
    let user = repo.get(id).await?.ok_or(AppError::NotFound)?;
    Ok(user.into())
}

/// Applies `patch` to the stored record. `partial = false` is a full (PUT) update.
/// Validation runs on the merged result, so nothing is written unless every field passes.
#[instrument(skip(repo, patch))]
pub async fn update_user(
    repo: &dyn UserRepo,
    caller: Uuid,
    id: Uuid,
    patch: UserPatch,
    partial: bool,
) -> AppResult<UserResponse> {
    let current = repo.get(id).await?.ok_or(AppError::NotFound)?;
    if !partial {
        patch.require_full()?;
    }

    let columns = patch.supplied();
    let mut fields = current.fields();
    patch.apply_to(&mut fields);
    fields.normalize();
    fields.validate()?;
    ensure_unique(repo, &fields, Some(id)).await?;

    let user = repo
        .update(id, &fields, &columns)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(user_id = %id, %caller, partial, "user updated");
    Ok(user.into())
}

#[instrument(skip(repo))]
pub async fn delete_user(repo: &dyn UserRepo, caller: Uuid, id: Uuid) -> AppResult<()> {
    if !repo.delete(id).await? {
        return Err(AppError::NotFound);
    }
    info!(user_id = %id, %caller, "user deleted");
    Ok(())
}

/// The caller's own record. A valid token for a user that no longer exists is not a session.
#[instrument(skip(repo))]
pub async fn profile(repo: &dyn UserRepo, caller: Uuid) -> AppResult<UserResponse> {
    match repo.get(caller).await? {
        Some(user) => Ok(user.into()),
        None => {
            warn!(%caller, "token for missing user");
            Err(AppError::unauthorized("User not found"))
        }
    }
}

/// Creates the configured staff account unless its username is already taken.
pub async fn ensure_admin(repo: &dyn UserRepo, admin: &AdminConfig) -> anyhow::Result<()> {
    let mut fields = UserFields {
        username: admin.username.clone(),
        email: admin.email.clone(),
        first_name: String::new(),
        last_name: String::new(),
        is_active: true,
        phone_number: String::new(),
        birth_date: None,
        address: String::new(),
        github_link: String::new(),
        linkedin_link: String::new(),
    };
    fields.normalize();

    if repo.find_by_username(&fields.username).await?.is_some() {
        info!(username = %fields.username, "admin account already present");
        return Ok(());
    }

    let req = CreateUserRequest {
        fields,
        password: admin.password.clone(),
    };
    req.validate()?;

    let user = repo
        .create(&NewUser {
            password_hash: hash_password(&req.password)?,
            fields: req.fields,
            is_staff: true,
        })
        .await?;
    info!(user_id = %user.id(), username = %user.account.username, "admin account created");
    Ok(())
}
