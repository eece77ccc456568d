use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::dto::UserFields;

/// Identity row owned by the authentication side (`users`).
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

/// Profile row (`user_profiles`), keyed by the account id.
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub phone_number: String,
    pub birth_date: Option<Date>,
    pub address: String,
    pub github_link: String,
    pub linkedin_link: String,
}

/// A user as stored: account and profile joined by id.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    #[sqlx(flatten)]
    pub account: Account,
    #[sqlx(flatten)]
    pub profile: Profile,
}

impl UserRecord {
    pub fn id(&self) -> Uuid {
        self.account.id
    }

    /// Writable fields as they currently stand.
    pub fn fields(&self) -> UserFields {
        UserFields {
            username: self.account.username.clone(),
            email: self.account.email.clone(),
            first_name: self.account.first_name.clone(),
            last_name: self.account.last_name.clone(),
            is_active: self.account.is_active,
            phone_number: self.profile.phone_number.clone(),
            birth_date: self.profile.birth_date,
            address: self.profile.address.clone(),
            github_link: self.profile.github_link.clone(),
            linkedin_link: self.profile.linkedin_link.clone(),
        }
    }
}

/// Everything needed to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub fields: UserFields,
    pub password_hash: String,
    pub is_staff: bool,
}
