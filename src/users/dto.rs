use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

use super::model::UserRecord;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

pub const PASSWORD_MIN_LEN: usize = 8;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]*$").unwrap();
    static ref URL_SCHEME_RE: Regex = Regex::new(r"^(?i)(https?|ftps?)://").unwrap();
    static ref URL_HOST_RE: Regex = Regex::new(
        r"^(?i)(\[[0-9a-f:.]+\]|[\p{L}\p{N}]([\p{L}\p{N}-]*[\p{L}\p{N}])?(\.[\p{L}\p{N}]([\p{L}\p{N}-]*[\p{L}\p{N}])?)*\.?)$"
    )
    .unwrap();
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::new("invalid_username").with_message(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .into(),
        ));
    }
    Ok(())
}

/// Host part of `scheme://[userinfo@]host[:port]/...`, without userinfo or port.
fn url_host(value: &str) -> Option<&str> {
    let rest = value.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    if host_port.starts_with('[') {
        return host_port.find(']').map(|end| &host_port[..=end]);
    }
    Some(host_port.split_once(':').map_or(host_port, |(h, _)| h))
}

/// Blank, or an absolute http(s)/ftp(s) URL that parses and names a real host.
fn validate_blank_or_url(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Ok(());
    }
    let well_formed = URL_SCHEME_RE.is_match(value)
        && value.validate_url()
        && url_host(value).is_some_and(|h| URL_HOST_RE.is_match(h));
    if well_formed {
        return Ok(());
    }
    Err(ValidationError::new("url").with_message("Enter a valid URL.".into()))
}

fn default_true() -> bool {
    true
}

/// The writable part of a user record, validated as a whole before any write.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate, ToSchema)]
pub struct UserFields {
    #[serde(default)]
    #[validate(
        length(min = 1, max = 150, message = "This field is required and may not exceed 150 characters."),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[serde(default)]
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Ensure this field has no more than 254 characters.")
    )]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: String,

    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    #[validate(length(max = 15, message = "Ensure this field has no more than 15 characters."))]
    pub phone_number: String,

    #[serde(default, with = "iso_date::option")]
    #[schema(value_type = Option<String>, format = Date, example = "1990-01-31")]
    pub birth_date: Option<Date>,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    #[validate(
        length(max = 200, message = "Ensure this field has no more than 200 characters."),
        custom(function = "validate_blank_or_url")
    )]
    pub github_link: String,

    #[serde(default)]
    #[validate(
        length(max = 200, message = "Ensure this field has no more than 200 characters."),
        custom(function = "validate_blank_or_url")
    )]
    pub linkedin_link: String,
}

impl UserFields {
    /// Trims text input and lowercases the email.
    pub fn normalize(&mut self) {
        for s in [
            &mut self.username,
            &mut self.first_name,
            &mut self.last_name,
            &mut self.phone_number,
            &mut self.address,
            &mut self.github_link,
            &mut self.linkedin_link,
        ] {
            *s = s.trim().to_string();
        }
        self.email = self.email.trim().to_lowercase();
    }
}

/// Creation shape: writable fields plus the plaintext password to hash.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub fields: UserFields,
    #[serde(default)]
    #[schema(min_length = 8, write_only)]
    pub password: String,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.fields.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(e) => e,
        };
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.add(
                "password",
                ValidationError::new("min_length").with_message(
                    format!("Ensure this field has at least {PASSWORD_MIN_LEN} characters.").into(),
                ),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn patch_date<'de, D>(d: D) -> Result<Option<Option<Date>>, D::Error>
where
    D: Deserializer<'de>,
{
    iso_date::option::deserialize(d).map(Some)
}

/// A writable column of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Username,
    Email,
    FirstName,
    LastName,
    IsActive,
    PhoneNumber,
    BirthDate,
    Address,
    GithubLink,
    LinkedinLink,
}

impl UserField {
    pub const ALL: [UserField; 10] = [
        Self::Username,
        Self::Email,
        Self::FirstName,
        Self::LastName,
        Self::IsActive,
        Self::PhoneNumber,
        Self::BirthDate,
        Self::Address,
        Self::GithubLink,
        Self::LinkedinLink,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::IsActive => "is_active",
            Self::PhoneNumber => "phone_number",
            Self::BirthDate => "birth_date",
            Self::Address => "address",
            Self::GithubLink => "github_link",
            Self::LinkedinLink => "linkedin_link",
        }
    }

    /// Lives in `user_profiles` rather than `users`.
    pub fn is_profile(self) -> bool {
        matches!(
            self,
            Self::PhoneNumber
                | Self::BirthDate
                | Self::Address
                | Self::GithubLink
                | Self::LinkedinLink
        )
    }
}

/// Update shape. Absent fields keep their stored value; `birth_date: null` clears it.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "patch_date")]
    #[schema(value_type = Option<String>, format = Date, example = "1990-01-31")]
    pub birth_date: Option<Option<Date>>,
    pub address: Option<String>,
    pub github_link: Option<String>,
    pub linkedin_link: Option<String>,
}

impl UserPatch {
    /// A full update must carry every required identity field.
    pub fn require_full(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.username.is_none() {
            errors.add("username", required());
        }
        if self.email.is_none() {
            errors.add("email", required());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Columns this patch writes, in table order.
    pub fn supplied(&self) -> Vec<UserField> {
        [
            (self.username.is_some(), UserField::Username),
            (self.email.is_some(), UserField::Email),
            (self.first_name.is_some(), UserField::FirstName),
            (self.last_name.is_some(), UserField::LastName),
            (self.is_active.is_some(), UserField::IsActive),
            (self.phone_number.is_some(), UserField::PhoneNumber),
            (self.birth_date.is_some(), UserField::BirthDate),
            (self.address.is_some(), UserField::Address),
            (self.github_link.is_some(), UserField::GithubLink),
            (self.linkedin_link.is_some(), UserField::LinkedinLink),
        ]
        .into_iter()
        .filter_map(|(present, field)| present.then_some(field))
        .collect()
    }

    pub fn apply_to(self, fields: &mut UserFields) {
        if let Some(v) = self.username {
            fields.username = v;
        }
        if let Some(v) = self.email {
            fields.email = v;
        }
        if let Some(v) = self.first_name {
            fields.first_name = v;
        }
        if let Some(v) = self.last_name {
            fields.last_name = v;
        }
        if let Some(v) = self.is_active {
            fields.is_active = v;
        }
        if let Some(v) = self.phone_number {
            fields.phone_number = v;
        }
        if let Some(v) = self.birth_date {
            fields.birth_date = v;
        }
        if let Some(v) = self.address {
            fields.address = v;
        }
        if let Some(v) = self.github_link {
            fields.github_link = v;
        }
        if let Some(v) = self.linkedin_link {
            fields.linkedin_link = v;
        }
    }
}

fn required() -> ValidationError {
    ValidationError::new("required").with_message("This field is required.".into())
}

/// Read shape. Never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub phone_number: String,
    #[serde(with = "iso_date::option")]
    #[schema(value_type = Option<String>, format = Date, example = "1990-01-31")]
    pub birth_date: Option<Date>,
    pub address: String,
    pub github_link: String,
    pub linkedin_link: String,
}

impl From<UserRecord> for UserResponse {
    fn from(u: UserRecord) -> Self {
        let UserRecord { account, profile } = u;
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            is_active: account.is_active,
            is_staff: account.is_staff,
            date_joined: account.date_joined,
            last_login: account.last_login,
            phone_number: profile.phone_number,
            birth_date: profile.birth_date,
            address: profile.address,
            github_link: profile.github_link,
            linkedin_link: profile.linkedin_link,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub offset: i64,
}
