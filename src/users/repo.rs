use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::dto::{UserField, UserFields};
use super::model::{NewUser, UserRecord};
use crate::error::{AppError, AppResult};

/// Storage for user records. Each call is one atomic read or write.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// `limit = None` returns every row after `offset`.
    async fn list(&self, limit: Option<i64>, offset: i64) -> AppResult<Vec<UserRecord>>;
    async fn get(&self, id: Uuid) -> AppResult<Option<UserRecord>>;
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>>;
    async fn create(&self, new: &NewUser) -> AppResult<UserRecord>;
    /// Writes only `columns`, taking their values from `fields`.
    /// Returns `None` when no user has this id.
    async fn update(
        &self,
        id: Uuid,
        fields: &UserFields,
        columns: &[UserField],
    ) -> AppResult<Option<UserRecord>>;
    /// Returns `false` when no user has this id.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    async fn touch_last_login(&self, id: Uuid) -> AppResult<()>;
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.first_name, u.last_name,
           u.is_active, u.is_staff, u.date_joined, u.last_login,
           p.phone_number, p.birth_date, p.address, p.github_link, p.linkedin_link
      FROM users u
      JOIN user_profiles p ON p.user_id = u.id
"#;

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> AppResult<Option<UserRecord>> {
        let sql = format!("{SELECT_USER} WHERE {clause}");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

/// Field guarded by a named unique constraint from the migrations.
fn conflict_field(constraint: Option<&str>) -> Option<&'static str> {
    match constraint? {
        "users_username_key" => Some("username"),
        "users_email_key" => Some("email"),
        _ => None,
    }
}

/// Maps unique-constraint violations onto the offending field.
fn map_unique(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            if let Some(field) = conflict_field(db.constraint()) {
                return AppError::conflict(field);
            }
        }
    }
    AppError::Database(e)
}

/// Appends `UPDATE <table> SET col = $n, ... WHERE <key> = $m`.
fn update_statement<'a>(
    table: &str,
    key: &str,
    id: Uuid,
    fields: &'a UserFields,
    columns: &[UserField],
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {table} SET "));
    let mut set = qb.separated(", ");
    for &column in columns {
        set.push(format!("{} = ", column.column()));
        match column {
            UserField::Username => set.push_bind_unseparated(fields.username.as_str()),
            UserField::Email => set.push_bind_unseparated(fields.email.as_str()),
            UserField::FirstName => set.push_bind_unseparated(fields.first_name.as_str()),
            UserField::LastName => set.push_bind_unseparated(fields.last_name.as_str()),
            UserField::IsActive => set.push_bind_unseparated(fields.is_active),
            UserField::PhoneNumber => set.push_bind_unseparated(fields.phone_number.as_str()),
            UserField::BirthDate => set.push_bind_unseparated(fields.birth_date),
            UserField::Address => set.push_bind_unseparated(fields.address.as_str()),
            UserField::GithubLink => set.push_bind_unseparated(fields.github_link.as_str()),
            UserField::LinkedinLink => set.push_bind_unseparated(fields.linkedin_link.as_str()),
        };
    }
    qb.push(format!(" WHERE {key} = ")).push_bind(id);
    qb
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn list(&self, limit: Option<i64>, offset: i64) -> AppResult<Vec<UserRecord>> {
        let sql = format!("{SELECT_USER} ORDER BY u.date_joined, u.id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<UserRecord>> {
        let sql = format!("{SELECT_USER} WHERE u.id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("u.username = $1", username).await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        self.fetch_one_where("u.email = $1", email).await
    }

    async fn create(&self, new: &NewUser) -> AppResult<UserRecord> {
        let f = &new.fields;
        let mut tx = self.db.begin().await.context("begin tx")?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name, is_active, is_staff)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&f.username)
        .bind(&f.email)
        .bind(&new.password_hash)
        .bind(&f.first_name)
        .bind(&f.last_name)
        .bind(f.is_active)
        .bind(new.is_staff)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique)?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, phone_number, birth_date, address, github_link, linkedin_link)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&f.phone_number)
        .bind(f.birth_date)
        .bind(&f.address)
        .bind(&f.github_link)
        .bind(&f.linkedin_link)
        .execute(&mut *tx)
        .await
        .context("insert profile")?;

        let sql = format!("{SELECT_USER} WHERE u.id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await.context("commit tx")?;
        Ok(user)
    }

    async fn update(
        &self,
        id: Uuid,
        fields: &UserFields,
        columns: &[UserField],
    ) -> AppResult<Option<UserRecord>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let (profile, account): (Vec<UserField>, Vec<UserField>) =
            columns.iter().copied().partition(|c| c.is_profile());

        if !account.is_empty() {
            update_statement("users", "id", id, fields, &account)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_unique)?;
        }

        if !profile.is_empty() {
            update_statement("user_profiles", "user_id", id, fields, &profile)
                .build()
                .execute(&mut *tx)
                .await
                .context("update profile")?;
        }

        let sql = format!("{SELECT_USER} WHERE u.id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(user))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
