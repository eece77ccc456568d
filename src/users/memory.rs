//! In-memory `UserRepo` for tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{UserField, UserFields};
use super::model::{Account, NewUser, Profile, UserRecord};
use super::repo::UserRepo;
use crate::error::{AppError, AppResult};

#[derive(Default)]
pub struct MemoryUserRepo {
    rows: Mutex<Vec<UserRecord>>,
    calls: AtomicUsize,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of repository calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Mirrors the unique constraints, for the columns being written.
    fn check_unique(
        rows: &[UserRecord],
        fields: &UserFields,
        columns: &[UserField],
        except: Option<Uuid>,
    ) -> AppResult<()> {
        let username = columns.contains(&UserField::Username);
        let email = columns.contains(&UserField::Email);
        for r in rows.iter().filter(|r| Some(r.id()) != except) {
            if username && r.account.username == fields.username {
                return Err(AppError::conflict("username"));
            }
            if email && r.account.email == fields.email {
                return Err(AppError::conflict("email"));
            }
        }
        Ok(())
    }
}

fn write_fields(record: &mut UserRecord, f: &UserFields, columns: &[UserField]) {
    let (account, profile) = (&mut record.account, &mut record.profile);
    for &column in columns {
        match column {
            UserField::Username => account.username = f.username.clone(),
            UserField::Email => account.email = f.email.clone(),
            UserField::FirstName => account.first_name = f.first_name.clone(),
            UserField::LastName => account.last_name = f.last_name.clone(),
            UserField::IsActive => account.is_active = f.is_active,
            UserField::PhoneNumber => profile.phone_number = f.phone_number.clone(),
            UserField::BirthDate => profile.birth_date = f.birth_date,
            UserField::Address => profile.address = f.address.clone(),
            UserField::GithubLink => profile.github_link = f.github_link.clone(),
            UserField::LinkedinLink => profile.linkedin_link = f.linkedin_link.clone(),
        }
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn list(&self, limit: Option<i64>, offset: i64) -> AppResult<Vec<UserRecord>> {
        self.hit();
        let rows = self.rows.lock().unwrap();
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows.iter().skip(offset as usize).take(limit).cloned().collect())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<UserRecord>> {
        self.hit();
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|r| r.id() == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        self.hit();
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|r| r.account.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        self.hit();
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|r| r.account.email == email).cloned())
    }

    async fn create(&self, new: &NewUser) -> AppResult<UserRecord> {
        self.hit();
        let mut rows = self.rows.lock().unwrap();
        Self::check_unique(&rows, &new.fields, &UserField::ALL, None)?;
        let mut record = UserRecord {
            account: Account {
                id: Uuid::new_v4(),
                username: String::new(),
                email: String::new(),
                password_hash: new.password_hash.clone(),
                first_name: String::new(),
                last_name: String::new(),
                is_active: true,
                is_staff: new.is_staff,
                date_joined: OffsetDateTime::now_utc(),
                last_login: None,
            },
            profile: Profile {
                phone_number: String::new(),
                birth_date: None,
                address: String::new(),
                github_link: String::new(),
                linkedin_link: String::new(),
            },
        };
        write_fields(&mut record, &new.fields, &UserField::ALL);
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: Uuid,
        fields: &UserFields,
        columns: &[UserField],
    ) -> AppResult<Option<UserRecord>> {
        self.hit();
        let mut rows = self.rows.lock().unwrap();
        Self::check_unique(&rows, fields, columns, Some(id))?;
        let Some(record) = rows.iter_mut().find(|r| r.id() == id) else {
            return Ok(None);
        };
        write_fields(record, fields, columns);
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        self.hit();
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        Ok(rows.len() != before)
    }

    async fn touch_last_login(&self, id: Uuid) -> AppResult<()> {
        self.hit();
        let mut rows = self.rows.lock().unwrap();
        if let Some(record) = rows.iter_mut().find(|r| r.id() == id) {
            record.account.last_login = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }
}
