//! In-memory stand-ins for PostgreSQL and SMTP used by the unit tests.

use std::sync::Mutex;

use chrono::{offset::Utc, DateTime, Duration};

use crate::{
    error::Error,
    model::{
        NewQrToken, NewUser, QrToken, TokenFilter, TokenListing, User, UserChanges, UserFilter,
    },
    notifier::Notifier,
    store::RecordStore,
};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    tokens: Vec<QrToken>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user with an explicit pk, mirroring a row created by registration.
    pub fn add_user(&self, pk: i32, username: &str, role: &str) -> User {
        let user = User {
            pk,
            username: username.to_owned(),
            email: format!("{}@example.com", username),
            role: role.to_owned(),
            is_active: true,
            date_joined: Utc::now(),
        };
        self.inner.lock().unwrap().users.push(user.clone());
        user
    }

    /// Adds a token whose image is `image`, created `age` before now.
    pub fn add_token(&self, user: &User, image: Vec<u8>, is_valid: bool, age: Duration) -> QrToken {
        self.insert_token(NewQrToken {
            fk_user: user.pk,
            created_at: Utc::now() - age,
            image_name: format!("qr_code_{}.png", user.username),
            image,
            is_valid,
        })
        .unwrap()
    }

    pub fn token(&self, token_pk: i32) -> QrToken {
        self.find_token(token_pk).unwrap().unwrap()
    }

    pub fn token_count(&self) -> usize {
        self.inner.lock().unwrap().tokens.len()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl RecordStore for MemoryStore {
    fn find_user(&self, user_pk: i32) -> Result<Option<User>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.pk == user_pk).cloned())
    }

    fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, Error> {
        let inner = self.inner.lock().unwrap();
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let mut users = inner
            .users
            .iter()
            .filter(|u| filter.role.map_or(true, |r| u.role == r.as_str()))
            .filter(|u| filter.is_active.map_or(true, |a| u.is_active == a))
            .filter(|u| {
                search.map_or(true, |s| {
                    contains_ignore_case(&u.username, s) || contains_ignore_case(&u.email, s)
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    fn insert_user(&self, new_user: NewUser) -> Result<User, Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .users
            .iter()
            .any(|u| u.username == new_user.username || u.email == new_user.email)
        {
            return Err(Error::InvalidRequestInputError(String::from(
                "A user with this username or email already exists",
            )));
        }

        let user = User {
            pk: inner.users.iter().map(|u| u.pk).max().unwrap_or(0) + 1,
            username: new_user.username,
            email: new_user.email,
            role: new_user.role,
            is_active: new_user.is_active,
            date_joined: new_user.date_joined,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    fn update_user(&self, user_pk: i32, changes: UserChanges) -> Result<Option<User>, Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(email) = &changes.email {
            if inner.users.iter().any(|u| u.pk != user_pk && &u.email == email) {
                return Err(Error::InvalidRequestInputError(String::from(
                    "A user with this username or email already exists",
                )));
            }
        }

        Ok(inner.users.iter_mut().find(|u| u.pk == user_pk).map(|u| {
            if let Some(email) = changes.email {
                u.email = email;
            }
            if let Some(role) = changes.role {
                u.role = role;
            }
            if let Some(is_active) = changes.is_active {
                u.is_active = is_active;
            }
            u.clone()
        }))
    }

    fn delete_user(&self, user_pk: i32) -> Result<bool, Error> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|u| u.pk != user_pk);
        if inner.users.len() == before {
            return Ok(false);
        }
        inner.tokens.retain(|t| t.fk_user != user_pk);
        Ok(true)
    }

    fn find_token(&self, token_pk: i32) -> Result<Option<QrToken>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tokens.iter().find(|t| t.pk == token_pk).cloned())
    }

    fn latest_token_for_user(&self, user: &User) -> Result<Option<QrToken>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tokens
            .iter()
            .filter(|t| t.fk_user == user.pk)
            .max_by_key(|t| (t.created_at, t.pk))
            .cloned())
    }

    fn list_tokens(&self, filter: &TokenFilter) -> Result<Vec<TokenListing>, Error> {
        let inner = self.inner.lock().unwrap();
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let mut listings = inner
            .tokens
            .iter()
            .filter(|t| filter.is_valid.map_or(true, |v| t.is_valid == v))
            .filter_map(|t| {
                let owner = inner.users.iter().find(|u| u.pk == t.fk_user)?;
                Some(TokenListing {
                    token: t.clone(),
                    username: owner.username.clone(),
                    email: owner.email.clone(),
                })
            })
            .filter(|l| {
                search.map_or(true, |s| {
                    contains_ignore_case(&l.username, s) || contains_ignore_case(&l.email, s)
                })
            })
            .collect::<Vec<_>>();
        listings.sort_by(|a, b| {
            (b.token.created_at, b.token.pk).cmp(&(a.token.created_at, a.token.pk))
        });
        Ok(listings)
    }

    fn insert_token(&self, new_token: NewQrToken) -> Result<QrToken, Error> {
        let mut inner = self.inner.lock().unwrap();
        let token = QrToken {
            pk: inner.tokens.iter().map(|t| t.pk).max().unwrap_or(0) + 1,
            fk_user: new_token.fk_user,
            created_at: new_token.created_at,
            image_name: new_token.image_name,
            image: new_token.image,
            is_valid: new_token.is_valid,
            last_used: None,
        };
        inner.tokens.push(token.clone());
        Ok(token)
    }

    fn set_token_validity(&self, token_pk: i32, is_valid: bool) -> Result<Option<QrToken>, Error> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.tokens.iter_mut().find(|t| t.pk == token_pk).map(|t| {
            t.is_valid = is_valid;
            t.clone()
        }))
    }

    fn delete_token(&self, token_pk: i32) -> Result<bool, Error> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| t.pk != token_pk);
        Ok(inner.tokens.len() < before)
    }

    fn invalidate_tokens_for_user(&self, user_pk: i32) -> Result<usize, Error> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0;
        for token in inner
            .tokens
            .iter_mut()
            .filter(|t| t.fk_user == user_pk && t.is_valid)
        {
            token.is_valid = false;
            changed += 1;
        }
        Ok(changed)
    }

    fn record_usage(&self, token_pk: i32, used_at: DateTime<Utc>) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(token) = inner.tokens.iter_mut().find(|t| t.pk == token_pk) {
            token.last_used = Some(used_at);
        }
        Ok(())
    }
}

/// Records every delivery instead of talking to an SMTP server.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn failing(message: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(message.to_owned()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send_token(&self, user: &User, token: &QrToken) -> Result<(), Error> {
        if let Some(message) = &self.fail_with {
            return Err(Error::MailError(message.clone()));
        }
        if token.image.is_empty() {
            return Ok(());
        }

        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), token.image_name.clone()));
        Ok(())
    }
}
