use chrono::{offset::Utc, DateTime};
use diesel::{
    pg::PgConnection,
    prelude::*,
    r2d2::{self, ConnectionManager, Pool, PooledConnection},
    result::{DatabaseErrorKind, Error as DieselError},
};

use crate::{
    config::Config,
    error::Error,
    model::{
        NewQrToken, NewUser, QrToken, TokenFilter, TokenListing, User, UserChanges, UserFilter,
    },
    schema::{qr_code, qr_user},
};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Persistence for users and their QR codes.
pub trait RecordStore: Send + Sync {
    fn find_user(&self, user_pk: i32) -> Result<Option<User>, Error>;

    /// Users ordered by username.
    fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, Error>;

    fn insert_user(&self, new_user: NewUser) -> Result<User, Error>;

    fn update_user(&self, user_pk: i32, changes: UserChanges) -> Result<Option<User>, Error>;

    /// Deletes the user together with all of its tokens. `false` if there was no such user.
    fn delete_user(&self, user_pk: i32) -> Result<bool, Error>;

    fn find_token(&self, token_pk: i32) -> Result<Option<QrToken>, Error>;

    /// Most recently created token of the user, ties broken by the higher pk.
    fn latest_token_for_user(&self, user: &User) -> Result<Option<QrToken>, Error>;

    /// Tokens with their owner, newest first.
    fn list_tokens(&self, filter: &TokenFilter) -> Result<Vec<TokenListing>, Error>;

    fn insert_token(&self, new_token: NewQrToken) -> Result<QrToken, Error>;

    fn set_token_validity(&self, token_pk: i32, is_valid: bool) -> Result<Option<QrToken>, Error>;

    fn delete_token(&self, token_pk: i32) -> Result<bool, Error>;

    /// Marks every still valid token of the user invalid, returning how many changed.
    fn invalidate_tokens_for_user(&self, user_pk: i32) -> Result<usize, Error>;

    fn record_usage(&self, token_pk: i32, used_at: DateTime<Utc>) -> Result<(), Error>;
}

pub fn connect(config: &Config) -> Result<PgPool, Error> {
    let database_connection_manager =
        ConnectionManager::<PgConnection>::new(config.database_url.clone());
    r2d2::Builder::new()
        .min_idle(Some(config.pool_min_idle))
        .max_size(config.pool_max_size)
        .build(database_connection_manager)
        .map_err(Error::from)
}

/// Wraps `search` in `%` for an ILIKE, escaping the pattern metacharacters it contains.
pub fn search_pattern(search: Option<&str>) -> Option<String> {
    let search = search?.trim();
    if search.is_empty() {
        return None;
    }

    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');

    Some(pattern)
}

fn user_conflict(e: DieselError) -> Error {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            Error::InvalidRequestInputError(String::from(
                "A user with this username or email already exists",
            ))
        }
        e => Error::from(e),
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, Error> {
        self.pool.get().map_err(Error::from)
    }
}

impl RecordStore for PgStore {
    fn find_user(&self, user_pk: i32) -> Result<Option<User>, Error> {
        let connection = self.connection()?;
        let user = qr_user::table
            .find(user_pk)
            .first::<User>(&connection)
            .optional()?;
        Ok(user)
    }

    fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, Error> {
        let connection = self.connection()?;

        let mut query = qr_user::table.into_boxed();
        if let Some(role) = filter.role {
            query = query.filter(qr_user::role.eq(role.as_str()));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(qr_user::is_active.eq(is_active));
        }
        if let Some(pattern) = search_pattern(filter.search.as_deref()) {
            query = query.filter(
                qr_user::username
                    .ilike(pattern.clone())
                    .or(qr_user::email.ilike(pattern)),
            );
        }

        let users = query
            .order(qr_user::username.asc())
            .load::<User>(&connection)?;
        Ok(users)
    }

    fn insert_user(&self, new_user: NewUser) -> Result<User, Error> {
        let connection = self.connection()?;
        diesel::insert_into(qr_user::table)
            .values(&new_user)
            .get_result::<User>(&connection)
            .map_err(user_conflict)
    }

    fn update_user(&self, user_pk: i32, changes: UserChanges) -> Result<Option<User>, Error> {
        if changes.is_empty() {
            return self.find_user(user_pk);
        }

        let connection = self.connection()?;
        diesel::update(qr_user::table.find(user_pk))
            .set(&changes)
            .get_result::<User>(&connection)
            .optional()
            .map_err(user_conflict)
    }

    fn delete_user(&self, user_pk: i32) -> Result<bool, Error> {
        let connection = self.connection()?;
        // qr_code.fk_user cascades
        let deleted = diesel::delete(qr_user::table.find(user_pk)).execute(&connection)?;
        Ok(deleted > 0)
    }

    fn find_token(&self, token_pk: i32) -> Result<Option<QrToken>, Error> {
        let connection = self.connection()?;
        let token = qr_code::table
            .find(token_pk)
            .first::<QrToken>(&connection)
            .optional()?;
        Ok(token)
    }

    fn latest_token_for_user(&self, user: &User) -> Result<Option<QrToken>, Error> {
        let connection = self.connection()?;
        let token = QrToken::belonging_to(user)
            .order((qr_code::created_at.desc(), qr_code::pk.desc()))
            .first::<QrToken>(&connection)
            .optional()?;
        Ok(token)
    }

    fn list_tokens(&self, filter: &TokenFilter) -> Result<Vec<TokenListing>, Error> {
        let connection = self.connection()?;

        let mut query = qr_code::table
            .inner_join(qr_user::table)
            .select((qr_code::all_columns, qr_user::all_columns))
            .into_boxed();
        if let Some(is_valid) = filter.is_valid {
            query = query.filter(qr_code::is_valid.eq(is_valid));
        }
        if let Some(pattern) = search_pattern(filter.search.as_deref()) {
            query = query.filter(
                qr_user::username
                    .ilike(pattern.clone())
                    .or(qr_user::email.ilike(pattern)),
            );
        }

        let rows = query
            .order((qr_code::created_at.desc(), qr_code::pk.desc()))
            .load::<(QrToken, User)>(&connection)?;

        Ok(rows
            .into_iter()
            .map(|(token, user)| TokenListing {
                token,
                username: user.username,
                email: user.email,
            })
            .collect())
    }

    fn insert_token(&self, new_token: NewQrToken) -> Result<QrToken, Error> {
        let connection = self.connection()?;
        let token = diesel::insert_into(qr_code::table)
            .values(&new_token)
            .get_result::<QrToken>(&connection)?;
        Ok(token)
    }

    fn set_token_validity(&self, token_pk: i32, is_valid: bool) -> Result<Option<QrToken>, Error> {
        let connection = self.connection()?;
        let token = diesel::update(qr_code::table.find(token_pk))
            .set(qr_code::is_valid.eq(is_valid))
            .get_result::<QrToken>(&connection)
            .optional()?;
        Ok(token)
    }

    fn delete_token(&self, token_pk: i32) -> Result<bool, Error> {
        let connection = self.connection()?;
        let deleted = diesel::delete(qr_code::table.find(token_pk)).execute(&connection)?;
        Ok(deleted > 0)
    }

    fn invalidate_tokens_for_user(&self, user_pk: i32) -> Result<usize, Error> {
        let connection = self.connection()?;
        let changed = diesel::update(
            qr_code::table
                .filter(qr_code::fk_user.eq(user_pk))
                .filter(qr_code::is_valid.eq(true)),
        )
        .set(qr_code::is_valid.eq(false))
        .execute(&connection)?;
        Ok(changed)
    }

    fn record_usage(&self, token_pk: i32, used_at: DateTime<Utc>) -> Result<(), Error> {
        let connection = self.connection()?;
        diesel::update(qr_code::table.find(token_pk))
            .set(qr_code::last_used.eq(Some(used_at)))
            .execute(&connection)?;
        Ok(())
    }
}
