use std::{fmt, str::FromStr};

use chrono::{offset::Utc, DateTime};
use diesel::{AsChangeset, Associations, Identifiable, Insertable, Queryable};
use serde::{Deserialize, Serialize};

use crate::schema::{qr_code, qr_user};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, Identifiable, Queryable, Serialize)]
#[table_name = "qr_user"]
#[primary_key(pk)]
pub struct User {
    #[serde(rename = "id")]
    pub pk: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "qr_user"]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// Admin edit of a user. `None` leaves the column untouched; `username` and
/// `date_joined` are never changed.
#[derive(Clone, Debug, Default, AsChangeset)]
#[table_name = "qr_user"]
pub struct UserChanges {
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.role.is_none() && self.is_active.is_none()
    }
}

/// An issued access token. `image` is written once on insert and never updated.
#[derive(Clone, Debug, Associations, Identifiable, Queryable, Serialize)]
#[belongs_to(User, foreign_key = "fk_user")]
#[table_name = "qr_code"]
#[primary_key(pk)]
pub struct QrToken {
    #[serde(rename = "id")]
    pub pk: i32,
    #[serde(rename = "user_id")]
    pub fk_user: i32,
    pub created_at: DateTime<Utc>,
    pub image_name: String,
    #[serde(skip_serializing)]
    pub image: Vec<u8>,
    pub is_valid: bool,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "qr_code"]
pub struct NewQrToken {
    pub fk_user: i32,
    pub created_at: DateTime<Utc>,
    pub image_name: String,
    pub image: Vec<u8>,
    pub is_valid: bool,
}

/// Token row joined with the owner columns the admin listing shows.
#[derive(Clone, Debug, Serialize)]
pub struct TokenListing {
    #[serde(flatten)]
    pub token: QrToken,
    pub username: String,
    pub email: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenFilter {
    pub is_valid: Option<bool>,
    pub search: Option<String>,
}
