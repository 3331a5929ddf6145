use std::{iter::Peekable, str::Chars};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use crate::{
    error::Error::{self, InvalidQrData, QrCodeError},
    model::{Role, User},
};

/// Identity triple carried by every issued QR code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TokenPayload {
    #[validate(custom = "validate_user_id")]
    pub user_id: String,
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    pub role: Role,
}

impl TokenPayload {
    pub fn for_user(user: &User) -> Result<Self, Error> {
        let role = user
            .role
            .parse::<Role>()
            .map_err(|e| QrCodeError(format!("Cannot encode user '{}': {}", user.username, e)))?;

        Ok(TokenPayload {
            user_id: user.pk.to_string(),
            username: user.username.clone(),
            role,
        })
    }

    /// Compact JSON, e.g. `{"user_id":"7","username":"alice","role":"user"}`.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| QrCodeError(e.to_string()))
    }

    /// Parses a decoded QR string. Accepts the compact JSON form and the older
    /// `{'user_id': '7', ...}` mapping form; anything else is `InvalidQrData`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let payload = serde_json::from_str::<TokenPayload>(raw)
            .ok()
            .or_else(|| {
                parse_legacy_mapping(raw)
                    .and_then(|fields| serde_json::from_value(Value::Object(fields)).ok())
            })
            .ok_or(InvalidQrData)?;

        payload.validate().map_err(|e| {
            log::debug!("Rejected QR payload: {}", e);
            InvalidQrData
        })?;

        Ok(payload)
    }

    /// The primary key named by `user_id`, or `None` when no row could carry it
    /// (negative, zero, or beyond the key range).
    pub fn user_pk(&self) -> Option<i32> {
        self.user_id.parse::<i32>().ok().filter(|pk| *pk > 0)
    }
}

fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    let digits = user_id.strip_prefix(|c| c == '-' || c == '+').unwrap_or(user_id);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("user_id must be a decimal number"));
    }

    Ok(())
}

/// Reads a flat mapping of quoted strings to quoted strings. Nothing is evaluated;
/// any other literal shape, unknown escape or duplicate key yields `None`.
fn parse_legacy_mapping(raw: &str) -> Option<Map<String, Value>> {
    let mut chars = raw.chars().peekable();
    let mut fields = Map::new();

    expect(&mut chars, '{')?;
    skip_whitespace(&mut chars);
    if chars.peek() == Some(&'}') {
        chars.next();
    } else {
        loop {
            skip_whitespace(&mut chars);
            let key = quoted_string(&mut chars)?;
            skip_whitespace(&mut chars);
            expect(&mut chars, ':')?;
            skip_whitespace(&mut chars);
            let value = quoted_string(&mut chars)?;
            if fields.insert(key, Value::String(value)).is_some() {
                return None;
            }

            skip_whitespace(&mut chars);
            match chars.next()? {
                ',' => {
                    skip_whitespace(&mut chars);
                    // trailing comma
                    if chars.peek() == Some(&'}') {
                        chars.next();
                        break;
                    }
                }
                '}' => break,
                _ => return None,
            }
        }
    }

    skip_whitespace(&mut chars);
    if chars.next().is_some() {
        return None;
    }

    Some(fields)
}

fn expect(chars: &mut Peekable<Chars>, expected: char) -> Option<()> {
    match chars.next() {
        Some(c) if c == expected => Some(()),
        _ => None,
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while chars.peek().map_or(false, |c| c.is_whitespace()) {
        chars.next();
    }
}

fn quoted_string(chars: &mut Peekable<Chars>) -> Option<String> {
    let quote = match chars.next()? {
        c @ '\'' | c @ '"' => c,
        _ => return None,
    };

    let mut value = String::new();
    loop {
        match chars.next()? {
            '\\' => value.push(match chars.next()? {
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                _ => return None,
            }),
            c if c == quote => return Some(value),
            c => value.push(c),
        }
    }
}
