use chrono::offset::Utc;
use serde::Deserialize;
use validator::Validate;
use warp::{hyper::StatusCode, Rejection, Reply};

use crate::{
    error::Error::{InvalidRequestInputError, TokenNotFound, UserNotFound},
    issuance::issue_token,
    model::{NewUser, Role, TokenFilter, UserChanges, UserFilter},
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email, length(max = 254))]
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// `username` and `date_joined` are read-only once a user exists.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    #[validate(email, length(max = 254))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub user_id: i32,
}

/// Only the validity flag of an existing token can be changed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTokenRequest {
    pub is_valid: bool,
}

pub async fn list_users_handler(filter: UserFilter, state: AppState) -> Result<impl Reply, Rejection> {
    let users = state
        .store
        .list_users(&filter)
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&users))
}

pub async fn create_user_handler(
    request: CreateUserRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    request.validate().map_err(|e| {
        warp::reject::custom(InvalidRequestInputError(format!(
            "Validation failed for user: {}",
            e
        )))
    })?;

    let user = state
        .store
        .insert_user(NewUser {
            username: request.username.trim().to_owned(),
            email: request.email.trim().to_owned(),
            role: request.role.as_str().to_owned(),
            is_active: true,
            date_joined: Utc::now(),
        })
        .map_err(warp::reject::custom)?;
    log::info!("Created user '{}' ({})", &user.username, &user.role);

    Ok(warp::reply::with_status(
        warp::reply::json(&user),
        StatusCode::CREATED,
    ))
}

pub async fn update_user_handler(
    user_pk: i32,
    request: UpdateUserRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    request.validate().map_err(|e| {
        warp::reject::custom(InvalidRequestInputError(format!(
            "Validation failed for user: {}",
            e
        )))
    })?;

    let changes = UserChanges {
        email: request.email.map(|email| email.trim().to_owned()),
        role: request.role.map(|role| role.as_str().to_owned()),
        is_active: request.is_active,
    };
    let user = state
        .store
        .update_user(user_pk, changes)
        .map_err(warp::reject::custom)?
        .ok_or_else(|| warp::reject::custom(UserNotFound))?;
    log::info!("Updated user '{}' ({})", &user.username, &user.role);

    Ok(warp::reply::json(&user))
}

pub async fn delete_user_handler(user_pk: i32, state: AppState) -> Result<impl Reply, Rejection> {
    if !state
        .store
        .delete_user(user_pk)
        .map_err(warp::reject::custom)?
    {
        return Err(warp::reject::custom(UserNotFound));
    }
    log::info!("Deleted user {} and its QR codes", user_pk);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tokens_handler(
    filter: TokenFilter,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let tokens = state
        .store
        .list_tokens(&filter)
        .map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&tokens))
}

pub async fn issue_token_handler(
    request: IssueTokenRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let token = issue_token(
        state.store.as_ref(),
        state.notifier.as_ref(),
        request.user_id,
        state.revoke_previous_on_issue,
    )
    .map_err(warp::reject::custom)?;

    Ok(warp::reply::with_status(
        warp::reply::json(&token),
        StatusCode::CREATED,
    ))
}

pub async fn update_token_handler(
    token_pk: i32,
    request: UpdateTokenRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let token = state
        .store
        .set_token_validity(token_pk, request.is_valid)
        .map_err(warp::reject::custom)?
        .ok_or_else(|| warp::reject::custom(TokenNotFound))?;
    log::info!("QR code {} is_valid set to {}", token.pk, token.is_valid);

    Ok(warp::reply::json(&token))
}

pub async fn delete_token_handler(token_pk: i32, state: AppState) -> Result<impl Reply, Rejection> {
    if !state
        .store
        .delete_token(token_pk)
        .map_err(warp::reject::custom)?
    {
        return Err(warp::reject::custom(TokenNotFound));
    }
    log::info!("Deleted QR code {}", token_pk);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn token_image_handler(token_pk: i32, state: AppState) -> Result<impl Reply, Rejection> {
    let token = state
        .store
        .find_token(token_pk)
        .map_err(warp::reject::custom)?
        .ok_or_else(|| warp::reject::custom(TokenNotFound))?;

    let disposition = format!("attachment; filename=\"{}\"", &token.image_name);
    Ok(warp::reply::with_header(
        warp::reply::with_header(token.image, "content-type", "image/png"),
        "content-disposition",
        disposition,
    ))
}
