use std::convert::Infallible;

use warp::{http::Method, Filter, Rejection, Reply};

use crate::{
    admin,
    auth::admin_guard,
    error::{self, Error},
    model::{TokenFilter, UserFilter},
    state::{with_state, AppState},
    templating, verifier,
};

const JSON_BODY_LIMIT: u64 = 16 * 1024;

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let scanner_route = warp::get()
        .and(warp::path::end().or(warp::path!("scanner")).unify())
        .and_then(templating::scanner_handler);

    let verify_route = warp::path!("api" / "verify")
        .and(warp::post())
        .and(warp::multipart::form().max_length(state.max_upload_bytes))
        .and(with_state(state.clone()))
        .and_then(verifier::verify_handler);

    let verify_fallback_route = warp::path!("api" / "verify")
        .and(warp::method())
        .and_then(reject_verify_request);

    scanner_route
        .or(verify_route)
        .or(verify_fallback_route)
        .or(admin_routes(state))
        .recover(error::handle_rejection)
        .with(warp::log("qr_access"))
}

fn admin_routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let admin = warp::path("admin").and(admin_guard(state.admin_api_key.clone()));

    let list_users = admin
        .clone()
        .and(warp::path!("users"))
        .and(warp::get())
        .and(warp::query::<UserFilter>())
        .and(with_state(state.clone()))
        .and_then(admin::list_users_handler);

    let create_user = admin
        .clone()
        .and(warp::path!("users"))
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::create_user_handler);

    let update_user = admin
        .clone()
        .and(warp::path!("users" / i32))
        .and(warp::patch())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::update_user_handler);

    let delete_user = admin
        .clone()
        .and(warp::path!("users" / i32))
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(admin::delete_user_handler);

    let list_tokens = admin
        .clone()
        .and(warp::path!("tokens"))
        .and(warp::get())
        .and(warp::query::<TokenFilter>())
        .and(with_state(state.clone()))
        .and_then(admin::list_tokens_handler);

    let issue_token = admin
        .clone()
        .and(warp::path!("tokens"))
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::issue_token_handler);

    let update_token = admin
        .clone()
        .and(warp::path!("tokens" / i32))
        .and(warp::patch())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(admin::update_token_handler);

    let delete_token = admin
        .clone()
        .and(warp::path!("tokens" / i32))
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(admin::delete_token_handler);

    let token_image = admin
        .and(warp::path!("tokens" / i32 / "image"))
        .and(warp::get())
        .and(with_state(state))
        .and_then(admin::token_image_handler);

    list_users
        .or(create_user)
        .or(update_user)
        .or(delete_user)
        .or(list_tokens)
        .or(issue_token)
        .or(update_token)
        .or(delete_token)
        .or(token_image)
}

/// Answers requests to the verify path that the multipart route refused.
async fn reject_verify_request(method: Method) -> Result<&'static str, Rejection> {
    if method == Method::POST {
        Err(warp::reject::custom(Error::NoImageData))
    } else {
        Err(warp::reject::custom(Error::MethodNotAllowed))
    }
}
