use warp::{Filter, Rejection};

use crate::error::Error;

/// Lets a request through only if it carries `Authorization: Bearer <api_key>`.
/// Without a configured key every admin request is refused.
pub fn admin_guard(api_key: Option<String>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let authorized = match (&api_key, header.as_deref()) {
                (Some(api_key), Some(header)) => bearer_matches(header, api_key),
                _ => false,
            };

            async move {
                if authorized {
                    Ok(())
                } else {
                    log::warn!("Rejected admin request with missing or wrong credentials");
                    Err(warp::reject::custom(Error::Unauthorized))
                }
            }
        })
        .untuple_one()
}

fn bearer_matches(header: &str, api_key: &str) -> bool {
    let token = match header.strip_prefix("Bearer ") {
        Some(token) => token.trim(),
        None => return false,
    };

    // constant time over the key length
    token.len() == api_key.len()
        && token
            .bytes()
            .zip(api_key.bytes())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}
