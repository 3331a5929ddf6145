use std::convert::Infallible;

use serde::Serialize;
use thiserror::Error;
use warp::{hyper::StatusCode, reject::Reject, Rejection, Reply};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("No image data received")]
    NoImageData,
    #[error("No QR code found")]
    NoQrCode,
    #[error("Invalid QR code data")]
    InvalidQrData,
    #[error("User not found")]
    UserNotFound,
    #[error("QR code not found")]
    TokenNotFound,
    #[error("QR code is invalid")]
    InvalidToken,
    #[error("Invalid request method")]
    MethodNotAllowed,
    #[error("{0}")]
    InvalidRequestInputError(String),
    #[error("Invalid or missing admin credentials")]
    Unauthorized,
    #[error("{0}")]
    DatabaseConnectionError(String),
    #[error("{0}")]
    QueryError(String),
    #[error("{0}")]
    QrCodeError(String),
    #[error("{0}")]
    ImageError(String),
    #[error("{0}")]
    MailError(String),
    #[error("{0}")]
    TeraError(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NoImageData
            | Error::NoQrCode
            | Error::InvalidQrData
            | Error::InvalidToken
            | Error::InvalidRequestInputError(_) => StatusCode::BAD_REQUEST,
            Error::UserNotFound | Error::TokenNotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::DatabaseConnectionError(_)
            | Error::QueryError(_)
            | Error::QrCodeError(_)
            | Error::ImageError(_)
            | Error::MailError(_)
            | Error::TeraError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Reject for Error {}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        Error::QueryError(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for Error {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Error::DatabaseConnectionError(e.to_string())
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
}

pub fn error_reply(code: StatusCode, message: String) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&ErrorResponse { error: message }), code)
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::BAD_REQUEST, String::from("Uploaded payload is too large"))
    } else if let Some(e) = err.find::<Error>() {
        let code = e.status();
        if code.is_server_error() {
            log::error!("Request failed: {}", e);
        }
        (code, e.to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, Error::MethodNotAllowed.to_string())
    } else {
        log::warn!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, String::from("Invalid request"))
    };

    Ok(error_reply(code, message))
}
