use std::io::Cursor;

use chrono::offset::Utc;
use futures_util::{pin_mut, TryStreamExt};
use image::io::Reader as ImageReader;
use serde::Serialize;
use tokio::task;
use warp::{hyper::body::Buf, multipart::FormData, reply::Response, Rejection, Reply};

use crate::{
    error::{
        error_reply,
        Error::{
            self, ImageError, InvalidRequestInputError, InvalidToken, NoImageData, NoQrCode,
            TokenNotFound, UserNotFound,
        },
    },
    payload::TokenPayload,
    state::AppState,
    store::RecordStore,
};

pub const IMAGE_FIELD: &str = "image";

/// Uploads claiming more pixels than this are not decoded.
pub const MAX_IMAGE_PIXELS: u64 = 40_000_000;

#[derive(Debug, PartialEq, Serialize)]
pub struct GrantedUser {
    pub username: String,
    pub role: String,
}

#[derive(Serialize)]
struct VerifyResponse {
    success: bool,
    message: &'static str,
    user: GrantedUser,
}

/// Failures are answered here as `{error}` replies, never as rejections.
pub async fn verify_handler(form: FormData, state: AppState) -> Result<Response, Rejection> {
    let outcome = match read_image_field(form).await {
        Ok(image) => {
            let store = state.store.clone();
            task::spawn_blocking(move || verify_image(store.as_ref(), &image))
                .await
                .unwrap_or_else(|e| Err(ImageError(format!("Verification task failed: {}", e))))
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(user) => {
            log::info!("Access granted to '{}' ({})", &user.username, &user.role);
            Ok(warp::reply::json(&VerifyResponse {
                success: true,
                message: "Access granted",
                user,
            })
            .into_response())
        }
        Err(e) => {
            if e.status().is_server_error() {
                log::error!("Verification failed: {}", e);
            } else {
                log::info!("Access denied: {}", e);
            }
            Ok(error_reply(e.status(), e.to_string()).into_response())
        }
    }
}

/// Runs a scanned image through decode, parse, lookup and validity checks, and
/// stamps the matched token's `last_used` on success.
pub fn verify_image(store: &dyn RecordStore, image_bytes: &[u8]) -> Result<GrantedUser, Error> {
    if image_bytes.is_empty() {
        return Err(NoImageData);
    }

    // first decoded code wins
    let qr_data = decode_qr_strings(image_bytes)
        .into_iter()
        .next()
        .ok_or(NoQrCode)?;

    let payload = TokenPayload::parse(&qr_data)?;

    let user_pk = payload.user_pk().ok_or(UserNotFound)?;
    let user = store.find_user(user_pk)?.ok_or(UserNotFound)?;
    let token = store.latest_token_for_user(&user)?.ok_or(TokenNotFound)?;

    if !token.is_valid {
        return Err(InvalidToken);
    }

    store.record_usage(token.pk, Utc::now())?;

    Ok(GrantedUser {
        username: user.username,
        role: user.role,
    })
}

/// Every QR code in the image that decodes, in detection order. Bytes that are
/// not a readable image yield no codes.
pub fn decode_qr_strings(image_bytes: &[u8]) -> Vec<String> {
    decode_qr_strings_within(image_bytes, MAX_IMAGE_PIXELS)
}

fn decode_qr_strings_within(image_bytes: &[u8], max_pixels: u64) -> Vec<String> {
    let (width, height) = match image_reader(image_bytes).and_then(|r| r.into_dimensions()) {
        Ok(dimensions) => dimensions,
        Err(e) => {
            log::debug!("Uploaded file is not a readable image: {}", e);
            return Vec::new();
        }
    };
    if u64::from(width) * u64::from(height) > max_pixels {
        log::warn!("Refusing to decode a {}x{} image", width, height);
        return Vec::new();
    }

    let luma = match image_reader(image_bytes).and_then(|r| r.decode()) {
        Ok(image) => image.to_luma8(),
        Err(e) => {
            log::debug!("Uploaded file is not a readable image: {}", e);
            return Vec::new();
        }
    };

    let (width, height) = luma.dimensions();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| luma.get_pixel(x as u32, y as u32).0[0],
    );

    prepared
        .detect_grids()
        .into_iter()
        .filter_map(|grid| match grid.decode() {
            Ok((_, content)) => Some(content),
            Err(e) => {
                log::debug!("Skipping undecodable QR grid: {:?}", e);
                None
            }
        })
        .collect()
}

fn image_reader(image_bytes: &[u8]) -> image::ImageResult<ImageReader<Cursor<&[u8]>>> {
    Ok(ImageReader::new(Cursor::new(image_bytes)).with_guessed_format()?)
}

async fn read_image_field(form: FormData) -> Result<Vec<u8>, Error> {
    pin_mut!(form);

    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| InvalidRequestInputError(format!("Malformed upload: {}", e)))?
    {
        if part.name() != IMAGE_FIELD {
            continue;
        }

        let bytes = part
            .stream()
            .try_fold(Vec::new(), |mut bytes, chunk| async move {
                bytes.extend_from_slice(chunk.chunk());
                Ok::<_, warp::Error>(bytes)
            })
            .await
            .map_err(|e| InvalidRequestInputError(format!("Malformed upload: {}", e)))?;

        return Ok(bytes);
    }

    Err(NoImageData)
}
