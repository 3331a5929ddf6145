use image::{DynamicImage, ImageOutputFormat, Luma};
use qrcode::{EcLevel, QrCode};

use crate::{
    error::Error::{self, ImageError, QrCodeError},
    model::User,
    payload::TokenPayload,
};

pub const MODULE_PIXELS: u32 = 10;

pub struct GeneratedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub fn image_name(username: &str) -> String {
    format!("qr_code_{}.png", username)
}

/// Renders the user's payload as a black on white PNG with a 4 module quiet zone.
pub fn generate_token_image(user: &User) -> Result<GeneratedImage, Error> {
    let data = TokenPayload::for_user(user)?.encode()?;

    let qr_code = QrCode::with_error_correction_level(data, EcLevel::L)
        .map_err(|e| QrCodeError(e.to_string()))?;

    let qr_image = qr_code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .quiet_zone(true)
        .build();

    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(qr_image)
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .map_err(|e| ImageError(e.to_string()))?;

    Ok(GeneratedImage {
        name: image_name(&user.username),
        bytes,
    })
}
