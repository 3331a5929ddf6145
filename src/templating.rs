use std::error::Error;

use lazy_static::lazy_static;
use tera::Tera;
use warp::{Rejection, Reply};

use crate::{error::Error::TeraError, verifier::IMAGE_FIELD};

pub const VERIFY_PATH: &str = "/api/verify";

lazy_static! {
    pub static ref QR_ACCESS_TEMPLATES: Tera = {
        match Tera::new("src/resources/templates/*.html") {
            Ok(tera) => tera,
            Err(e) => panic!("Could not load tera templates: '{}'", e),
        }
    };
}

pub async fn scanner_handler() -> Result<impl Reply, Rejection> {
    let html = render_scanner_page().map_err(warp::reject::custom)?;
    Ok(warp::reply::html(html))
}

pub fn render_scanner_page() -> Result<String, crate::error::Error> {
    let mut context = tera::Context::new();
    context.insert("title", "QR Code Scanner");
    context.insert("verify_url", VERIFY_PATH);
    context.insert("image_field", IMAGE_FIELD);
    QR_ACCESS_TEMPLATES
        .render("scanner.html", &context)
        .map_err(|e| {
            TeraError(format!(
                "{}: {}",
                e,
                e.source().map_or("None".to_owned(), |s| s.to_string())
            ))
        })
}
