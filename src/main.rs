#[macro_use]
extern crate diesel;
#[cfg(feature = "auto_migration")]
#[macro_use]
extern crate diesel_migrations;

use std::sync::Arc;

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod generator;
pub mod issuance;
pub mod logging;
pub mod model;
pub mod notifier;
pub mod payload;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod templating;
pub mod verifier;

#[cfg(test)]
mod testing;

use crate::{
    config::Config,
    notifier::SmtpNotifier,
    state::AppState,
    store::{PgPool, PgStore},
};

#[cfg(feature = "auto_migration")]
embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    logging::init(&config)?;

    log::info!("Starting qr_access v{}", env!("CARGO_PKG_VERSION"));

    let pool = store::connect(&config)?;
    run_migrations(&pool)?;

    let notifier = SmtpNotifier::new(&config.smtp)?;
    log::info!("Mailing QR codes through {}:{}", &config.smtp.host, config.smtp.port);

    let state = AppState::new(&config, Arc::new(PgStore::new(pool)), Arc::new(notifier));
    if state.admin_api_key.is_none() {
        log::warn!("ADMIN_API_KEY is not set, admin routes will refuse every request");
    }

    log::info!("Listening on {}", config.bind_address);
    warp::serve(routes::routes(state))
        .run(config.bind_address)
        .await;

    Ok(())
}

#[cfg(feature = "auto_migration")]
fn run_migrations(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let connection = pool.get()?;
    embedded_migrations::run(&*connection)?;
    log::info!("Database migrations applied");
    Ok(())
}

#[cfg(not(feature = "auto_migration"))]
fn run_migrations(_pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    Ok(())
}
