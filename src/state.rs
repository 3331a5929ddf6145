use std::{convert::Infallible, sync::Arc};

use warp::Filter;

use crate::{config::Config, notifier::Notifier, store::RecordStore};

/// Shared handles passed into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub notifier: Arc<dyn Notifier>,
    pub revoke_previous_on_issue: bool,
    pub admin_api_key: Option<String>,
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn RecordStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            revoke_previous_on_issue: config.revoke_previous_on_issue,
            admin_api_key: config.admin_api_key.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
