use axum::Router;

use crate::{auth, billing, import_csv, plans, subscribers, usage};

pub fn api_routes() -> Router {
    Router::new()
        .merge(auth::routes())
        .merge(plans::routes())
        .merge(subscribers::routes())
        .merge(usage::routes())
        .merge(import_csv::routes())
        .merge(billing::api::routes())
}
