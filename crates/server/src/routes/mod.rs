use axum::{Router, middleware::from_fn_with_state};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{middleware::require_api_key, state::AppState};

pub mod checkins;
pub mod dashboard;
pub mod events;
pub mod files;
pub mod health;
pub mod notes;
pub mod routines;
pub mod sectors;
pub mod tasks;
pub mod units;

/// Every endpoint under `/api`. Health checks and stored files skip the key check.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(sectors::router())
        .merge(units::router())
        .merge(routines::router())
        .merge(checkins::router())
        .merge(tasks::router())
        .merge(dashboard::router())
        .merge(notes::router())
        .merge(events::router())
        .layer(from_fn_with_state(state.clone(), require_api_key));

    let public = Router::new()
        .merge(health::router())
        .merge(files::router());

    Router::new()
        .nest("/api", protected.merge(public))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
