use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::protocol::API_PREFIX;
use shared::types::DiscoveryClientRobot;
use crate::hash;
use crate::service::DiscoveryHandle;

#[derive(Clone)]
pub struct AppState {
    pub discovery: DiscoveryHandle,
}

pub fn router(state: AppState) -> Router {
    let robots = Router::new()
        .route("/robots", get(get_robots))
        .route("/robots/hash", get(get_hash))
        .route("/robots/:name", get(get_robot).delete(remove_robot));

    Router::new()
        .nest(API_PREFIX, robots)
        .with_state(state)
}

async fn get_robots(State(state): State<AppState>) -> Json<Vec<DiscoveryClientRobot>> {
    Json(state.discovery.get_robots().as_ref().clone())
}

async fn get_hash(State(state): State<AppState>) -> String {
    hash::compute_hash(&state.discovery.get_robots())
}

async fn get_robot(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DiscoveryClientRobot>, StatusCode> {
    state
        .discovery
        .get_robots()
        .iter()
        .find(|robot| robot.name == name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn remove_robot(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusCode {
    match state.discovery.remove_robot(name) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::error!("Failed to remove robot: {:#}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
