use axum::extract::State;
use axum::Json;
use serde::Serialize;

use door_core::cache::{Generation, GenerationInfo};

use crate::error::AppError;
use crate::lifecycle::blocking;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CacheStatusView {
    pub name: String,
    pub active: Option<Generation>,
    pub active_tag: Option<String>,
    pub generations: Vec<GenerationInfo>,
}

/// GET /__door/cache: active generation and stored generations.
pub async fn get_status(State(app): State<AppState>) -> Result<Json<CacheStatusView>, AppError> {
    let status = blocking(&app.cache, |db| db.status()).await?;
    Ok(Json(CacheStatusView {
        active_tag: status.active.map(|g| g.tag(&app.cache_name)),
        active: status.active,
        generations: status.generations,
        name: app.cache_name.clone(),
    }))
}
