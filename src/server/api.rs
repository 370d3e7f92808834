use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_auth::AuthBearer;
use axum_typed_multipart::TypedMultipart;
use log::info;
use tokio::task::block_in_place;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;

fn authorize(state: &AppState, token: &str) -> Result<()> {
    if state.check_token(token) { Ok(()) } else { Err(AppError::unauthorized()) }
}

/// 上传一张图片进行检索
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    TypedMultipart(data): TypedMultipart<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    authorize(&state, &token)?;
    info!("正在检索上传图片，特征类型: {}", data.feature);
    let response = block_in_place(|| state.search_bytes(&data.file, &data.feature, data.k))?;
    Ok(Json(response))
}

/// 以库中已有图片检索
pub async fn search_id_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<SearchByIdRequest>,
) -> Result<Json<SearchResponse>> {
    authorize(&state, &token)?;
    info!("正在检索图片 {}，特征类型: {}", data.id, data.feature);
    let response = block_in_place(|| state.search_id(&data.id, &data.feature, data.k))?;
    Ok(Json(response))
}

/// 获取特征库统计信息
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<StatsResponse>> {
    authorize(&state, &token)?;
    Ok(Json(state.stats()))
}
