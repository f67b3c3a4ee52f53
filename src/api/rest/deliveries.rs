use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::bid::{Bid, BidId};
use crate::models::delivery::{Delivery, DeliveryId, DeliveryStatus, GeoPoint, NewDelivery};
use crate::models::position::PositionSample;
use crate::models::principal::Principal;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_open_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/bids", post(submit_bid).get(list_bids))
        .route("/deliveries/:id/bids/:bid_id/accept", post(accept_bid))
        .route("/deliveries/:id/assign", post(assign_courier))
        .route("/deliveries/:id/status", post(advance_status))
        .route(
            "/deliveries/:id/positions",
            post(publish_position).get(position_history),
        )
}

#[derive(Deserialize)]
pub struct SubmitBidRequest {
    pub amount: i64,
    #[serde(default)]
    pub note: String,
}

#[derive(Deserialize)]
pub struct AssignCourierRequest {
    pub courier_id: Uuid,
    pub price: i64,
}

#[derive(Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: DeliveryStatus,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(payload): Json<NewDelivery>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state.dispatcher.create(&principal, payload).await?;
    Ok(Json(delivery))
}

async fn list_open_deliveries(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<Vec<Delivery>>, AppError> {
    let deliveries = state.dispatcher.list_open(&principal).await?;
    Ok(Json(deliveries))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state.dispatcher.get_delivery(id, &principal).await?;
    Ok(Json(delivery))
}

async fn submit_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
    Json(payload): Json<SubmitBidRequest>,
) -> Result<Json<Bid>, AppError> {
    let bid = state
        .dispatcher
        .submit_bid(id, &principal, payload.amount, payload.note)
        .await?;
    Ok(Json(bid))
}

async fn list_bids(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
) -> Result<Json<Vec<Bid>>, AppError> {
    let bids = state.dispatcher.list_bids(id, &principal).await?;
    Ok(Json(bids))
}

async fn accept_bid(
    State(state): State<Arc<AppState>>,
    Path((id, bid_id)): Path<(DeliveryId, BidId)>,
    principal: Principal,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state.dispatcher.accept_bid(id, bid_id, &principal).await?;
    Ok(Json(delivery))
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
    Json(payload): Json<AssignCourierRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .dispatcher
        .assign_courier(id, payload.courier_id, payload.price, &principal)
        .await?;
    Ok(Json(delivery))
}

async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
    Json(payload): Json<AdvanceStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state
        .dispatcher
        .advance_status(id, payload.status, &principal)
        .await?;
    Ok(Json(delivery))
}

async fn publish_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
    Json(payload): Json<GeoPoint>,
) -> Result<Json<PositionSample>, AppError> {
    let sample = state.hub.publish_position(id, &principal, payload).await?;
    Ok(Json(sample))
}

async fn position_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    principal: Principal,
) -> Result<Json<Vec<PositionSample>>, AppError> {
    let samples = state.dispatcher.position_history(id, &principal).await?;
    Ok(Json(samples))
}
