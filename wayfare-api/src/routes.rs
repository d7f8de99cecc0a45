use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;
use wayfare_core::{
    BookingService, DateRange, HoldReply, PaymentService, PaymentSession, ReservationHold,
    SessionContext, UnitAvailability,
};
use wayfare_store::wire::{
    CreateHoldRequest, CreatePaymentRequest, HoldStatusResponse, PaymentStatusResponse, UnitsQuery,
};
use crate::error::AppError;
use crate::state::AppState;

pub const TRAVELER_HEADER: &str = "x-traveler-id";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/units", get(list_units))
        .route("/v1/holds", post(create_hold))
        .route("/v1/holds/{hold_id}", get(hold_status).delete(cancel_hold))
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments/{payment_id}", get(payment_status).delete(cancel_payment))
        .route("/v1/sandbox/payments/{payment_id}/complete", post(complete_payment))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitsQuery>,
) -> Result<Json<Vec<UnitAvailability>>, AppError> {
    let range = DateRange::new(query.start, query.end)?;
    let units = state.backend.list_units(query.item_type, range).await?;
    Ok(Json(units))
}

/// Traveler identity from the request headers
fn session_context(headers: &HeaderMap) -> Result<SessionContext, AppError> {
    let traveler_id = headers.get(TRAVELER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError(format!("{} header is required", TRAVELER_HEADER)))?;

    let token = headers.get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    Ok(match token {
        Some(token) => SessionContext::login(traveler_id, token),
        None => SessionContext::anonymous(traveler_id),
    })
}

async fn create_hold(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateHoldRequest>,
) -> Result<(StatusCode, Json<ReservationHold>), AppError> {
    let ctx = session_context(&headers)?;
    let range = DateRange::new(req.start, req.end)?;

    match state.backend.create_hold(&ctx, &req.unit_id, range, req.promotion.as_ref()).await? {
        HoldReply::Held { hold } => Ok((StatusCode::CREATED, Json(hold))),
        HoldReply::Conflict { conflicts } => Err(AppError::ConflictError {
            message: format!("Unit {} is already reserved for the requested dates", req.unit_id),
            conflicts,
        }),
    }
}

async fn hold_status(
    State(state): State<AppState>,
    Path(hold_id): Path<String>,
) -> Result<Json<HoldStatusResponse>, AppError> {
    let status = state.backend.verify_hold(&hold_id).await?;
    Ok(Json(HoldStatusResponse { hold_id, status }))
}

async fn cancel_hold(
    State(state): State<AppState>,
    Path(hold_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.backend.cancel_hold(&hold_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentSession>), AppError> {
    let session = state.backend.create_payment(&req.hold_id, req.amount).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let status = state.backend.payment_status(&payment_id).await?;
    Ok(Json(PaymentStatusResponse { payment_id, status }))
}

async fn cancel_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.backend.cancel_payment(&payment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stands in for the payment provider's callback
async fn complete_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let status = state.backend.complete_payment(&payment_id)?;
    info!("Sandbox completed payment {} -> {:?}", payment_id, status);
    Ok(Json(PaymentStatusResponse { payment_id, status }))
}
