//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use settlement_types::{
    AdmitBatchRequest, AppError, BatchTaskId, ClaimRequest, DepositId, LedgerStore,
    PaymentGateway, RecordDepositRequest, RefundRequest, SettleMerchantRequest,
};

use crate::SettlementService;

/// Application state shared across handlers.
pub struct AppState<L: LedgerStore, G: PaymentGateway> {
    pub service: Arc<SettlementService<L, G>>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Precondition(msg) => (StatusCode::PRECONDITION_FAILED, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_batch_id(id: &str) -> Result<BatchTaskId, ApiError> {
    id.parse()
        .map_err(|_| ApiError(AppError::BadRequest("Invalid batch task ID".into())))
}

fn parse_deposit_id(id: &str) -> Result<DepositId, ApiError> {
    id.parse()
        .map_err(|_| ApiError(AppError::BadRequest("Invalid deposit ID".into())))
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Batches
// ─────────────────────────────────────────────────────────────────────────────

/// Admit a fan-out; dispatch continues in the background.
#[tracing::instrument(skip(state, req), fields(external_batch_id = %req.external_batch_id, recipients = req.recipients.len()))]
pub async fn admit_batch<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Json(req): Json<AdmitBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.admit_and_dispatch(req).await?;
    let status = if resp.already_existed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(resp)))
}

#[tracing::instrument(skip(state), fields(batch_task_id = %id))]
pub async fn get_batch<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_batch_id(&id)?;
    let view = state.service.get_status(id).await?;
    Ok(Json(view))
}

#[tracing::instrument(skip(state))]
pub async fn get_batch_by_external_id<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.service.get_status_by_external_id(&external_id).await?;
    Ok(Json(view))
}

#[tracing::instrument(skip(state), fields(batch_task_id = %id))]
pub async fn resume_batch<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_batch_id(&id)?;
    let view = state.service.resume_batch(id).await?;
    Ok(Json(view))
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposits
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(gateway_payment_id = %req.gateway_payment_id))]
pub async fn record_deposit<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Json(req): Json<RecordDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.record_deposit(req).await?;
    let status = if resp.already_existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(resp)))
}

#[tracing::instrument(skip(state), fields(deposit_id = %id))]
pub async fn get_deposit<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_deposit_id(&id)?;
    let deposit = state.service.get_deposit(id).await?;
    Ok(Json(deposit))
}

#[tracing::instrument(skip(state, req), fields(deposit_id = %id))]
pub async fn refund_deposit<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_deposit_id(&id)?;
    let deposit = state.service.refund(id, &req.caller_user_id).await?;
    Ok(Json(deposit))
}

#[tracing::instrument(skip(state, req), fields(deposit_id = %id))]
pub async fn claim_deposit<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(id): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_deposit_id(&id)?;
    let deposit = state.service.claim(id, req).await?;
    Ok(Json(deposit))
}

// ─────────────────────────────────────────────────────────────────────────────
// Merchant settlement
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(deposit_reference = %req.deposit_reference))]
pub async fn settle_merchant<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Json(req): Json<SettleMerchantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.settle_merchant(req).await?;
    Ok(Json(resp))
}

#[tracing::instrument(skip(state))]
pub async fn dividend_pool<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(merchant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = state.service.dividend_pool(&merchant_id).await?;
    Ok(Json(pool))
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn reconcile<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.service.reconcile().await?;
    Ok(Json(report))
}

#[tracing::instrument(skip(state))]
pub async fn cancel_incomplete<L: LedgerStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cancelled = state.service.cancel_incomplete(&payment_id).await?;
    Ok(Json(cancelled))
}
