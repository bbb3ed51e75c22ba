//! Exercises the client SDK against an in-process stub of the settlement API.

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use settlement_client::{ClientError, SettlementClient};
use settlement_types::{
    AdmitBatchRequest, AdmitBatchResponse, Amount, DividendPool, NewBatchTask, RecipientShare,
};

async fn admit(Json(req): Json<AdmitBatchRequest>) -> Response {
    match NewBatchTask::new(
        req.external_batch_id,
        req.initiating_user_id,
        req.deposit_reference,
        req.recipients,
        req.metadata,
    ) {
        Ok(new) => (
            StatusCode::ACCEPTED,
            Json(AdmitBatchResponse {
                task: new.to_task(),
                already_existed: false,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string(), "code": 400 })),
        )
            .into_response(),
    }
}

async fn refund(Path(_id): Path<String>) -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": "Deposit payout is already in progress or settled", "code": 409 })),
    )
        .into_response()
}

async fn pool(Path(merchant_id): Path<String>) -> Response {
    if merchant_id != "m-1" {
        return (StatusCode::NOT_FOUND, "no pool").into_response();
    }
    Json(DividendPool {
        merchant_id,
        balance: "0.5".parse().unwrap(),
        updated_at: chrono::Utc::now(),
    })
    .into_response()
}

async fn spawn_api() -> String {
    let app = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "healthy" })) }))
        .route("/api/batches", post(admit))
        .route("/api/deposits/{id}/refund", post(refund))
        .route("/api/merchants/{id}/dividend-pool", get(pool));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn share(address: &str, amount: &str) -> RecipientShare {
    RecipientShare {
        recipient_address: address.into(),
        amount: amount.parse::<Amount>().unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let client = SettlementClient::new(spawn_api().await);

    assert!(client.health().await.unwrap());
}

#[tokio::test]
async fn test_admit_batch() {
    let client = SettlementClient::new(spawn_api().await);
    let req = AdmitBatchRequest {
        external_batch_id: "b-1".into(),
        initiating_user_id: None,
        deposit_reference: Some("dep-1".into()),
        recipients: vec![share("GA", "1.25"), share("GB", "2")],
        metadata: json!({}),
    };

    let resp = client.admit_batch(&req).await.unwrap();

    assert!(!resp.already_existed);
    assert_eq!(resp.task.external_batch_id, "b-1");
    assert_eq!(resp.task.recipient_count, 2);
    assert_eq!(resp.task.total_amount, "3.25".parse::<Amount>().unwrap());
}

#[tokio::test]
async fn test_api_error_carries_server_message() {
    let client = SettlementClient::new(spawn_api().await);
    let req = AdmitBatchRequest {
        external_batch_id: "b-1".into(),
        initiating_user_id: None,
        deposit_reference: None,
        recipients: vec![],
        metadata: json!({}),
    };

    let err = client.admit_batch(&req).await.unwrap_err();

    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_conflict_is_reported() {
    let client = SettlementClient::new(spawn_api().await);

    let err = client
        .refund(settlement_types::DepositId::new(), "alice")
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 409);
            assert!(message.contains("already in progress"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dividend_pool() {
    let client = SettlementClient::new(spawn_api().await);

    let found = client.dividend_pool("m-1").await.unwrap();
    assert_eq!(found.balance, "0.5".parse::<Amount>().unwrap());

    let err = client.dividend_pool("m-2").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no pool");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}
