use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::loans::router::status_handler;
use crate::workflows::loans::{loan_router, DocumentType, LoanStatus};

fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn start_route_creates_an_initiated_loan() {
    let harness = Harness::new(default_agents());
    let router = loan_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_request("POST", "/api/v1/loans", json!({ "user_id": 1 })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "INITIATED");
    assert_eq!(payload["loan_id"], 1);
}

#[tokio::test]
async fn start_route_rejects_unknown_applicants() {
    let harness = Harness::new(default_agents());
    let router = loan_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_request("POST", "/api/v1/loans", json!({ "user_id": 9 })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("error text")
        .contains("applicant 9"));
}

#[tokio::test]
async fn message_route_returns_the_stage_reply() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::Initiated).await;
    let router = loan_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/loans/{loan_id}/messages"),
            json!({ "message": "sounds good" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "KYC_PENDING");
    assert_eq!(payload["loan_id"], loan_id.0);
}

#[tokio::test]
async fn message_route_answers_missing_loans_conversationally() {
    let harness = Harness::new(default_agents());
    let router = loan_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/loans/55/messages",
            json!({ "message": "hello" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], Value::Null);
}

#[tokio::test]
async fn document_route_registers_uploads_and_closes_after_verification() {
    let harness = Harness::new(default_agents());
    let open = harness.loan_at(LoanStatus::KycPending).await;
    let closed = harness.loan_at(LoanStatus::Verified).await;
    let router = loan_router(harness.orchestrator.clone());
    let upload = json!({
        "document_type": "SALARY_SLIP",
        "storage_reference": "memory://slips/march.pdf",
    });

    let accepted = router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/loans/{open}/documents"),
            upload.clone(),
        ))
        .await
        .expect("route executes");
    assert_eq!(accepted.status(), StatusCode::CREATED);
    let payload = read_json_body(accepted).await;
    assert_eq!(payload["status"], "UPLOADED");

    let refused = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/loans/{closed}/documents"),
            upload,
        ))
        .await
        .expect("route executes");
    assert_eq!(refused.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn document_route_requires_a_storage_reference() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    let router = loan_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/loans/{loan_id}/documents"),
            json!({ "document_type": "PAN", "storage_reference": "  " }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn status_handler_reports_documents_and_missing_loans() {
    let harness = Harness::new(default_agents());
    let loan_id = harness.loan_at(LoanStatus::KycPending).await;
    harness.upload(loan_id, DocumentType::Pan, &pan_text()).await;

    let found = status_handler(State(harness.orchestrator.clone()), Path(loan_id.0)).await;
    assert_eq!(found.status(), StatusCode::OK);
    let payload = read_json_body(found).await;
    assert_eq!(payload["status"], "KYC_PENDING");
    assert_eq!(payload["amount"], 200_000.0);
    assert_eq!(payload["documents"][0]["document_type"], "PAN");
    assert_eq!(payload["documents"][0]["status"], "UPLOADED");

    let missing = status_handler(State(harness.orchestrator.clone()), Path(999)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
