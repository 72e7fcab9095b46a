use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{DocumentType, LoanId, UserId};
use super::orchestrator::{LoanStageOrchestrator, OrchestratorError};

#[derive(Debug, Deserialize)]
pub struct StartLoanRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentUploadRequest {
    pub document_type: DocumentType,
    pub storage_reference: String,
}

/// Router builder exposing the loan conversation and upload endpoints.
pub fn loan_router(orchestrator: Arc<LoanStageOrchestrator>) -> Router {
    Router::new()
        .route("/api/v1/loans", post(start_handler))
        .route("/api/v1/loans/:loan_id", get(status_handler))
        .route("/api/v1/loans/:loan_id/messages", post(message_handler))
        .route("/api/v1/loans/:loan_id/documents", post(document_handler))
        .with_state(orchestrator)
}

pub(crate) async fn start_handler(
    State(orchestrator): State<Arc<LoanStageOrchestrator>>,
    axum::Json(request): axum::Json<StartLoanRequest>,
) -> Response {
    match orchestrator.start_loan(request.user_id).await {
        Ok(loan) => (
            StatusCode::CREATED,
            axum::Json(json!({
                "loan_id": loan.id,
                "status": loan.status,
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler(
    State(orchestrator): State<Arc<LoanStageOrchestrator>>,
    Path(loan_id): Path<u64>,
) -> Response {
    match orchestrator.status(LoanId(loan_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn message_handler(
    State(orchestrator): State<Arc<LoanStageOrchestrator>>,
    Path(loan_id): Path<u64>,
    axum::Json(request): axum::Json<MessageRequest>,
) -> Response {
    match orchestrator.handle(LoanId(loan_id), &request.message).await {
        // A missing loan is still a conversational reply.
        Ok(reply) => (StatusCode::OK, axum::Json(reply)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn document_handler(
    State(orchestrator): State<Arc<LoanStageOrchestrator>>,
    Path(loan_id): Path<u64>,
    axum::Json(request): axum::Json<DocumentUploadRequest>,
) -> Response {
    if request.storage_reference.trim().is_empty() {
        let payload = json!({ "error": "storage_reference must not be empty" });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    }

    match orchestrator
        .register_document(
            LoanId(loan_id),
            request.document_type,
            request.storage_reference,
        )
        .await
    {
        Ok(document) => (StatusCode::CREATED, axum::Json(document)).into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: OrchestratorError) -> Response {
    let status = match &error {
        OrchestratorError::LoanNotFound(_) | OrchestratorError::ApplicantNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        OrchestratorError::UploadsClosed { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
