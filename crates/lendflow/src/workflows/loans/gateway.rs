//! Boundaries to external services: object storage and text recognition.
//!
//! Both are treated as untrusted and possibly failing. Callers wrap every call in a timeout
//! and downgrade failures to "nothing recognized" rather than surfacing them.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Failure talking to an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("object '{0}' not found")]
    MissingObject(String),
    #[error("external service unavailable: {0}")]
    Unavailable(String),
    #[error("external service returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("external call timed out after {0:?}")]
    Timeout(Duration),
}

/// Blob storage holding uploaded documents and generated artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, GatewayError>;
    /// Stores `bytes` under `key` and returns the reference to hand back to callers.
    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<String, GatewayError>;
}

/// OCR service turning document bytes into raw text. May legitimately return empty text.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn recognize(&self, bytes: &[u8]) -> Result<String, GatewayError>;
}

/// Fetches a document and runs it through recognition within `budget`.
///
/// Every failure (missing object, service error, timeout) collapses to empty text.
pub async fn recognize_document(
    storage: &dyn ObjectStorage,
    recognizer: &dyn RecognitionService,
    reference: &str,
    budget: Duration,
) -> String {
    let attempt = async {
        let bytes = storage.fetch(reference).await?;
        recognizer.recognize(&bytes).await
    };

    match tokio::time::timeout(budget, attempt).await {
        Ok(Ok(text)) => text,
        Ok(Err(error)) => {
            warn!(reference, %error, "document recognition failed");
            String::new()
        }
        Err(_) => {
            warn!(reference, timeout = ?budget, "document recognition timed out");
            String::new()
        }
    }
}
