use async_trait::async_trait;
use serde::Serialize;

use crate::workflows::loans::domain::{DocumentType, LoanId, LoanStatus};
use crate::workflows::loans::gateway::GatewayError;

pub const READY_FOR_VERIFICATION: &str = "READY_FOR_VERIFICATION";
pub const CHECK_UPLOAD_STATUS: &str = "CHECK_UPLOAD_STATUS";
pub const READY_FOR_UNDERWRITING: &str = "READY_FOR_UNDERWRITING";
pub const READY_FOR_SANCTION_LETTER: &str = "READY_FOR_SANCTION_LETTER";

/// Control signals a stage agent can raise instead of replying to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageSignal {
    ReadyForVerification,
    UploadsComplete,
    ReadyForSanctionLetter,
}

/// What a stage agent produced: a customer-facing reply or a control signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Text(String),
    Signal(StageSignal),
}

impl AgentReply {
    /// Classifies raw agent output. Only an exact sentinel (ignoring surrounding whitespace
    /// and quotes) is a signal; anything else is passed through verbatim.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let token = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();

        let signal = match token {
            READY_FOR_VERIFICATION => Some(StageSignal::ReadyForVerification),
            CHECK_UPLOAD_STATUS | READY_FOR_UNDERWRITING => Some(StageSignal::UploadsComplete),
            READY_FOR_SANCTION_LETTER => Some(StageSignal::ReadyForSanctionLetter),
            _ => None,
        };

        match signal {
            Some(signal) => AgentReply::Signal(signal),
            None => AgentReply::Text(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sales,
    Documentation,
    Underwriting,
}

/// Loan state shared with the agents so they can ask only for what is missing.
#[derive(Debug, Clone, Serialize)]
pub struct LoanSnapshot {
    pub status: LoanStatus,
    pub amount: Option<f64>,
    pub tenure_months: Option<u32>,
    pub monthly_income: Option<f64>,
    pub applicant_name: Option<String>,
    pub pan_on_file: bool,
    pub aadhaar_last4: Option<String>,
    pub missing_documents: Vec<DocumentType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageContext {
    pub stage: Stage,
    pub loan_id: LoanId,
    pub message: String,
    pub loan: LoanSnapshot,
}

/// Conversational agent for one stage. Implementations map their raw text through
/// [`AgentReply::from_raw`].
#[async_trait]
pub trait StageAgent: Send + Sync {
    async fn invoke(&self, context: &StageContext) -> Result<AgentReply, GatewayError>;
}
