//! Per-loan state machine routing each inbound message to exactly one stage handler.
//!
//! The persisted loan status picks the handler. A handler may write at most one status
//! transition, always forward, and every mutating entry point runs under the loan's lock.

mod intake;
mod locks;
mod signal;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::LendingConfig;

pub use intake::parse_terms;
pub use locks::LoanLocks;
pub use signal::{
    AgentReply, LoanSnapshot, Stage, StageAgent, StageContext, StageSignal, CHECK_UPLOAD_STATUS,
    READY_FOR_SANCTION_LETTER, READY_FOR_UNDERWRITING, READY_FOR_VERIFICATION,
};

use super::domain::{
    Document, DocumentStatus, DocumentType, LoanApplication, LoanId, LoanStatus, UserId,
    VerificationResult, VerificationStatus,
};
use super::gateway::{ObjectStorage, RecognitionService};
use super::registry::RegistryLookup;
use super::repository::{DocumentStatusView, LoanStatusView, LoanStores, RepositoryError};
use super::sanction::SanctionLetterGenerator;
use super::underwriting::{UnderwritingError, UnderwritingService};
use super::verification::{VerificationError, VerificationPipeline};

pub const UPLOAD_PROMPT: &str = "Great, your details are complete. Please upload your PAN card, \
     Aadhaar card and latest salary slip (a bank statement is optional) to continue.";
pub const DOCUMENTS_VERIFIED: &str =
    "Your documents have been verified. We are now assessing your loan eligibility.";
pub const REJECTED_TERMINAL: &str =
    "Your loan application was not approved. This application is closed; please start a new \
     application if your circumstances change.";
pub const AGENT_UNAVAILABLE: &str =
    "Our assistant is temporarily unavailable. Please try again in a moment.";
pub const SANCTION_UNAVAILABLE: &str =
    "We could not generate your sanction letter right now. Please try again shortly.";
pub const INCOMPLETE_TERMS: &str =
    "Your loan details are incomplete. Please share the loan amount and tenure.";

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),
    #[error("applicant {0} not found")]
    ApplicantNotFound(UserId),
    #[error("loan {loan_id} no longer accepts uploads in status {status}")]
    UploadsClosed { loan_id: LoanId, status: LoanStatus },
    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition { from: LoanStatus, to: LoanStatus },
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Underwriting(#[from] UnderwritingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Reply returned upstream for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReply {
    pub loan_id: LoanId,
    /// Status after the message was handled; `None` when the loan does not exist.
    pub status: Option<LoanStatus>,
    pub message: String,
}

impl StageReply {
    fn new(loan_id: LoanId, status: LoanStatus, message: impl Into<String>) -> Self {
        Self {
            loan_id,
            status: Some(status),
            message: message.into(),
        }
    }

    fn not_found(loan_id: LoanId) -> Self {
        Self {
            loan_id,
            status: None,
            message: format!("We could not find loan application #{loan_id}."),
        }
    }
}

/// Conversational agents, one per stage. Without an underwriting agent the sanction letter is
/// generated on the first message after approval.
#[derive(Clone)]
pub struct StageAgents {
    pub sales: Arc<dyn StageAgent>,
    pub documentation: Arc<dyn StageAgent>,
    pub underwriting: Option<Arc<dyn StageAgent>>,
}

/// Collaborators the orchestrator is assembled from.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub stores: LoanStores,
    pub storage: Arc<dyn ObjectStorage>,
    pub recognizer: Arc<dyn RecognitionService>,
    pub registry: Arc<dyn RegistryLookup>,
    pub agents: StageAgents,
    pub sanction: Arc<dyn SanctionLetterGenerator>,
}

pub struct LoanStageOrchestrator {
    stores: LoanStores,
    agents: StageAgents,
    pipeline: VerificationPipeline,
    underwriting: UnderwritingService,
    sanction: Arc<dyn SanctionLetterGenerator>,
    locks: LoanLocks,
    agent_timeout: Duration,
}

impl LoanStageOrchestrator {
    pub fn new(deps: OrchestratorDeps, lending: &LendingConfig) -> Self {
        let pipeline = VerificationPipeline::new(
            deps.stores.clone(),
            deps.storage,
            deps.recognizer,
            deps.registry,
            lending.recognition_timeout,
        );
        let underwriting =
            UnderwritingService::new(deps.stores.clone(), lending.underwriting.clone());

        Self {
            stores: deps.stores,
            agents: deps.agents,
            pipeline,
            underwriting,
            sanction: deps.sanction,
            locks: LoanLocks::default(),
            agent_timeout: lending.agent_timeout,
        }
    }

    pub fn stores(&self) -> &LoanStores {
        &self.stores
    }

    pub fn underwriting(&self) -> &UnderwritingService {
        &self.underwriting
    }

    /// Open a new application for an existing applicant.
    pub async fn start_loan(&self, user_id: UserId) -> Result<LoanApplication, OrchestratorError> {
        if self.stores.applicants.get(user_id)?.is_none() {
            return Err(OrchestratorError::ApplicantNotFound(user_id));
        }
        let loan = self.stores.loans.create(user_id)?;
        info!(loan_id = %loan.id, %user_id, "loan application started");
        Ok(loan)
    }

    /// Record an upload. A second upload of the same type replaces the first.
    pub async fn register_document(
        &self,
        loan_id: LoanId,
        document_type: DocumentType,
        storage_reference: String,
    ) -> Result<Document, OrchestratorError> {
        let _guard = self.locks.acquire(loan_id).await;
        let loan = self
            .stores
            .loans
            .get(loan_id)?
            .ok_or(OrchestratorError::LoanNotFound(loan_id))?;

        if !matches!(loan.status, LoanStatus::Initiated | LoanStatus::KycPending) {
            return Err(OrchestratorError::UploadsClosed {
                loan_id,
                status: loan.status,
            });
        }

        let document = self.stores.documents.create(Document {
            loan_id,
            user_id: loan.user_id,
            document_type,
            storage_reference,
            status: DocumentStatus::Uploaded,
        })?;
        info!(%loan_id, %document_type, "document registered");
        Ok(document)
    }

    pub fn status(&self, loan_id: LoanId) -> Result<LoanStatusView, OrchestratorError> {
        let loan = self
            .stores
            .loans
            .get(loan_id)?
            .ok_or(OrchestratorError::LoanNotFound(loan_id))?;

        let mut documents = Vec::new();
        for document_type in DocumentType::ALL {
            if let Some(document) = self
                .stores
                .documents
                .find_by_loan_and_type(loan_id, document_type)?
            {
                documents.push(DocumentStatusView {
                    document_type,
                    status: document.status,
                });
            }
        }
        let underwriting = self.stores.underwriting.get(loan_id)?;

        Ok(LoanStatusView::build(&loan, documents, underwriting.as_ref()))
    }

    /// Route one inbound message to the handler for the loan's current status.
    pub async fn handle(
        &self,
        loan_id: LoanId,
        message: &str,
    ) -> Result<StageReply, OrchestratorError> {
        let _guard = self.locks.acquire(loan_id).await;
        let Some(loan) = self.stores.loans.get(loan_id)? else {
            return Ok(StageReply::not_found(loan_id));
        };

        match loan.status {
            LoanStatus::Initiated => self.handle_sales(loan, message).await,
            LoanStatus::KycPending => self.handle_documentation(&loan, message).await,
            LoanStatus::Verified => self.handle_underwriting(&loan),
            LoanStatus::Approved => self.handle_sanction(&loan, message).await,
            LoanStatus::Rejected => Ok(StageReply::new(loan.id, loan.status, REJECTED_TERMINAL)),
            LoanStatus::Sanctioned => {
                let message = match &loan.sanction_reference {
                    Some(reference) => format!("Your sanction letter is ready: {reference}"),
                    None => "Your loan has been sanctioned.".to_string(),
                };
                Ok(StageReply::new(loan.id, loan.status, message))
            }
        }
    }

    async fn handle_sales(
        &self,
        mut loan: LoanApplication,
        message: &str,
    ) -> Result<StageReply, OrchestratorError> {
        let terms = parse_terms(message);
        if !terms.is_empty() {
            self.stores.loans.update_fields(loan.id, &terms)?;
            loan.amount = terms.amount.or(loan.amount);
            loan.tenure_months = terms.tenure_months.or(loan.tenure_months);
            loan.monthly_income = terms.monthly_income.or(loan.monthly_income);
        }

        let context = self.context(Stage::Sales, &loan, message)?;
        match self.invoke_agent(self.agents.sales.as_ref(), &context).await {
            Some(AgentReply::Signal(StageSignal::ReadyForVerification)) => {
                if let Some(prompt) = missing_terms_prompt(&loan) {
                    info!(loan_id = %loan.id, "sales signal ignored until terms are captured");
                    return Ok(StageReply::new(loan.id, loan.status, prompt));
                }
                self.transition(&loan, LoanStatus::KycPending)?;
                Ok(StageReply::new(loan.id, LoanStatus::KycPending, UPLOAD_PROMPT))
            }
            Some(reply) => Ok(self.pass_through(&loan, Stage::Sales, reply)),
            None => Ok(StageReply::new(loan.id, loan.status, AGENT_UNAVAILABLE)),
        }
    }

    async fn handle_documentation(
        &self,
        loan: &LoanApplication,
        message: &str,
    ) -> Result<StageReply, OrchestratorError> {
        let context = self.context(Stage::Documentation, loan, message)?;
        match self
            .invoke_agent(self.agents.documentation.as_ref(), &context)
            .await
        {
            Some(AgentReply::Signal(StageSignal::UploadsComplete)) => {
                self.verify_uploads(loan).await
            }
            Some(reply) => Ok(self.pass_through(loan, Stage::Documentation, reply)),
            None => Ok(StageReply::new(loan.id, loan.status, AGENT_UNAVAILABLE)),
        }
    }

    async fn verify_uploads(&self, loan: &LoanApplication) -> Result<StageReply, OrchestratorError> {
        let missing = self.missing_documents(loan.id)?;
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(|kind| kind.display_name()).collect();
            return Ok(StageReply::new(
                loan.id,
                loan.status,
                format!(
                    "Some documents are still missing: {}. Please upload them to continue.",
                    names.join(", ")
                ),
            ));
        }

        let mut outcomes: Vec<(DocumentType, VerificationResult)> = Vec::new();
        for document_type in DocumentType::ALL {
            if self
                .stores
                .documents
                .find_by_loan_and_type(loan.id, document_type)?
                .is_none()
            {
                continue;
            }
            match self.pipeline.verify(loan.id, document_type).await {
                Ok(result) => outcomes.push((document_type, result)),
                Err(VerificationError::ApplicantNotFound(user_id)) => {
                    warn!(loan_id = %loan.id, %user_id, "applicant missing during verification");
                    return Ok(StageReply::new(
                        loan.id,
                        loan.status,
                        "We could not find your applicant profile. Please contact support.",
                    ));
                }
                Err(error) => return Err(error.into()),
            }
        }

        let verified = |wanted: DocumentType| {
            outcomes.iter().any(|(document_type, result)| {
                *document_type == wanted && result.status == VerificationStatus::Verified
            })
        };

        if verified(DocumentType::Pan) && verified(DocumentType::Aadhaar) {
            self.transition(loan, LoanStatus::Verified)?;
            return Ok(StageReply::new(loan.id, LoanStatus::Verified, DOCUMENTS_VERIFIED));
        }

        let problems: Vec<String> = outcomes
            .iter()
            .filter(|(_, result)| result.status != VerificationStatus::Verified)
            .map(|(document_type, result)| match &result.findings.reason {
                Some(reason) => {
                    format!("{} ({}: {reason})", document_type.display_name(), result.status)
                }
                None => format!("{} ({})", document_type.display_name(), result.status),
            })
            .collect();
        Ok(StageReply::new(
            loan.id,
            loan.status,
            format!(
                "We could not verify some of your documents: {}. Please re-upload clear copies.",
                problems.join("; ")
            ),
        ))
    }

    fn handle_underwriting(&self, loan: &LoanApplication) -> Result<StageReply, OrchestratorError> {
        let decision = match self.underwriting.process(loan.id) {
            Ok(decision) => decision,
            Err(UnderwritingError::IncompleteLoan(_)) => {
                return Ok(StageReply::new(loan.id, loan.status, INCOMPLETE_TERMS));
            }
            Err(error) => return Err(error.into()),
        };

        if decision.approved() {
            self.transition(loan, LoanStatus::Approved)?;
            Ok(StageReply::new(
                loan.id,
                LoanStatus::Approved,
                format!(
                    "Congratulations! Your loan is approved. Your FOIR is {:.2}%. \
                     Reply to receive your sanction letter.",
                    decision.foir * 100.0
                ),
            ))
        } else {
            self.transition(loan, LoanStatus::Rejected)?;
            let reason = decision
                .rejection_reason()
                .unwrap_or_else(|| "not approved".to_string());
            Ok(StageReply::new(
                loan.id,
                LoanStatus::Rejected,
                format!("We are unable to approve your loan: {reason}."),
            ))
        }
    }

    async fn handle_sanction(
        &self,
        loan: &LoanApplication,
        message: &str,
    ) -> Result<StageReply, OrchestratorError> {
        if let Some(agent) = &self.agents.underwriting {
            let context = self.context(Stage::Underwriting, loan, message)?;
            match self.invoke_agent(agent.as_ref(), &context).await {
                Some(AgentReply::Signal(StageSignal::ReadyForSanctionLetter)) => {}
                Some(reply) => return Ok(self.pass_through(loan, Stage::Underwriting, reply)),
                None => return Ok(StageReply::new(loan.id, loan.status, AGENT_UNAVAILABLE)),
            }
        }

        let reference = match tokio::time::timeout(
            self.agent_timeout,
            self.sanction.generate(loan.id),
        )
        .await
        {
            Ok(Ok(reference)) => reference,
            Ok(Err(error)) => {
                warn!(loan_id = %loan.id, %error, "sanction letter generation failed");
                return Ok(StageReply::new(loan.id, loan.status, SANCTION_UNAVAILABLE));
            }
            Err(_) => {
                warn!(
                    loan_id = %loan.id,
                    timeout = ?self.agent_timeout,
                    "sanction letter generation timed out"
                );
                return Ok(StageReply::new(loan.id, loan.status, SANCTION_UNAVAILABLE));
            }
        };

        self.stores.loans.set_sanction_reference(loan.id, &reference)?;
        self.transition(loan, LoanStatus::Sanctioned)?;
        Ok(StageReply::new(
            loan.id,
            LoanStatus::Sanctioned,
            format!("Sanction letter generated successfully: {reference}"),
        ))
    }

    fn transition(&self, loan: &LoanApplication, next: LoanStatus) -> Result<(), OrchestratorError> {
        if !loan.status.can_advance_to(next) {
            return Err(OrchestratorError::IllegalTransition {
                from: loan.status,
                to: next,
            });
        }
        self.stores.loans.update_status(loan.id, next)?;
        info!(loan_id = %loan.id, from = %loan.status, to = %next, "loan status advanced");
        Ok(())
    }

    /// Bounded agent call. `None` means the agent failed or timed out.
    async fn invoke_agent(
        &self,
        agent: &dyn StageAgent,
        context: &StageContext,
    ) -> Option<AgentReply> {
        match tokio::time::timeout(self.agent_timeout, agent.invoke(context)).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(error)) => {
                warn!(
                    loan_id = %context.loan_id,
                    stage = ?context.stage,
                    %error,
                    "stage agent failed"
                );
                None
            }
            Err(_) => {
                warn!(
                    loan_id = %context.loan_id,
                    stage = ?context.stage,
                    timeout = ?self.agent_timeout,
                    "stage agent timed out"
                );
                None
            }
        }
    }

    fn pass_through(&self, loan: &LoanApplication, stage: Stage, reply: AgentReply) -> StageReply {
        match reply {
            AgentReply::Text(text) => StageReply::new(loan.id, loan.status, text),
            AgentReply::Signal(signal) => {
                warn!(loan_id = %loan.id, ?stage, ?signal, "signal ignored outside its stage");
                StageReply::new(loan.id, loan.status, AGENT_UNAVAILABLE)
            }
        }
    }

    fn missing_documents(&self, loan_id: LoanId) -> Result<Vec<DocumentType>, RepositoryError> {
        let mut missing = Vec::new();
        for document_type in DocumentType::REQUIRED_FOR_VERIFICATION {
            if self
                .stores
                .documents
                .find_by_loan_and_type(loan_id, document_type)?
                .is_none()
            {
                missing.push(document_type);
            }
        }
        Ok(missing)
    }

    fn context(
        &self,
        stage: Stage,
        loan: &LoanApplication,
        message: &str,
    ) -> Result<StageContext, OrchestratorError> {
        let applicant = self.stores.applicants.get(loan.user_id)?;
        let missing_documents = match loan.status {
            LoanStatus::Initiated | LoanStatus::KycPending => self.missing_documents(loan.id)?,
            _ => Vec::new(),
        };

        Ok(StageContext {
            stage,
            loan_id: loan.id,
            message: message.to_string(),
            loan: LoanSnapshot {
                status: loan.status,
                amount: loan.amount,
                tenure_months: loan.tenure_months,
                monthly_income: loan.monthly_income,
                applicant_name: applicant.as_ref().map(|applicant| applicant.name.clone()),
                pan_on_file: applicant
                    .as_ref()
                    .is_some_and(|applicant| applicant.pan_number.is_some()),
                aadhaar_last4: applicant.and_then(|applicant| applicant.aadhaar_last4),
                missing_documents,
            },
        })
    }
}

/// Underwriting needs amount and tenure, so document collection waits for both.
fn missing_terms_prompt(loan: &LoanApplication) -> Option<String> {
    let missing: Vec<&str> = [
        loan.amount.is_none().then_some("loan amount"),
        loan.tenure_months.is_none().then_some("tenure"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if missing.is_empty() {
        return None;
    }
    Some(format!(
        "Before we collect your documents, please share your {}.",
        missing.join(" and ")
    ))
}
