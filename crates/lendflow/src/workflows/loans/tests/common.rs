use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::LendingConfig;
use crate::workflows::loans::{
    AgentReply, Applicant, CsvRegistry, DocumentType, GatewayError, IdentityKind,
    InMemoryLoanStore, InMemoryObjectStorage, LoanFieldUpdate, LoanId, LoanRepository,
    LoanStageOrchestrator, LoanStatus, LoanStores, OrchestratorDeps, RecognitionService,
    RegistryLookup, StageAgent, StageAgents, StageContext, StoredSanctionLetterGenerator, UserId,
    VerificationPipeline,
};

pub(super) const PAN_NUMBER: &str = "ABCDE1234F";
pub(super) const AADHAAR_NUMBER: &str = "123456789012";

pub(super) fn birth_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 2, 14).expect("valid date")
}

pub(super) fn applicant(id: u64) -> Applicant {
    Applicant {
        id: UserId(id),
        name: "Asha Verma".to_string(),
        date_of_birth: Some(birth_date()),
        pan_number: Some(PAN_NUMBER.to_string()),
        aadhaar_last4: None,
        aadhaar_verified: false,
    }
}

pub(super) fn pan_text() -> String {
    format!(
        "INCOME TAX DEPARTMENT\nName: Asha Verma\nFather's Name: Ravi Verma\n\
         Date of Birth: 14/02/1990\nPermanent Account Number: {PAN_NUMBER}\n"
    )
}

pub(super) fn aadhaar_text() -> String {
    "Government of India\nName: ASHA VERMA\nDOB: 14/02/1990\n1234 5678 9012\n".to_string()
}

pub(super) fn salary_slip_text() -> String {
    "Payslip for March\nBasic: 40,000.00\nNet Pay: Rs. 52,500.00\n".to_string()
}

pub(super) fn bank_statement_text() -> String {
    "01/03 SALARY CREDIT 52,500.00\n05/03 HDFC PERSONAL LOAN EMI 4,250.00\n\
     10/03 GROCERIES 2,100.00\n"
        .to_string()
}

pub(super) fn registry() -> CsvRegistry {
    let csv = format!("pan,aadhaar\n{PAN_NUMBER},{AADHAAR_NUMBER}\nPQRSX6789Z,\n");
    CsvRegistry::from_reader(Cursor::new(csv)).expect("registry loads")
}

/// Counts lookups so tests can assert the registry was never consulted.
pub(super) struct CountingRegistry {
    inner: CsvRegistry,
    calls: AtomicUsize,
}

impl CountingRegistry {
    pub(super) fn new() -> Self {
        Self {
            inner: registry(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegistryLookup for CountingRegistry {
    fn contains(&self, kind: IdentityKind, number: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(kind, number)
    }
}

/// Treats stored bytes as already-recognized UTF-8 text.
pub(super) struct EchoRecognizer;

#[async_trait]
impl RecognitionService for EchoRecognizer {
    async fn recognize(&self, bytes: &[u8]) -> Result<String, GatewayError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

pub(super) struct FailingRecognizer;

#[async_trait]
impl RecognitionService for FailingRecognizer {
    async fn recognize(&self, _bytes: &[u8]) -> Result<String, GatewayError> {
        Err(GatewayError::Unavailable("ocr offline".to_string()))
    }
}

pub(super) struct StalledRecognizer;

#[async_trait]
impl RecognitionService for StalledRecognizer {
    async fn recognize(&self, _bytes: &[u8]) -> Result<String, GatewayError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(pan_text())
    }
}

/// Replays raw agent outputs in order, repeating the last one once the script runs out.
pub(super) struct ScriptedAgent {
    script: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    pub(super) seen: Mutex<Vec<StageContext>>,
}

impl ScriptedAgent {
    pub(super) fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            script: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(String::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn always(reply: &str) -> Arc<Self> {
        Self::new([reply])
    }
}

#[async_trait]
impl StageAgent for ScriptedAgent {
    async fn invoke(&self, context: &StageContext) -> Result<AgentReply, GatewayError> {
        self.seen
            .lock()
            .expect("agent mutex poisoned")
            .push(context.clone());
        let mut last = self.last.lock().expect("agent mutex poisoned");
        if let Some(next) = self.script.lock().expect("agent mutex poisoned").pop_front() {
            *last = next;
        }
        Ok(AgentReply::from_raw(last.clone()))
    }
}

pub(super) struct FailingAgent;

#[async_trait]
impl StageAgent for FailingAgent {
    async fn invoke(&self, _context: &StageContext) -> Result<AgentReply, GatewayError> {
        Err(GatewayError::Unavailable("model endpoint down".to_string()))
    }
}

pub(super) struct StalledAgent;

#[async_trait]
impl StageAgent for StalledAgent {
    async fn invoke(&self, _context: &StageContext) -> Result<AgentReply, GatewayError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(AgentReply::from_raw("too late"))
    }
}

pub(super) fn lending_config() -> LendingConfig {
    LendingConfig {
        recognition_timeout: Duration::from_millis(200),
        agent_timeout: Duration::from_millis(200),
        ..LendingConfig::default()
    }
}

pub(super) fn default_agents() -> StageAgents {
    StageAgents {
        sales: ScriptedAgent::always("READY_FOR_VERIFICATION"),
        documentation: ScriptedAgent::always("CHECK_UPLOAD_STATUS"),
        underwriting: None,
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryLoanStore>,
    pub(super) storage: Arc<InMemoryObjectStorage>,
    pub(super) registry: Arc<CountingRegistry>,
    pub(super) orchestrator: Arc<LoanStageOrchestrator>,
}

impl Harness {
    pub(super) fn new(agents: StageAgents) -> Self {
        Self::with_recognizer(agents, Arc::new(EchoRecognizer))
    }

    pub(super) fn with_recognizer(
        agents: StageAgents,
        recognizer: Arc<dyn RecognitionService>,
    ) -> Self {
        let store = Arc::new(InMemoryLoanStore::with_applicants([applicant(1)]));
        let storage = Arc::new(InMemoryObjectStorage::default());
        let registry = Arc::new(CountingRegistry::new());
        let stores = LoanStores::shared(store.clone());

        let orchestrator = LoanStageOrchestrator::new(
            OrchestratorDeps {
                stores: stores.clone(),
                storage: storage.clone(),
                recognizer,
                registry: registry.clone(),
                agents,
                sanction: Arc::new(StoredSanctionLetterGenerator::new(stores, storage.clone())),
            },
            &lending_config(),
        );

        Self {
            store,
            storage,
            registry,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub(super) fn stores(&self) -> LoanStores {
        LoanStores::shared(self.store.clone())
    }

    pub(super) fn pipeline(&self, recognizer: Arc<dyn RecognitionService>) -> VerificationPipeline {
        VerificationPipeline::new(
            self.stores(),
            self.storage.clone(),
            recognizer,
            self.registry.clone(),
            Duration::from_millis(200),
        )
    }

    /// Uploads `text` as the document body and registers it on the loan.
    pub(super) async fn upload(&self, loan_id: LoanId, document_type: DocumentType, text: &str) {
        let reference = format!("memory://loan-{loan_id}/{document_type}");
        self.storage.put(reference.clone(), text.as_bytes().to_vec());
        self.orchestrator
            .register_document(loan_id, document_type, reference)
            .await
            .expect("document registers");
    }

    pub(super) async fn upload_all(&self, loan_id: LoanId) {
        self.upload(loan_id, DocumentType::Pan, &pan_text()).await;
        self.upload(loan_id, DocumentType::Aadhaar, &aadhaar_text())
            .await;
        self.upload(loan_id, DocumentType::SalarySlip, &salary_slip_text())
            .await;
        self.upload(loan_id, DocumentType::BankStatement, &bank_statement_text())
            .await;
    }

    /// A loan for applicant 1 with agreed terms, parked at `status`.
    pub(super) async fn loan_at(&self, status: LoanStatus) -> LoanId {
        let loan = self
            .orchestrator
            .start_loan(UserId(1))
            .await
            .expect("loan starts");
        self.orchestrator
            .stores()
            .loans
            .update_fields(
                loan.id,
                &LoanFieldUpdate {
                    amount: Some(200_000.0),
                    tenure_months: Some(24),
                    monthly_income: Some(52_500.0),
                },
            )
            .expect("terms stored");
        if status != LoanStatus::Initiated {
            LoanRepository::update_status(self.store.as_ref(), loan.id, status)
                .expect("status stored");
        }
        loan.id
    }

    pub(super) fn status_of(&self, loan_id: LoanId) -> LoanStatus {
        LoanRepository::get(self.store.as_ref(), loan_id)
            .expect("loan readable")
            .expect("loan exists")
            .status
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
