use async_trait::async_trait;
use chrono::NaiveDate;
use lendflow::config::{AppConfig, LendingConfig};
use lendflow::error::AppError;
use lendflow::workflows::loans::{
    AgentReply, Applicant, CsvRegistry, GatewayError, InMemoryLoanStore, InMemoryObjectStorage,
    LoanStageOrchestrator, LoanStores, ObjectStorage, OrchestratorDeps, RecognitionService,
    RegistryLookup, StageAgent, StageAgents, StageContext, StoredSanctionLetterGenerator, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agents::{RuleDocumentationAgent, RuleSalesAgent};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Documents kept as files under `root`. References are `file://` paths.
pub(crate) struct FileObjectStorage {
    root: PathBuf,
}

impl FileObjectStorage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, GatewayError> {
        let raw = reference.strip_prefix("file://").unwrap_or(reference);
        let path = Path::new(raw);
        if path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(GatewayError::MissingObject(reference.to_string()));
        }

        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }
}

#[async_trait]
impl ObjectStorage for FileObjectStorage {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, GatewayError> {
        let path = self.resolve(reference)?;
        tokio::fs::read(&path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => GatewayError::MissingObject(reference.to_string()),
            _ => GatewayError::Unavailable(format!("{}: {err}", path.display())),
        })
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<String, GatewayError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }
}

/// Treats document bytes as text that was already recognized upstream.
pub(crate) struct PlainTextRecognizer;

#[async_trait]
impl RecognitionService for PlainTextRecognizer {
    async fn recognize(&self, bytes: &[u8]) -> Result<String, GatewayError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    text: String,
}

/// OCR service reached over HTTP: raw bytes in, `{ "text": ... }` out.
pub(crate) struct HttpRecognitionService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRecognitionService {
    pub(crate) fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl RecognitionService for HttpRecognitionService {
    async fn recognize(&self, bytes: &[u8]) -> Result<String, GatewayError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "recognition service returned {}",
                response.status()
            )));
        }

        let payload: RecognitionResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        Ok(payload.text)
    }
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    reply: String,
}

/// Stage agent hosted behind an HTTP endpoint. A single attempt per message; the orchestrator
/// owns the timeout.
pub(crate) struct HttpStageAgent {
    client: reqwest::Client,
    url: String,
}

impl HttpStageAgent {
    pub(crate) fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl StageAgent for HttpStageAgent {
    async fn invoke(&self, context: &StageContext) -> Result<AgentReply, GatewayError> {
        let response = self
            .client
            .post(&self.url)
            .json(context)
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "agent returned {status}: {detail}"
            )));
        }

        let payload: AgentResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        Ok(AgentReply::from_raw(payload.reply))
    }
}

#[derive(Debug, Deserialize)]
struct ApplicantRow {
    id: u64,
    name: String,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pan_number: Option<String>,
}

/// Reads applicant seed rows (`id,name,date_of_birth,pan_number`).
pub(crate) fn read_applicants<R: Read>(reader: R) -> Result<Vec<Applicant>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    reader
        .deserialize::<ApplicantRow>()
        .map(|row| {
            row.map(|row| Applicant {
                id: UserId(row.id),
                name: row.name,
                date_of_birth: row.date_of_birth,
                pan_number: row.pan_number.filter(|pan| !pan.is_empty()),
                aadhaar_last4: None,
                aadhaar_verified: false,
            })
        })
        .collect()
}

fn load_applicants(path: Option<&Path>) -> Result<Vec<Applicant>, AppError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let file = std::fs::File::open(path)?;
    let applicants = read_applicants(file).map_err(std::io::Error::from)?;
    info!(count = applicants.len(), path = %path.display(), "applicant directory seeded");
    Ok(applicants)
}

/// Rule-based agents for any stage without a configured endpoint.
pub(crate) fn stage_agents(
    sales_url: Option<String>,
    documentation_url: Option<String>,
    underwriting_url: Option<String>,
) -> StageAgents {
    let sales: Arc<dyn StageAgent> = match sales_url {
        Some(url) => Arc::new(HttpStageAgent::new(url)),
        None => Arc::new(RuleSalesAgent),
    };
    let documentation: Arc<dyn StageAgent> = match documentation_url {
        Some(url) => Arc::new(HttpStageAgent::new(url)),
        None => Arc::new(RuleDocumentationAgent),
    };
    let underwriting = underwriting_url
        .map(|url| Arc::new(HttpStageAgent::new(url)) as Arc<dyn StageAgent>);

    StageAgents {
        sales,
        documentation,
        underwriting,
    }
}

/// Collaborators chosen for one process, before they are handed to the orchestrator.
pub(crate) struct Pipeline {
    pub(crate) store: Arc<InMemoryLoanStore>,
    pub(crate) storage: Arc<dyn ObjectStorage>,
    pub(crate) recognizer: Arc<dyn RecognitionService>,
    pub(crate) registry: Arc<dyn RegistryLookup>,
    pub(crate) agents: StageAgents,
}

impl Pipeline {
    /// Picks real adapters where an endpoint is configured and local ones otherwise.
    pub(crate) fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let endpoints = config.endpoints.clone();
        let applicants = load_applicants(endpoints.applicants_csv_path.as_deref())?;
        let registry = CsvRegistry::from_path(&config.lending.registry_csv_path)?;

        let storage: Arc<dyn ObjectStorage> = match endpoints.storage_root {
            Some(root) => Arc::new(FileObjectStorage::new(root)),
            None => Arc::new(InMemoryObjectStorage::default()),
        };
        let recognizer: Arc<dyn RecognitionService> = match endpoints.ocr_endpoint {
            Some(endpoint) => Arc::new(HttpRecognitionService::new(endpoint, endpoints.ocr_api_key)),
            None => Arc::new(PlainTextRecognizer),
        };
        debug!(
            remote_sales = endpoints.sales_agent_url.is_some(),
            remote_documentation = endpoints.documentation_agent_url.is_some(),
            remote_underwriting = endpoints.underwriting_agent_url.is_some(),
            "stage agents selected"
        );

        Ok(Self {
            store: Arc::new(InMemoryLoanStore::with_applicants(applicants)),
            storage,
            recognizer,
            registry: Arc::new(registry),
            agents: stage_agents(
                endpoints.sales_agent_url,
                endpoints.documentation_agent_url,
                endpoints.underwriting_agent_url,
            ),
        })
    }

    pub(crate) fn into_orchestrator(self, lending: &LendingConfig) -> LoanStageOrchestrator {
        let stores = LoanStores::shared(self.store);
        let sanction = Arc::new(StoredSanctionLetterGenerator::new(
            stores.clone(),
            self.storage.clone(),
        ));

        LoanStageOrchestrator::new(
            OrchestratorDeps {
                stores,
                storage: self.storage,
                recognizer: self.recognizer,
                registry: self.registry,
                agents: self.agents,
                sanction,
            },
            lending,
        )
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.filter(|value| !value.trim().is_empty())
        .map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}
