use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::loans::UnderwritingConfig;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the loan desk.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lending: LendingConfig,
    pub endpoints: ServiceEndpoints,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
                ansi: environment == AppEnvironment::Development,
            },
            lending: LendingConfig::from_env()?,
            endpoints: ServiceEndpoints::from_env(),
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output shape of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub ansi: bool,
}

/// Business dials and external-call budgets for the loan pipeline.
#[derive(Debug, Clone)]
pub struct LendingConfig {
    pub underwriting: UnderwritingConfig,
    pub registry_csv_path: PathBuf,
    pub recognition_timeout: Duration,
    pub agent_timeout: Duration,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            underwriting: UnderwritingConfig::default(),
            registry_csv_path: PathBuf::from("data/identity_registry.csv"),
            recognition_timeout: Duration::from_millis(15_000),
            agent_timeout: Duration::from_millis(20_000),
        }
    }
}

impl LendingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let base = defaults.underwriting.clone();

        let underwriting = UnderwritingConfig {
            annual_interest_rate: parse_var(
                "LOAN_ANNUAL_INTEREST_RATE",
                base.annual_interest_rate,
            )?,
            min_monthly_income: parse_var(
                "UNDERWRITING_MIN_MONTHLY_INCOME",
                base.min_monthly_income,
            )?,
            max_foir: parse_var("UNDERWRITING_MAX_FOIR", base.max_foir)?,
            pan_verified_without_kyc: parse_var(
                "UNDERWRITING_PAN_VERIFIED_WITHOUT_KYC",
                base.pan_verified_without_kyc,
            )?,
        };

        let registry_csv_path = env::var("REGISTRY_CSV_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.registry_csv_path);

        let recognition_timeout = Duration::from_millis(parse_var(
            "OCR_TIMEOUT_MS",
            defaults.recognition_timeout.as_millis() as u64,
        )?);
        let agent_timeout = Duration::from_millis(parse_var(
            "AGENT_TIMEOUT_MS",
            defaults.agent_timeout.as_millis() as u64,
        )?);

        Ok(Self {
            underwriting,
            registry_csv_path,
            recognition_timeout,
            agent_timeout,
        })
    }
}

/// Locations of the external collaborators. Unset entries fall back to local adapters.
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpoints {
    pub applicants_csv_path: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub ocr_endpoint: Option<String>,
    pub ocr_api_key: Option<String>,
    pub sales_agent_url: Option<String>,
    pub documentation_agent_url: Option<String>,
    pub underwriting_agent_url: Option<String>,
}

impl ServiceEndpoints {
    fn from_env() -> Self {
        Self {
            applicants_csv_path: optional_var("APPLICANTS_CSV_PATH").map(PathBuf::from),
            storage_root: optional_var("STORAGE_ROOT").map(PathBuf::from),
            ocr_endpoint: optional_var("OCR_ENDPOINT"),
            ocr_api_key: optional_var("OCR_API_KEY"),
            sales_agent_url: optional_var("SALES_AGENT_URL"),
            documentation_agent_url: optional_var("DOCUMENTATION_AGENT_URL"),
            underwriting_agent_url: optional_var("UNDERWRITING_AGENT_URL"),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an invalid value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
