use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::pricing::PriceTable;
use crate::scheduler;
use crate::store::MAX_AMOUNT_CENTS;

/// Longest idle timeout accepted for sessions: one year.
pub const MAX_IDLE_TIMEOUT_HOURS: i64 = 24 * 365;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Invalid cron expression for a scheduled job.
    InvalidCron { job: &'static str, expr: String, reason: String },
    /// Unknown IANA time zone name.
    InvalidTimezone(String),
    /// Unparseable bind address.
    InvalidAddress { addr: String, source: std::net::AddrParseError },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidCron { job, expr, reason } => {
                write!(f, "invalid cron expression for {job} '{expr}': {reason}")
            }
            Self::InvalidTimezone(name) => write!(f, "unknown time zone '{name}'"),
            Self::InvalidAddress { addr, source } => {
                write!(f, "invalid bind address '{addr}': {source}")
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidAddress { source, .. } => Some(source),
            Self::InvalidCron { .. } | Self::InvalidTimezone(_) | Self::Validation(_) => None,
        }
    }
}

/// Public-facing studio details used in bot replies and reminders.
#[derive(Debug, Clone, Deserialize)]
pub struct StudioInfo {
    #[serde(default = "default_studio_name")]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub hours: String,
    #[serde(default)]
    pub portfolio_url: String,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Default for StudioInfo {
    fn default() -> Self {
        Self {
            name: default_studio_name(),
            address: String::new(),
            hours: String::new(),
            portfolio_url: String::new(),
            instagram: None,
            phone: None,
        }
    }
}

fn default_studio_name() -> String {
    "Estúdio".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    pub phone_number_id: String,
    #[serde(default)]
    pub access_token: String,
    /// Token echoed back during the webhook verification handshake.
    pub verify_token: String,
    /// App secret that signs webhook deliveries (`X-Hub-Signature-256`).
    #[serde(default)]
    pub app_secret: String,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
    /// Number that receives WARN/ERROR log alerts.
    #[serde(default)]
    pub alert_phone: Option<String>,
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3.2".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_timeout_hours")]
    pub idle_timeout_hours: i64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_validity_check_secs")]
    pub validity_check_interval_secs: u64,
    #[serde(default = "default_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_hours: default_idle_timeout_hours(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            validity_check_interval_secs: default_validity_check_secs(),
            sweep_interval_secs: default_sweep_secs(),
        }
    }
}

fn default_idle_timeout_hours() -> i64 {
    72
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_validity_check_secs() -> u64 {
    30
}

fn default_sweep_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_daily_reminder_cron")]
    pub daily_reminder_cron: String,
    #[serde(default = "default_weekly_promotion_cron")]
    pub weekly_promotion_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_reminder_cron: default_daily_reminder_cron(),
            weekly_promotion_cron: default_weekly_promotion_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

// cron crate uses 7-field format: sec min hour day month dow year
fn default_daily_reminder_cron() -> String {
    "0 0 9 * * * *".to_string()
}

fn default_weekly_promotion_cron() -> String {
    "0 0 10 * * Mon *".to_string()
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default = "default_bind_addr")]
    bind_addr: String,
    /// Directory for state files (database, logs). Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    studio: StudioInfo,
    whatsapp: Option<WhatsAppConfig>,
    #[serde(default)]
    llm: LlmConfig,
    email: Option<EmailConfig>,
    /// Bearer secret for the HTTP cron triggers.
    cron_secret: Option<String>,
    #[serde(default)]
    sessions: SessionConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    pricing: PriceTable,
    /// Log outgoing WhatsApp messages and emails instead of sending them.
    #[serde(default)]
    dry_run: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Directory for state files (database, logs).
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub studio: StudioInfo,
    /// WhatsApp Cloud API credentials. `None` disables outbound messages.
    pub whatsapp: Option<WhatsAppConfig>,
    pub llm: LlmConfig,
    /// Email transport. `None` logs notifications instead.
    pub email: Option<EmailConfig>,
    pub cron_secret: Option<String>,
    pub sessions: SessionConfig,
    pub scheduler: SchedulerConfig,
    pub pricing: PriceTable,
    pub dry_run: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;
        Self::from_file(file, |key| std::env::var(key).ok())
    }

    fn from_file(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = file
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidAddress { addr: file.bind_addr.clone(), source: e })?;

        let timezone = file
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(file.timezone.clone()))?;

        for (job, expr) in [
            ("daily_reminder_cron", &file.scheduler.daily_reminder_cron),
            ("weekly_promotion_cron", &file.scheduler.weekly_promotion_cron),
        ] {
            scheduler::validate_cron(expr).map_err(|reason| ConfigError::InvalidCron {
                job,
                expr: expr.clone(),
                reason,
            })?;
        }

        if !(1..=MAX_IDLE_TIMEOUT_HOURS).contains(&file.sessions.idle_timeout_hours) {
            return Err(ConfigError::Validation(format!(
                "sessions.idle_timeout_hours must be between 1 and {MAX_IDLE_TIMEOUT_HOURS}"
            )));
        }
        if file.sessions.heartbeat_interval_secs == 0
            || file.sessions.validity_check_interval_secs == 0
            || file.sessions.sweep_interval_secs == 0
        {
            return Err(ConfigError::Validation("session intervals must be non-zero".into()));
        }

        let prices = &file.pricing;
        for (field, cents) in [
            ("small_cents", prices.small_cents),
            ("medium_cents", prices.medium_cents),
            ("large_cents", prices.large_cents),
            ("realism_surcharge_cents", prices.realism_surcharge_cents),
            ("color_surcharge_cents", prices.color_surcharge_cents),
            ("hard_location_surcharge_cents", prices.hard_location_surcharge_cents),
        ] {
            if !(0..=MAX_AMOUNT_CENTS).contains(&cents) {
                return Err(ConfigError::Validation(format!(
                    "pricing.{field} must be between 0 and {MAX_AMOUNT_CENTS}"
                )));
            }
        }

        // Secrets may be kept out of the file and supplied by the environment
        let whatsapp = match file.whatsapp {
            Some(mut wa) => {
                if wa.access_token.is_empty() {
                    wa.access_token = env("INKDESK_WHATSAPP_TOKEN").unwrap_or_default();
                }
                if wa.phone_number_id.is_empty() || wa.access_token.is_empty() {
                    return Err(ConfigError::Validation(
                        "whatsapp.phone_number_id and whatsapp.access_token are required".into(),
                    ));
                }
                if wa.verify_token.is_empty() {
                    return Err(ConfigError::Validation("whatsapp.verify_token is required".into()));
                }
                if wa.app_secret.is_empty() {
                    wa.app_secret = env("INKDESK_WHATSAPP_APP_SECRET").unwrap_or_default();
                }
                if wa.app_secret.is_empty() {
                    return Err(ConfigError::Validation("whatsapp.app_secret is required".into()));
                }
                Some(wa)
            }
            None => None,
        };

        let email = match file.email {
            Some(mut email) => {
                if email.api_key.is_empty() {
                    email.api_key = env("INKDESK_EMAIL_API_KEY").unwrap_or_default();
                }
                if email.api_key.is_empty() {
                    return Err(ConfigError::Validation("email.api_key is required".into()));
                }
                if !email.from.contains('@') {
                    return Err(ConfigError::Validation("email.from must be an email address".into()));
                }
                Some(email)
            }
            None => None,
        };

        let cron_secret = file
            .cron_secret
            .or_else(|| env("INKDESK_CRON_SECRET"))
            .filter(|s| !s.is_empty());

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            bind_addr,
            data_dir,
            timezone,
            studio: file.studio,
            whatsapp,
            llm: file.llm,
            email,
            cron_secret,
            sessions: file.sessions,
            scheduler: file.scheduler,
            pricing: file.pricing,
            dry_run: file.dry_run,
        })
    }

    /// Configuration suitable for tests and local runs without a file.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: PathBuf::from("."),
            timezone: chrono_tz::America::Sao_Paulo,
            studio: StudioInfo {
                name: "Agulha de Ouro".to_string(),
                address: "Rua Augusta, 1000 - São Paulo".to_string(),
                hours: "terça a sábado, das 10h às 20h".to_string(),
                portfolio_url: "https://example.com/portfolio".to_string(),
                instagram: Some("@agulhadeouro".to_string()),
                phone: None,
            },
            whatsapp: None,
            llm: LlmConfig::default(),
            email: None,
            cron_secret: Some("test-secret".to_string()),
            sessions: SessionConfig::default(),
            scheduler: SchedulerConfig::default(),
            pricing: PriceTable::default(),
            dry_run: true,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("inkdesk.db")
    }
}
