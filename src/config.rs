//! Configuration types.
//!
//! Everything here is read once at startup and shared read-only behind an
//! `Arc`. Components receive the config by reference; nothing looks it up
//! ambiently.

use crate::error::ConfigError;

/// Staging recipient rewriting.
#[derive(Debug, Clone, Default)]
pub struct StagingRedirectConfig {
    pub enabled: bool,
    /// Template for `to` recipients, with `{user}` and `{domain}` placeholders.
    pub to_template: String,
    /// Template for `cc` recipients.
    pub cc_template: String,
    /// Mailing lists that keep their real address even in staging.
    pub excluded_recipient_list: Vec<String>,
}

impl StagingRedirectConfig {
    /// Build from `FEATUREWATCH_SEND_ALL_EMAIL_TO` / `FEATUREWATCH_CC_ALL_EMAIL_TO`.
    /// Redirection is disabled when the `to` template is unset.
    pub fn from_env() -> Self {
        let Some(to_template) = non_empty_var("FEATUREWATCH_SEND_ALL_EMAIL_TO") else {
            return Self::default();
        };
        let cc_template =
            non_empty_var("FEATUREWATCH_CC_ALL_EMAIL_TO").unwrap_or_else(|| to_template.clone());
        Self {
            enabled: true,
            to_template,
            cc_template,
            excluded_recipient_list: list_var("FEATUREWATCH_REVIEW_COMMENT_MAILING_LIST"),
        }
    }

    /// Whether `to` is made up only of exempt mailing lists.
    pub fn is_exempt(&self, to: &[String]) -> bool {
        !to.is_empty()
            && to.iter().all(|addr| {
                self.excluded_recipient_list
                    .iter()
                    .any(|ex| ex.eq_ignore_ascii_case(addr))
            })
    }
}

/// Mail pipeline settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Application identifier used to build sender addresses.
    pub app_id: String,
    /// Display name on outgoing mail.
    pub sender_name: String,
    /// Domain of the sender address, `{app_id}.appspotmail.com` by default.
    pub sender_domain: String,
    /// Global kill switch for the mail transport.
    pub send_email: bool,
    pub staging: StagingRedirectConfig,
    /// The one address inbound mail is accepted for.
    pub inbound_email_addr: String,
    /// Operator address that receives bounce reports.
    pub bounce_escalation_addr: String,
    /// Maximum characters of an email body written to the log.
    pub max_log_line: usize,
    /// Skip the task-queue header check (tests).
    pub unit_test_mode: bool,
    /// Skip the task-queue header check (local development).
    pub dev_mode: bool,
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_id = std::env::var("FEATUREWATCH_APP_ID")
            .map_err(|_| ConfigError::MissingEnvVar("FEATUREWATCH_APP_ID".into()))?;
        let sender_domain = non_empty_var("FEATUREWATCH_SENDER_DOMAIN")
            .unwrap_or_else(|| format!("{app_id}.appspotmail.com"));
        let inbound_email_addr = non_empty_var("FEATUREWATCH_INBOUND_EMAIL_ADDR")
            .unwrap_or_else(|| format!("{app_id}@appspot.gserviceaccount.com"));
        let bounce_escalation_addr = std::env::var("FEATUREWATCH_BOUNCE_ESCALATION_ADDR")
            .map_err(|_| ConfigError::MissingEnvVar("FEATUREWATCH_BOUNCE_ESCALATION_ADDR".into()))?;

        Ok(Self {
            sender_name: non_empty_var("FEATUREWATCH_SENDER_NAME")
                .unwrap_or_else(|| "Featurewatch".to_string()),
            sender_domain,
            send_email: bool_var("FEATUREWATCH_SEND_EMAIL", false)?,
            staging: StagingRedirectConfig::from_env(),
            inbound_email_addr,
            bounce_escalation_addr,
            max_log_line: parse_var("FEATUREWATCH_MAX_LOG_LINE", 200)?,
            unit_test_mode: bool_var("FEATUREWATCH_UNIT_TEST_MODE", false)?,
            dev_mode: bool_var("FEATUREWATCH_DEV_MODE", false)?,
            app_id,
        })
    }

    /// Whether the task-queue header check is bypassed.
    pub fn trusts_any_caller(&self) -> bool {
        self.unit_test_mode || self.dev_mode
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            app_id: "featurewatch-dev".to_string(),
            sender_name: "Featurewatch".to_string(),
            sender_domain: "featurewatch-dev.appspotmail.com".to_string(),
            send_email: false,
            staging: StagingRedirectConfig::default(),
            inbound_email_addr: "featurewatch-dev@appspot.gserviceaccount.com".to_string(),
            bounce_escalation_addr: "ops@example.com".to_string(),
            max_log_line: 200,
            unit_test_mode: false,
            dev_mode: false,
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: String,
    /// Base URL the task queue accepts submissions on.
    pub task_queue_url: String,
    /// Header the upstream auth proxy puts the signed-in user's email in.
    pub session_header: String,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_var("FEATUREWATCH_PORT", 8080)?,
            db_path: std::env::var("FEATUREWATCH_DB_PATH")
                .unwrap_or_else(|_| "./data/featurewatch.db".to_string()),
            task_queue_url: std::env::var("FEATUREWATCH_TASK_QUEUE_URL")
                .map_err(|_| ConfigError::MissingEnvVar("FEATUREWATCH_TASK_QUEUE_URL".into()))?,
            session_header: std::env::var("FEATUREWATCH_SESSION_HEADER")
                .unwrap_or_else(|_| "X-Authenticated-User-Email".to_string()),
            mail: MailConfig::from_env()?,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn list_var(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bool_var(key: &str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(key) {
        None => Ok(default),
        Some(v) => parse_bool(&v).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {v:?}"),
        }),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
