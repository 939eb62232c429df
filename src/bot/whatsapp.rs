//! WhatsApp Cloud API transport: outbound text messages, webhook payloads
//! and the subscription handshake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use super::message::IncomingMessage;
use crate::config::WhatsAppConfig;
use crate::text::digits_only;

#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WhatsApp API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid recipient '{0}'")]
    InvalidRecipient(String),
}

/// Sends text messages to customers.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the transport's message id.
    async fn send_text(&self, to: &str, text: &str) -> Result<String, WhatsAppError>;

    /// Whether messages actually leave the process.
    fn is_live(&self) -> bool {
        true
    }
}

/// Normalise a Brazilian phone number for WhatsApp: digits only, with the
/// `55` country code added to bare 10/11 digit numbers.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits = digits_only(phone);
    match digits.len() {
        10 | 11 => Some(format!("55{digits}")),
        12..=15 => Some(digits),
        _ => None,
    }
}

/// `https://wa.me/` click-to-chat link with a prefilled message.
pub fn whatsapp_link(phone: &str, text: Option<&str>) -> Option<String> {
    let phone = normalize_phone(phone)?;
    Some(match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => format!("https://wa.me/{phone}?text={}", urlencoding::encode(text)),
        None => format!("https://wa.me/{phone}"),
    })
}

#[derive(Serialize)]
struct SendRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentId>,
}

#[derive(Deserialize)]
struct SentId {
    id: String,
}

/// WhatsApp Cloud API client.
pub struct WhatsAppClient {
    config: WhatsAppConfig,
    http: reqwest::Client,
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    pub fn config(&self) -> &WhatsAppConfig {
        &self.config
    }
}

#[async_trait]
impl Messenger for WhatsAppClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<String, WhatsAppError> {
        let to = normalize_phone(to).ok_or_else(|| WhatsAppError::InvalidRecipient(to.to_string()))?;
        let url = format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        );
        let request = SendRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &to,
            kind: "text",
            text: TextBody { preview_url: false, body: text },
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            debug!("WhatsApp send to {} failed: {} {}", to, status, body);
            return Err(WhatsAppError::Api { status, body });
        }

        let sent: SendResponse = response.json().await?;
        Ok(sent.messages.into_iter().next().map(|m| m.id).unwrap_or_default())
    }
}

/// Logs outgoing messages instead of sending them.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_text(&self, to: &str, text: &str) -> Result<String, WhatsAppError> {
        let to = normalize_phone(to).ok_or_else(|| WhatsAppError::InvalidRecipient(to.to_string()))?;
        info!("📤 [dry run] to {}: {:?}", to, text);
        Ok(String::from("dry-run"))
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Answer to the webhook verification GET: echo the challenge when mode
/// is `subscribe` and the token matches.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if mode == Some("subscribe") && !expected_token.is_empty() && token == Some(expected_token) {
        challenge.map(str::to_string)
    } else {
        None
    }
}

/// Header the Cloud API signs every webhook delivery with.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check a `sha256=<hex>` signature against the HMAC-SHA256 of the raw
/// body keyed with the app secret. Comparison is constant time.
pub fn verify_signature(app_secret: &str, body: &[u8], header: Option<&str>) -> bool {
    if app_secret.is_empty() {
        return false;
    }
    let Some(signature) = header.and_then(|h| h.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

// Webhook notification payload, trimmed to the fields we read.

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
pub struct ContactProfile {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    /// Unix seconds as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<InboundText>,
}

#[derive(Debug, Deserialize)]
pub struct InboundText {
    pub body: String,
}

impl WebhookPayload {
    /// Text messages in the notification. Other message types (media,
    /// reactions, status updates) are skipped.
    pub fn text_messages(&self) -> Vec<IncomingMessage> {
        let mut out = Vec::new();
        for change in self.entry.iter().flat_map(|e| &e.changes) {
            if change.field != "messages" {
                continue;
            }
            for message in &change.value.messages {
                let Some(text) = message.text.as_ref().filter(|_| message.kind == "text") else {
                    continue;
                };
                let name = change
                    .value
                    .contacts
                    .iter()
                    .find(|c| c.wa_id == message.from)
                    .and_then(|c| c.profile.as_ref())
                    .map(|p| p.name.clone());
                let timestamp = message
                    .timestamp
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .unwrap_or_else(Utc::now);
                out.push(IncomingMessage {
                    id: message.id.clone(),
                    from: digits_only(&message.from),
                    name,
                    text: text.body.clone(),
                    timestamp,
                });
            }
        }
        out
    }
}
