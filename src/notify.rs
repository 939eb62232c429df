//! Email notifications over an HTTP email API.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::EmailConfig;
use crate::text::preview;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("email API returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, email: &Email) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// JSON `POST {api_url}` with a bearer API key.
pub struct HttpEmailNotifier {
    config: EmailConfig,
    http: reqwest::Client,
}

impl HttpEmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    async fn send_email(&self, email: &Email) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&SendRequest {
                from: &self.config.from,
                to: &email.to,
                subject: &email.subject,
                text: &email.text,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }
        info!("📧 Email sent to {}: {}", email.to, email.subject);
        Ok(())
    }
}

/// Logs emails instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, email: &Email) -> Result<(), NotifyError> {
        info!("📧 [dry run] email to {}: {}", email.to, email.subject);
        Ok(())
    }
}

/// Email telling `to` that `sender_name` started a chat with them.
pub fn first_message_email(to: &str, sender_name: &str, text: &str, studio: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("{sender_name} enviou uma mensagem para você"),
        text: format!(
            "Olá!\n\n{sender_name} iniciou uma conversa com você no {studio}:\n\n\"{}\"\n\nAbra o app para responder.",
            preview(text, 200)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::{Json, Router, routing::post};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/send")
    }

    fn config(api_url: String) -> EmailConfig {
        EmailConfig { api_url, api_key: "key-123".to_string(), from: "studio@example.com".to_string() }
    }

    #[test]
    fn test_first_message_email() {
        let email = first_message_email("bia@example.com", "Rafa", "Oi! Vi seu trabalho.", "Agulha de Ouro");
        assert_eq!(email.to, "bia@example.com");
        assert_eq!(email.subject, "Rafa enviou uma mensagem para você");
        assert!(email.text.contains("\"Oi! Vi seu trabalho.\""));
        assert!(email.text.contains("Agulha de Ouro"));
    }

    #[tokio::test]
    async fn test_http_notifier_posts_json_with_bearer() {
        let seen: Arc<Mutex<Option<(String, Value)>>> = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();
        let router = Router::new().route(
            "/send",
            post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *seen_in_handler.lock().unwrap() = Some((auth, body));
                "ok"
            }),
        );
        let url = serve(router).await;
        let notifier = HttpEmailNotifier::new(config(url));
        let email = Email { to: "x@example.com".into(), subject: "Oi".into(), text: "corpo".into() };
        notifier.send_email(&email).await.unwrap();

        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth, "Bearer key-123");
        assert_eq!(body["from"], "studio@example.com");
        assert_eq!(body["to"], "x@example.com");
    }

    #[tokio::test]
    async fn test_http_notifier_reports_api_errors() {
        let router = Router::new().route(
            "/send",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let url = serve(router).await;
        let notifier = HttpEmailNotifier::new(config(url));
        let email = Email { to: "x@example.com".into(), subject: "Oi".into(), text: "corpo".into() };
        let err = notifier.send_email(&email).await.unwrap_err();
        assert!(matches!(err, NotifyError::Api { status: 401, .. }));
    }
}
