//! Tracing layer that forwards warnings and errors to the studio owner's
//! WhatsApp.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::bot::whatsapp::Messenger;
use crate::text::preview;

/// WhatsApp rejects text bodies above 4096 characters.
const MAX_ALERT_CHARS: usize = 4000;
const FLUSH_EVERY: Duration = Duration::from_secs(5);

enum Alert {
    /// ERROR: sent right away
    Urgent(String),
    /// WARN: batched and flushed periodically
    Batched(String),
}

pub struct AlertLayer {
    tx: mpsc::UnboundedSender<Alert>,
}

impl AlertLayer {
    /// Spawns the delivery task. It ends, after a final flush, once the
    /// layer is dropped.
    pub fn new(messenger: Arc<dyn Messenger>, phone: String) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Alert>();

        let handle = tokio::spawn(async move {
            let mut buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + FLUSH_EVERY, FLUSH_EVERY);

            loop {
                tokio::select! {
                    alert = rx.recv() => {
                        match alert {
                            Some(Alert::Urgent(text)) => send_alert(messenger.as_ref(), &phone, &text).await,
                            Some(Alert::Batched(text)) => {
                                buffer.push(text);
                                if buffer.len() >= 20 {
                                    flush(messenger.as_ref(), &phone, &mut buffer).await;
                                }
                            }
                            None => {
                                flush(messenger.as_ref(), &phone, &mut buffer).await;
                                break;
                            }
                        }
                    }
                    _ = interval.tick() => flush(messenger.as_ref(), &phone, &mut buffer).await,
                }
            }
        });

        (Self { tx }, handle)
    }
}

async fn send_alert(messenger: &dyn Messenger, phone: &str, text: &str) {
    let text = preview(text, MAX_ALERT_CHARS);
    // Logging here would feed back into this layer
    if let Err(e) = messenger.send_text(phone, &text).await {
        eprintln!("Failed to send alert to WhatsApp: {e}");
    }
}

async fn flush(messenger: &dyn Messenger, phone: &str, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_alert(messenger, phone, &combined).await;
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if level > Level::WARN || metadata.target().starts_with(module_path!()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let alert = if level == Level::ERROR {
            Alert::Urgent(format!("❌ {}", visitor.message))
        } else {
            Alert::Batched(format!("⚠️ {}", visitor.message))
        };
        if self.tx.send(alert).is_err() {
            eprintln!("Alert channel closed, message dropped");
        }
    }
}
