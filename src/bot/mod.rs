//! WhatsApp auto-reply bot: intents, quote conversations and the transport.

pub mod conversation;
pub mod engine;
pub mod intents;
pub mod message;
pub mod whatsapp;

#[cfg(test)]
mod tests;

pub use conversation::{ConversationSnapshot, ConversationTracker, Stage, TattooDetails};
pub use engine::{BotEngine, BotReply, BotStats, ReplySource, system_prompt};
pub use intents::Intent;
pub use message::IncomingMessage;
pub use whatsapp::{LogMessenger, Messenger, WebhookPayload, WhatsAppClient, WhatsAppError};
