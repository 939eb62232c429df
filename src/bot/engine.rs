//! Bot engine: routes each customer message to a canned reply, the quote
//! flow, or the LLM.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::conversation::{ConversationSnapshot, ConversationTracker, DetailExtractor, Stage};
use super::intents::{Intent, IntentMatcher, canned_reply};
use super::message::IncomingMessage;
use super::whatsapp::Messenger;
use crate::config::StudioInfo;
use crate::llm::{Assistant, Message};
use crate::pricing::{PriceTable, Quote};

pub const FALLBACK_REPLY: &str =
    "Desculpe, não consegui responder agora. Um atendente do estúdio vai falar com você em breve!";

const ASK_DETAILS: &str = "Me conta sua ideia de tatuagem, o tamanho aproximado (em cm) e o local do corpo \
     que eu calculo um orçamento para você!";

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Canned(Intent),
    Conversation,
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub source: ReplySource,
}

impl BotReply {
    fn new(text: impl Into<String>, source: ReplySource) -> Self {
        Self { text: text.into(), source }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStats {
    pub conversations: usize,
    pub initial: usize,
    pub collecting_info: usize,
    pub completed: usize,
}

/// System prompt for free-form questions.
pub fn system_prompt(studio: &StudioInfo) -> String {
    let mut prompt = format!(
        "Você é o atendente virtual do estúdio de tatuagem {}. Responda em português do Brasil, \
         de forma curta, simpática e objetiva (no máximo 3 frases).\n\
         Endereço: {}\nHorário: {}\nPortfólio: {}\n",
        studio.name, studio.address, studio.hours, studio.portfolio_url
    );
    if let Some(instagram) = &studio.instagram {
        prompt.push_str(&format!("Instagram: {instagram}\n"));
    }
    prompt.push_str(
        "Não invente preços nem datas disponíveis: para orçamento, peça a ideia, o tamanho e o local do corpo; \
         para agendar, diga que um atendente vai confirmar o horário.",
    );
    prompt
}

fn quote_reply(idea: &str, quote: &Quote) -> String {
    format!(
        "Orçamento estimado para sua tatuagem de {idea}:\n{}\n\n\
         O valor final é confirmado pelo artista. Quer agendar? É só responder \"agendar\"!",
        quote.describe()
    )
}

fn missing_reply(missing: &[&str]) -> String {
    let list = match missing {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} e {}", init.join(", "), last),
    };
    format!("Anotado! Para calcular o orçamento ainda preciso saber {list}.")
}

fn booking_reply(studio: &StudioInfo) -> String {
    format!(
        "Perfeito! Anotei seu interesse. Um artista do {} vai te chamar aqui para combinar a data e o sinal. 🖤",
        studio.name
    )
}

pub struct BotEngine {
    tracker: Mutex<ConversationTracker>,
    matcher: IntentMatcher,
    extractor: DetailExtractor,
    assistant: Arc<dyn Assistant>,
    studio: StudioInfo,
    prices: PriceTable,
}

impl BotEngine {
    pub fn new(studio: StudioInfo, prices: PriceTable, assistant: Arc<dyn Assistant>) -> Result<Self, regex::Error> {
        Ok(Self {
            tracker: Mutex::new(ConversationTracker::default()),
            matcher: IntentMatcher::new()?,
            extractor: DetailExtractor::new()?,
            assistant,
            studio,
            prices,
        })
    }

    /// Decide the reply to `text` from `user_id`, updating their conversation.
    pub async fn handle(&self, user_id: &str, text: &str, at: DateTime<Utc>) -> BotReply {
        let text = text.trim();
        let intent = self.matcher.detect(text);

        // The tracker lock is released before any LLM call
        {
            let mut tracker = self.tracker.lock().await;
            let conversation = tracker.touch(user_id, at);

            if intent == Some(Intent::Restart) {
                conversation.start_collecting();
                return BotReply::new(format!("Vamos começar um novo orçamento! {ASK_DETAILS}"), ReplySource::Conversation);
            }

            if conversation.stage == Stage::CollectingInfo {
                let details = self.extractor.extract(text);
                if !details.is_empty() || intent.is_none() {
                    let mut details = details;
                    // Free text with nothing recognisable is taken as the idea
                    if details.is_empty() && conversation.details.idea.is_none() && !text.is_empty() {
                        details.idea = Some(text.to_string());
                    }
                    if let Some(quote) = conversation.absorb(details, &self.prices) {
                        let idea = conversation.details.idea.as_deref().unwrap_or("sua ideia");
                        let reply = quote_reply(idea, &quote);
                        info!("💰 Quote for {}: {} cents", user_id, quote.total_cents);
                        return BotReply::new(reply, ReplySource::Conversation);
                    }
                    return BotReply::new(missing_reply(&conversation.details.missing()), ReplySource::Conversation);
                }
            }

            match intent {
                Some(Intent::Price) => {
                    if conversation.stage != Stage::CollectingInfo {
                        conversation.start_collecting();
                    }
                    if let Some(reply) = canned_reply(Intent::Price, &self.studio, &self.prices) {
                        return BotReply::new(reply, ReplySource::Canned(Intent::Price));
                    }
                }
                Some(intent @ (Intent::Hours | Intent::Address | Intent::Portfolio | Intent::Greeting)) => {
                    if let Some(reply) = canned_reply(intent, &self.studio, &self.prices) {
                        return BotReply::new(reply, ReplySource::Canned(intent));
                    }
                }
                Some(Intent::Book) => {
                    if conversation.stage == Stage::Completed {
                        info!("📅 Booking request from {}", user_id);
                        return BotReply::new(booking_reply(&self.studio), ReplySource::Canned(Intent::Book));
                    }
                    conversation.start_collecting();
                    return BotReply::new(
                        format!("Claro! Antes de agendar, preciso de um orçamento. {ASK_DETAILS}"),
                        ReplySource::Canned(Intent::Book),
                    );
                }
                Some(Intent::TattooRequest) => {
                    if conversation.stage != Stage::CollectingInfo {
                        conversation.start_collecting();
                    }
                    let details = self.extractor.extract(text);
                    if let Some(quote) = conversation.absorb(details, &self.prices) {
                        let idea = conversation.details.idea.as_deref().unwrap_or("sua ideia");
                        let reply = quote_reply(idea, &quote);
                        return BotReply::new(reply, ReplySource::Conversation);
                    }
                    let missing = conversation.details.missing();
                    let reply = if missing.len() == 3 {
                        format!("Que legal! {ASK_DETAILS}")
                    } else {
                        missing_reply(&missing)
                    };
                    return BotReply::new(reply, ReplySource::Conversation);
                }
                Some(Intent::Restart) | None => {}
            }

            if conversation.stage == Stage::Completed && self.matcher.is_affirmative(text) {
                info!("📅 Booking confirmed by {}", user_id);
                return BotReply::new(booking_reply(&self.studio), ReplySource::Conversation);
            }
        }

        match self
            .assistant
            .reply(&system_prompt(&self.studio), &[Message::user(text)])
            .await
        {
            Ok(reply) => BotReply::new(reply, ReplySource::Llm),
            Err(e) => {
                warn!("LLM reply failed for {}: {}", user_id, e);
                BotReply::new(FALLBACK_REPLY, ReplySource::Fallback)
            }
        }
    }

    /// Handle an inbound message and send the reply back over `messenger`.
    pub async fn respond(&self, message: &IncomingMessage, messenger: &dyn Messenger) -> BotReply {
        info!("📨 {}", message.log_line());
        let reply = self.handle(&message.from, &message.text, message.timestamp).await;
        match messenger.send_text(&message.from, &reply.text).await {
            Ok(_) => info!("📤 Replied to {} ({:?})", message.from, reply.source),
            Err(e) => warn!("Failed to reply to {}: {}", message.from, e),
        }
        reply
    }

    pub async fn conversations(&self) -> Vec<ConversationSnapshot> {
        self.tracker.lock().await.snapshots()
    }

    pub async fn reset_conversation(&self, user_id: &str) -> bool {
        self.tracker.lock().await.reset(user_id)
    }

    pub async fn stage(&self, user_id: &str) -> Stage {
        self.tracker.lock().await.stage(user_id)
    }

    pub async fn stats(&self) -> BotStats {
        let tracker = self.tracker.lock().await;
        BotStats {
            conversations: tracker.len(),
            initial: tracker.count_in(Stage::Initial),
            collecting_info: tracker.count_in(Stage::CollectingInfo),
            completed: tracker.count_in(Stage::Completed),
        }
    }
}
