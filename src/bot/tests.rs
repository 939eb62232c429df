//! End-to-end tests for the bot engine with a scripted assistant.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::*;
use crate::config::Config;
use crate::llm::{Assistant, LlmError, Message};

/// Assistant that answers with a fixed text, or fails, and records prompts.
struct ScriptedAssistant {
    answer: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAssistant {
    fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self { answer: Some(text.to_string()), prompts: Mutex::new(Vec::new()) })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { answer: None, prompts: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn reply(&self, _system: &str, messages: &[Message]) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().extend(messages.iter().map(|m| m.content.clone()));
        self.answer.clone().ok_or(LlmError::Empty)
    }
}

/// Messenger that records what it would have sent.
#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, to: &str, text: &str) -> Result<String, WhatsAppError> {
        self.sent.lock().unwrap().push((to.to_string(), text.to_string()));
        Ok("wamid.test".to_string())
    }
}

fn engine(assistant: Arc<dyn Assistant>) -> BotEngine {
    let config = Config::for_tests();
    BotEngine::new(config.studio, config.pricing, assistant).unwrap()
}

mod canned {
    use super::*;

    #[tokio::test]
    async fn test_hours_and_address() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let hours = bot.handle("u1", "Que horas vocês abrem?", Utc::now()).await;
        assert_eq!(hours.source, ReplySource::Canned(Intent::Hours));
        assert!(hours.text.contains("terça a sábado"));

        let address = bot.handle("u1", "onde fica o estúdio?", Utc::now()).await;
        assert_eq!(address.source, ReplySource::Canned(Intent::Address));
        assert!(address.text.contains("Rua Augusta"));
    }

    #[tokio::test]
    async fn test_portfolio_and_greeting() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let portfolio = bot.handle("u1", "tem fotos dos trabalhos?", Utc::now()).await;
        assert_eq!(portfolio.source, ReplySource::Canned(Intent::Portfolio));
        let greeting = bot.handle("u1", "Oi!", Utc::now()).await;
        assert_eq!(greeting.source, ReplySource::Canned(Intent::Greeting));
        assert_eq!(bot.stage("u1").await, Stage::Initial);
    }

    #[tokio::test]
    async fn test_price_starts_collecting() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let reply = bot.handle("u1", "Quanto custa?", Utc::now()).await;
        assert_eq!(reply.source, ReplySource::Canned(Intent::Price));
        assert!(reply.text.contains("R$ 200,00"));
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);
    }
}

mod quote_flow {
    use super::*;

    #[tokio::test]
    async fn test_stages_advance_to_completed_with_quote() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let t0 = Utc::now();
        assert_eq!(bot.stage("u1").await, Stage::Initial);

        let first = bot.handle("u1", "Oi, quero fazer uma tatuagem de leão", t0).await;
        assert_eq!(first.source, ReplySource::Conversation);
        assert!(first.text.contains("o tamanho aproximado (em cm) e o local do corpo"));
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);

        let second = bot.handle("u1", "uns 15 cm", t0 + Duration::minutes(1)).await;
        assert!(second.text.contains("preciso saber o local do corpo"));
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);

        let third = bot.handle("u1", "no antebraço, realismo", t0 + Duration::minutes(2)).await;
        assert_eq!(bot.stage("u1").await, Stage::Completed);
        assert!(third.text.contains("tatuagem de leão"));
        assert!(third.text.contains("Realismo: + R$ 200,00"));
        assert!(third.text.contains("Total estimado: R$ 600,00"));
    }

    #[tokio::test]
    async fn test_full_request_quotes_immediately() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let reply = bot
            .handle("u1", "Quero uma tatuagem de rosa no pulso, 8cm, colorida", Utc::now())
            .await;
        assert_eq!(bot.stage("u1").await, Stage::Completed);
        assert!(reply.text.contains("Colorida: + R$ 100,00"));
        assert!(reply.text.contains("Total estimado: R$ 300,00"));
    }

    #[tokio::test]
    async fn test_free_text_becomes_idea() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        bot.handle("u1", "qual o valor?", Utc::now()).await;
        let reply = bot.handle("u1", "um dragão oriental enrolado", Utc::now()).await;
        assert_eq!(reply.source, ReplySource::Conversation);
        let snapshot = bot.conversations().await.remove(0);
        assert_eq!(snapshot.details.style.as_deref(), Some("oriental"));

        // Style alone isn't an idea, so the next plain text fills it
        bot.handle("u1", "um dragão enrolado", Utc::now()).await;
        let snapshot = bot.conversations().await.remove(0);
        assert_eq!(snapshot.details.idea.as_deref(), Some("um dragão enrolado"));
    }

    #[tokio::test]
    async fn test_canned_questions_while_collecting() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        bot.handle("u1", "quero uma tatuagem de lobo", Utc::now()).await;
        let reply = bot.handle("u1", "qual o endereço?", Utc::now()).await;
        assert_eq!(reply.source, ReplySource::Canned(Intent::Address));
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);
        assert_eq!(bot.conversations().await[0].details.idea.as_deref(), Some("lobo"));
    }

    #[tokio::test]
    async fn test_booking_after_quote() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        bot.handle("u1", "tatuagem de âncora, 10 cm, no tornozelo", Utc::now()).await;
        assert_eq!(bot.stage("u1").await, Stage::Completed);

        let yes = bot.handle("u1", "sim!", Utc::now()).await;
        assert_eq!(yes.source, ReplySource::Conversation);
        assert!(yes.text.contains("Agulha de Ouro"));

        let book = bot.handle("u1", "quero agendar", Utc::now()).await;
        assert_eq!(book.source, ReplySource::Canned(Intent::Book));
    }

    #[tokio::test]
    async fn test_book_without_quote_asks_details() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let reply = bot.handle("u1", "queria marcar um horário", Utc::now()).await;
        assert!(reply.text.contains("Antes de agendar"));
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);
    }

    #[tokio::test]
    async fn test_restart_clears_details() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        bot.handle("u1", "tatuagem de caveira, 20cm, nas costas", Utc::now()).await;
        assert_eq!(bot.stage("u1").await, Stage::Completed);

        bot.handle("u1", "novo orçamento", Utc::now()).await;
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);
        assert!(bot.conversations().await[0].details.is_empty());
    }

    #[tokio::test]
    async fn test_idle_conversation_starts_over() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let t0 = Utc::now();
        bot.handle("u1", "tatuagem de gato", t0).await;
        assert_eq!(bot.stage("u1").await, Stage::CollectingInfo);

        let later = bot.handle("u1", "e aí, tudo certo?", t0 + Duration::hours(30)).await;
        assert_eq!(later.source, ReplySource::Canned(Intent::Greeting));
        assert_eq!(bot.stage("u1").await, Stage::Initial);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        bot.handle("u1", "tatuagem de gato", Utc::now()).await;
        assert_eq!(bot.stage("u2").await, Stage::Initial);
        assert!(bot.reset_conversation("u1").await);
        assert!(!bot.reset_conversation("u1").await);
    }
}

mod llm_fallback {
    use super::*;

    #[tokio::test]
    async fn test_unmatched_text_goes_to_llm_verbatim() {
        let assistant = ScriptedAssistant::answering("Fazemos sim!");
        let bot = engine(assistant.clone());
        let reply = bot.handle("u1", "vocês fazem cover up?", Utc::now()).await;
        assert_eq!(reply, BotReply { text: "Fazemos sim!".to_string(), source: ReplySource::Llm });
        assert_eq!(assistant.prompts.lock().unwrap().as_slice(), ["vocês fazem cover up?".to_string()]);
    }

    #[tokio::test]
    async fn test_llm_failure_gets_apology() {
        let bot = engine(ScriptedAssistant::failing());
        let reply = bot.handle("u1", "vocês fazem cover up?", Utc::now()).await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert_eq!(reply.text, engine::FALLBACK_REPLY);
    }

    #[test]
    fn test_system_prompt_mentions_studio() {
        let config = Config::for_tests();
        let prompt = system_prompt(&config.studio);
        assert!(prompt.contains("Agulha de Ouro"));
        assert!(prompt.contains("Rua Augusta"));
        assert!(prompt.contains("@agulhadeouro"));
    }
}

mod transport {
    use super::*;

    #[tokio::test]
    async fn test_respond_sends_reply_to_sender() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        let messenger = RecordingMessenger::default();
        let message = IncomingMessage {
            id: "wamid.1".to_string(),
            from: "5511988887777".to_string(),
            name: Some("Júlia".to_string()),
            text: "qual o horário?".to_string(),
            timestamp: Utc::now(),
        };
        let reply = bot.respond(&message, &messenger).await;
        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "5511988887777");
        assert_eq!(sent[0].1, reply.text);
    }

    #[tokio::test]
    async fn test_stats_count_stages() {
        let bot = engine(ScriptedAssistant::answering("llm"));
        bot.handle("a", "oi", Utc::now()).await;
        bot.handle("b", "quanto custa?", Utc::now()).await;
        bot.handle("c", "tatuagem de sol, 5cm, no pé", Utc::now()).await;
        let stats = bot.stats().await;
        assert_eq!(
            (stats.conversations, stats.initial, stats.collecting_info, stats.completed),
            (3, 1, 1, 1)
        );
    }
}
