//! Tests against a running Ollama server.
//!
//! These tests require a local Ollama with the configured model pulled.
//! Override the defaults with OLLAMA_ENDPOINT and OLLAMA_MODEL.
//!
//! Run with: cargo test --features integ_test --test llm_live

#[cfg(feature = "integ_test")]
mod tests {
    use inkdesk::bot::system_prompt;
    use inkdesk::config::{Config, LlmConfig};
    use inkdesk::llm::{Client, Message};

    fn live_config() -> LlmConfig {
        let mut config = LlmConfig::default();
        if let Ok(endpoint) = std::env::var("OLLAMA_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.model = model;
        }
        config
    }

    #[tokio::test]
    async fn test_chat_returns_text() {
        let client = Client::new(&live_config()).expect("Failed to build client");
        let reply = client
            .chat("Responda apenas com a palavra: ok", &[Message::user("ping")])
            .await
            .expect("Ollama should answer");
        assert!(!reply.is_empty());
    }

    #[tokio::test]
    async fn test_studio_prompt_answers_in_portuguese_context() {
        let client = Client::new(&live_config()).expect("Failed to build client");
        let studio = Config::for_tests().studio;
        let reply = client
            .chat(&system_prompt(&studio), &[Message::user("Vocês fazem tatuagem colorida?")])
            .await
            .expect("Ollama should answer");
        println!("Reply: {reply}");
        assert!(!reply.trim().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let mut config = live_config();
        config.endpoint = "http://127.0.0.1:9".to_string();
        config.timeout_secs = 2;
        let client = Client::new(&config).expect("Failed to build client");
        let err = client.chat("", &[Message::user("oi")]).await.unwrap_err();
        assert!(matches!(err, inkdesk::llm::LlmError::Http(_)));
    }
}
