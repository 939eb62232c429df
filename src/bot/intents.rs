//! Keyword intents and their canned replies.
//!
//! Matching runs on accent-folded lowercase text, so "preço", "Preco" and
//! "PREÇO" all hit the same pattern.

use regex::Regex;
use serde::Serialize;

use crate::config::StudioInfo;
use crate::pricing::{PriceTable, SizeClass};
use crate::text::{fold, format_brl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Restart,
    Book,
    Price,
    Hours,
    Address,
    Portfolio,
    TattooRequest,
    Greeting,
}

/// Detection order; the first match wins.
const PATTERNS: &[(Intent, &str)] = &[
    (Intent::Restart, r"\b(novo orcamento|outro orcamento|recomecar|comecar de novo|reiniciar)\b"),
    (Intent::Book, r"\b(agendar|agendamento|marcar|reservar|quero fechar)\b"),
    (Intent::Price, r"\b(precos?|valor(es)?|quanto custa|quanto fica|quanto sai|quanto e|orcamentos?)\b"),
    (Intent::Hours, r"\b(horarios?|que horas|funciona(mento)?|abert[oa]s?|abre|fecha)\b"),
    (Intent::Address, r"\b(endereco|onde fica|onde voces ficam|localizacao|como chego|como chegar)\b"),
    (Intent::Portfolio, r"\b(portfolio|trabalhos|fotos|instagram|insta)\b"),
    (Intent::TattooRequest, r"\b(tatuagem|tatuagens|tattoo|tatoo|tatuar|tattoos)\b"),
    (Intent::Greeting, r"^\W*(oi+e?|ola|bom dia|boa tarde|boa noite|e ai|opa|hey|hello)\b"),
];

/// Yes-style answers that confirm a booking once a quote was given.
const AFFIRMATIVE: &str = r"^\W*(sim|quero|pode ser|fechado|bora|vamos|claro|ok|beleza|com certeza)\b";

pub struct IntentMatcher {
    patterns: Vec<(Intent, Regex)>,
    affirmative: Regex,
}

impl IntentMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = PATTERNS
            .iter()
            .map(|(intent, pattern)| Ok((*intent, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns, affirmative: Regex::new(AFFIRMATIVE)? })
    }

    /// Highest-priority intent in `text`, if any.
    pub fn detect(&self, text: &str) -> Option<Intent> {
        let folded = fold(text);
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(&folded))
            .map(|(intent, _)| *intent)
    }

    pub fn is_affirmative(&self, text: &str) -> bool {
        self.affirmative.is_match(&fold(text))
    }
}

/// Canned reply for intents that don't depend on the conversation.
pub fn canned_reply(intent: Intent, studio: &StudioInfo, prices: &PriceTable) -> Option<String> {
    let reply = match intent {
        Intent::Greeting => format!(
            "Olá! Bem-vindo(a) ao {}. Posso te ajudar com orçamentos, horários, endereço e portfólio. \
             Me conta o que você precisa!",
            studio.name
        ),
        Intent::Hours => format!("Nosso horário de atendimento: {}.", studio.hours),
        Intent::Address => {
            let mut reply = format!("Estamos em {}.", studio.address);
            if let Some(phone) = &studio.phone {
                reply.push_str(&format!(" Telefone: {phone}."));
            }
            reply
        }
        Intent::Portfolio => {
            let mut reply = format!("Confira nossos trabalhos: {}", studio.portfolio_url);
            if let Some(instagram) = &studio.instagram {
                reply.push_str(&format!("\nInstagram: {instagram}"));
            }
            reply
        }
        Intent::Price => price_table_reply(prices),
        Intent::Restart | Intent::Book | Intent::TattooRequest => return None,
    };
    Some(reply)
}

fn price_table_reply(prices: &PriceTable) -> String {
    let line = |size: SizeClass, range: &str| {
        format!("• {} ({range}): a partir de {}", capitalize(size.label()), format_brl(prices.base_for(size)))
    };
    format!(
        "Nossos valores base:\n{}\n{}\n{}\nRealismo, tatuagens coloridas e algumas regiões do corpo têm acréscimo.\n\n\
         Me conta sua ideia, o tamanho aproximado e o local do corpo que eu calculo um orçamento!",
        line(SizeClass::Small, "até 10 cm"),
        line(SizeClass::Medium, "até 20 cm"),
        line(SizeClass::Large, "acima de 20 cm"),
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn matcher() -> IntentMatcher {
        IntentMatcher::new().unwrap()
    }

    #[test]
    fn test_detects_each_intent() {
        let m = matcher();
        assert_eq!(m.detect("Qual o preço?"), Some(Intent::Price));
        assert_eq!(m.detect("quanto custa uma fineline"), Some(Intent::Price));
        assert_eq!(m.detect("Vocês estão abertos sábado?"), Some(Intent::Hours));
        assert_eq!(m.detect("Qual o endereço?"), Some(Intent::Address));
        assert_eq!(m.detect("Tem portfólio?"), Some(Intent::Portfolio));
        assert_eq!(m.detect("quero fazer uma tatuagem"), Some(Intent::TattooRequest));
        assert_eq!(m.detect("Oiii"), Some(Intent::Greeting));
        assert_eq!(m.detect("Bom dia!"), Some(Intent::Greeting));
        assert_eq!(m.detect("quero agendar"), Some(Intent::Book));
        assert_eq!(m.detect("Quero um novo orçamento"), Some(Intent::Restart));
        assert_eq!(m.detect("asdf"), None);
    }

    #[test]
    fn test_priority_order() {
        let m = matcher();
        // Price beats tattoo request and greeting
        assert_eq!(m.detect("oi, quanto custa uma tatuagem?"), Some(Intent::Price));
        // Tattoo request beats greeting
        assert_eq!(m.detect("oi, quero uma tatuagem de leão"), Some(Intent::TattooRequest));
        // Restart beats price even though "orçamento" is a price keyword
        assert_eq!(m.detect("novo orçamento"), Some(Intent::Restart));
    }

    #[test]
    fn test_greeting_only_at_start() {
        let m = matcher();
        assert_eq!(m.detect("ola"), Some(Intent::Greeting));
        assert_eq!(m.detect("eu disse ola"), None);
    }

    #[test]
    fn test_affirmative() {
        let m = matcher();
        assert!(m.is_affirmative("Sim, quero!"));
        assert!(m.is_affirmative("pode ser"));
        assert!(!m.is_affirmative("não, obrigado"));
    }

    #[test]
    fn test_canned_replies_use_studio_info() {
        let config = Config::for_tests();
        let hours = canned_reply(Intent::Hours, &config.studio, &config.pricing).unwrap();
        assert!(hours.contains("terça a sábado"));
        let address = canned_reply(Intent::Address, &config.studio, &config.pricing).unwrap();
        assert!(address.contains("Rua Augusta, 1000"));
        let portfolio = canned_reply(Intent::Portfolio, &config.studio, &config.pricing).unwrap();
        assert!(portfolio.contains("https://example.com/portfolio"));
        assert!(portfolio.contains("@agulhadeouro"));
        let greeting = canned_reply(Intent::Greeting, &config.studio, &config.pricing).unwrap();
        assert!(greeting.contains("Agulha de Ouro"));
        assert!(canned_reply(Intent::Book, &config.studio, &config.pricing).is_none());
    }

    #[test]
    fn test_price_reply_lists_table() {
        let config = Config::for_tests();
        let reply = canned_reply(Intent::Price, &config.studio, &config.pricing).unwrap();
        assert!(reply.contains("• Pequena (até 10 cm): a partir de R$ 200,00"));
        assert!(reply.contains("• Média (até 20 cm): a partir de R$ 400,00"));
        assert!(reply.contains("• Grande (acima de 20 cm): a partir de R$ 800,00"));
    }
}
