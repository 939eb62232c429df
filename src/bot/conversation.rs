//! Per-customer conversation state and tattoo detail extraction.
//!
//! Each customer moves `initial -> collecting_info -> completed`. While
//! collecting, every message is scanned for the idea, size, body location,
//! style and colour; once idea, size and location are known a quote is
//! computed. State lives in memory only and is lost on restart.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;

use crate::pricing::{self, PriceTable, Quote, QuoteRequest, SizeClass};
use crate::text::fold;

/// Conversations untouched for longer than this start over.
pub const IDLE_RESET_HOURS: i64 = 24;

/// (folded keyword, display name). Checked in order, most specific first.
const LOCATIONS: &[(&str, &str)] = &[
    ("antebraco", "antebraço"),
    ("braco", "braço"),
    ("panturrilha", "panturrilha"),
    ("tornozelo", "tornozelo"),
    ("costela", "costela"),
    ("costas", "costas"),
    ("clavicula", "clavícula"),
    ("pescoco", "pescoço"),
    ("nuca", "nuca"),
    ("ombro", "ombro"),
    ("peito", "peito"),
    ("barriga", "barriga"),
    ("virilha", "virilha"),
    ("coxa", "coxa"),
    ("perna", "perna"),
    ("pulso", "pulso"),
    ("dedo", "dedo"),
    ("mao", "mão"),
    ("pe", "pé"),
];

/// (folded keyword, style name). Multi-word keywords first.
const STYLES: &[(&str, &str)] = &[
    ("neo tradicional", "neotradicional"),
    ("neotradicional", "neotradicional"),
    ("old school", "old school"),
    ("fine line", "fineline"),
    ("fineline", "fineline"),
    ("realismo", "realismo"),
    ("realista", "realismo"),
    ("blackwork", "blackwork"),
    ("aquarela", "aquarela"),
    ("tradicional", "tradicional"),
    ("geometrica", "geométrico"),
    ("geometrico", "geométrico"),
    ("pontilhismo", "pontilhismo"),
    ("minimalista", "minimalista"),
    ("oriental", "oriental"),
    ("tribal", "tribal"),
    ("lettering", "lettering"),
];

const SIZE_WORDS: &[(&str, SizeClass)] = &[
    ("pequena", SizeClass::Small),
    ("pequeno", SizeClass::Small),
    ("pequenininha", SizeClass::Small),
    ("mini", SizeClass::Small),
    ("media", SizeClass::Medium),
    ("medio", SizeClass::Medium),
    ("grande", SizeClass::Large),
    ("fechamento", SizeClass::Large),
];

const COLOR_WORDS: &[&str] = &["colorida", "colorido", "coloridas", "coloridos", "cores", "colorir"];
const NO_COLOR: &[&str] = &["sem cor", "preto e branco", "preta e branca", "preto e cinza", "so preto"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    CollectingInfo,
    Completed,
}

/// Tattoo attributes gathered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TattooDetails {
    pub idea: Option<String>,
    pub size_cm: Option<u32>,
    pub size: Option<SizeClass>,
    pub body_location: Option<String>,
    pub style: Option<String>,
    pub colored: bool,
}

impl TattooDetails {
    pub fn is_empty(&self) -> bool {
        self.idea.is_none()
            && self.size_cm.is_none()
            && self.size.is_none()
            && self.body_location.is_none()
            && self.style.is_none()
            && !self.colored
    }

    fn size_class(&self) -> Option<SizeClass> {
        self.size.or_else(|| self.size_cm.map(SizeClass::from_cm))
    }

    /// Fill in fields from a newer message; newer values win.
    pub fn merge(&mut self, newer: TattooDetails) {
        if newer.idea.is_some() {
            self.idea = newer.idea;
        }
        if newer.size_cm.is_some() {
            self.size_cm = newer.size_cm;
            self.size = newer.size;
        } else if newer.size.is_some() {
            self.size = newer.size;
            self.size_cm = None;
        }
        if newer.body_location.is_some() {
            self.body_location = newer.body_location;
        }
        if newer.style.is_some() {
            self.style = newer.style;
        }
        self.colored |= newer.colored;
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// What still needs to be asked, in the order we ask it.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.idea.is_none() {
            missing.push("a ideia do desenho");
        }
        if self.size_class().is_none() {
            missing.push("o tamanho aproximado (em cm)");
        }
        if self.body_location.is_none() {
            missing.push("o local do corpo");
        }
        missing
    }

    pub fn quote_request(&self) -> QuoteRequest {
        QuoteRequest {
            size: self.size,
            size_cm: self.size_cm,
            style: self.style.clone(),
            body_location: self.body_location.clone(),
            colored: self.colored,
        }
    }
}

/// Pulls tattoo attributes out of free text.
pub struct DetailExtractor {
    size_cm: Regex,
    idea: Regex,
}

impl DetailExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            size_cm: Regex::new(r"(\d{1,3})\s*(cm|centimetros?)\b")?,
            idea: Regex::new(
                r"(?i)\b(?:tatuagem|tattoo|tatoo|tatuar)\s+(?:de|do|da|dos|das|com)\s+(.+?)(?:\s+(?:no|na|nos|nas|em|com|de\s+\d+)\s|[,.;!?]|\s+\d|$)",
            )?,
        })
    }

    pub fn extract(&self, text: &str) -> TattooDetails {
        let folded = fold(text);
        let words: Vec<&str> = folded.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
        let has_word = |w: &str| words.contains(&w);

        let size_cm = self
            .size_cm
            .captures(&folded)
            .and_then(|c| c[1].parse::<u32>().ok())
            .filter(|cm| *cm > 0);
        let size = match size_cm {
            Some(cm) => Some(SizeClass::from_cm(cm)),
            None => SIZE_WORDS.iter().find(|(w, _)| has_word(w)).map(|(_, s)| *s),
        };

        let body_location = LOCATIONS
            .iter()
            .find(|(keyword, _)| has_word(keyword))
            .map(|(_, name)| name.to_string());

        let style = STYLES
            .iter()
            .find(|(keyword, _)| contains_phrase(&folded, keyword))
            .map(|(_, name)| name.to_string());

        let colored = COLOR_WORDS.iter().any(|w| has_word(w))
            && !NO_COLOR.iter().any(|p| contains_phrase(&folded, p));

        // Idea comes from the original text to keep accents
        let lowered = text.to_lowercase();
        let idea = self
            .idea
            .captures(&lowered)
            .map(|c| c[1].trim().to_string())
            .filter(|idea| !idea.is_empty());

        TattooDetails { idea, size_cm, size, body_location, style, colored }
    }
}

/// Phrase match on word boundaries over folded text.
fn contains_phrase(folded: &str, phrase: &str) -> bool {
    folded.match_indices(phrase).any(|(start, _)| {
        let before = folded[..start].chars().next_back();
        let after = folded[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub stage: Stage,
    pub details: TattooDetails,
    pub quote: Option<Quote>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn new(at: DateTime<Utc>) -> Self {
        Self { stage: Stage::Initial, details: TattooDetails::default(), quote: None, updated_at: at }
    }

    /// Start collecting details for a new quote.
    pub fn start_collecting(&mut self) {
        self.stage = Stage::CollectingInfo;
        self.details = TattooDetails::default();
        self.quote = None;
    }

    /// Merge newly extracted details; computes the quote once enough is known.
    pub fn absorb(&mut self, details: TattooDetails, prices: &PriceTable) -> Option<Quote> {
        self.details.merge(details);
        if !self.details.is_complete() {
            return None;
        }
        self.quote = pricing::quote(prices, &self.details.quote_request());
        if self.quote.is_some() {
            self.stage = Stage::Completed;
        }
        self.quote.clone()
    }
}

/// Read-only view of a conversation for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub user_id: String,
    pub stage: Stage,
    pub details: TattooDetails,
    pub quote_total_cents: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory map of customer id to conversation.
pub struct ConversationTracker {
    conversations: HashMap<String, Conversation>,
    idle_reset: Duration,
}

impl Default for ConversationTracker {
    fn default() -> Self {
        Self::new(Duration::hours(IDLE_RESET_HOURS))
    }
}

impl ConversationTracker {
    pub fn new(idle_reset: Duration) -> Self {
        Self { conversations: HashMap::new(), idle_reset }
    }

    /// Drop every conversation idle for longer than the reset window.
    /// Returns how many were dropped.
    pub fn prune(&mut self, at: DateTime<Utc>) -> usize {
        let before = self.conversations.len();
        let idle_reset = self.idle_reset;
        self.conversations.retain(|_, c| at - c.updated_at <= idle_reset);
        before - self.conversations.len()
    }

    /// The user's conversation, touched at `at`. Stale ones start over,
    /// and other users' stale conversations are dropped.
    pub fn touch(&mut self, user_id: &str, at: DateTime<Utc>) -> &mut Conversation {
        self.prune(at);
        let idle_reset = self.idle_reset;
        let conversation = self
            .conversations
            .entry(user_id.to_string())
            .or_insert_with(|| Conversation::new(at));
        if at - conversation.updated_at > idle_reset {
            *conversation = Conversation::new(at);
        }
        conversation.updated_at = at;
        conversation
    }

    pub fn stage(&self, user_id: &str) -> Stage {
        self.conversations.get(user_id).map_or(Stage::Initial, |c| c.stage)
    }

    pub fn reset(&mut self, user_id: &str) -> bool {
        self.conversations.remove(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn count_in(&self, stage: Stage) -> usize {
        self.conversations.values().filter(|c| c.stage == stage).count()
    }

    /// Most recently active first.
    pub fn snapshots(&self) -> Vec<ConversationSnapshot> {
        let mut snapshots: Vec<ConversationSnapshot> = self
            .conversations
            .iter()
            .map(|(user_id, c)| ConversationSnapshot {
                user_id: user_id.clone(),
                stage: c.stage,
                details: c.details.clone(),
                quote_total_cents: c.quote.as_ref().map(|q| q.total_cents),
                updated_at: c.updated_at,
            })
            .collect();
        snapshots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> DetailExtractor {
        DetailExtractor::new().unwrap()
    }

    #[test]
    fn test_extract_full_request() {
        let d = extractor().extract("Quero uma tatuagem de leão no antebraço, uns 15cm, realismo");
        assert_eq!(d.idea.as_deref(), Some("leão"));
        assert_eq!(d.size_cm, Some(15));
        assert_eq!(d.size, Some(SizeClass::Medium));
        assert_eq!(d.body_location.as_deref(), Some("antebraço"));
        assert_eq!(d.style.as_deref(), Some("realismo"));
        assert!(!d.colored);
    }

    #[test]
    fn test_extract_size_words_and_color() {
        let d = extractor().extract("uma pequena, colorida, na costela");
        assert_eq!(d.size, Some(SizeClass::Small));
        assert_eq!(d.size_cm, None);
        assert_eq!(d.body_location.as_deref(), Some("costela"));
        assert!(d.colored);

        let d = extractor().extract("grande, preto e branco, sem cores");
        assert_eq!(d.size, Some(SizeClass::Large));
        assert!(!d.colored);
    }

    #[test]
    fn test_location_is_whole_word() {
        assert_eq!(extractor().extract("no peito").body_location.as_deref(), Some("peito"));
        assert_eq!(extractor().extract("no pé direito").body_location.as_deref(), Some("pé"));
        assert_eq!(extractor().extract("braço esquerdo").body_location.as_deref(), Some("braço"));
        assert!(extractor().extract("perto de casa").body_location.is_none());
    }

    #[test]
    fn test_style_phrases() {
        assert_eq!(extractor().extract("estilo fine line").style.as_deref(), Some("fineline"));
        assert_eq!(extractor().extract("neo tradicional").style.as_deref(), Some("neotradicional"));
        assert_eq!(extractor().extract("tradicional").style.as_deref(), Some("tradicional"));
    }

    #[test]
    fn test_idea_stops_at_location() {
        let d = extractor().extract("tatuagem de uma rosa com espinhos no braço");
        assert_eq!(d.idea.as_deref(), Some("uma rosa"));
        let d = extractor().extract("Tattoo do símbolo do infinito");
        assert_eq!(d.idea.as_deref(), Some("símbolo do infinito"));
    }

    #[test]
    fn test_nothing_extracted() {
        assert!(extractor().extract("hmm não sei ainda").is_empty());
    }

    #[test]
    fn test_merge_prefers_newer() {
        let mut d = TattooDetails { size_cm: Some(8), size: Some(SizeClass::Small), ..Default::default() };
        d.merge(TattooDetails { size: Some(SizeClass::Large), ..Default::default() });
        assert_eq!(d.size, Some(SizeClass::Large));
        assert_eq!(d.size_cm, None);
        d.merge(TattooDetails { body_location: Some("nuca".into()), ..Default::default() });
        assert_eq!(d.size, Some(SizeClass::Large));
        assert_eq!(d.missing(), vec!["a ideia do desenho"]);
    }

    #[test]
    fn test_absorb_completes_with_quote() {
        let prices = PriceTable::default();
        let mut c = Conversation::new(Utc::now());
        c.start_collecting();
        assert!(c.absorb(extractor().extract("tatuagem de lobo"), &prices).is_none());
        assert_eq!(c.stage, Stage::CollectingInfo);

        let quote = c.absorb(extractor().extract("10 cm na nuca"), &prices).unwrap();
        assert_eq!(c.stage, Stage::Completed);
        assert_eq!(quote.total_cents, 20_000 + 5_000);
    }

    #[test]
    fn test_tracker_resets_idle_conversations() {
        let mut tracker = ConversationTracker::default();
        let t0 = Utc::now();
        tracker.touch("u1", t0).start_collecting();
        assert_eq!(tracker.stage("u1"), Stage::CollectingInfo);

        tracker.touch("u1", t0 + Duration::hours(23));
        assert_eq!(tracker.stage("u1"), Stage::CollectingInfo);

        let c = tracker.touch("u1", t0 + Duration::hours(48));
        assert_eq!(c.stage, Stage::Initial);
    }

    #[test]
    fn test_tracker_snapshots_and_reset() {
        let mut tracker = ConversationTracker::default();
        let t0 = Utc::now();
        tracker.touch("old", t0);
        tracker.touch("new", t0 + Duration::minutes(1)).start_collecting();

        let snaps = tracker.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].user_id, "new");
        assert_eq!(tracker.count_in(Stage::CollectingInfo), 1);

        assert!(tracker.reset("old"));
        assert!(!tracker.reset("old"));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.stage("old"), Stage::Initial);
    }

    #[test]
    fn test_tracker_drops_stale_conversations() {
        let mut tracker = ConversationTracker::default();
        let t0 = Utc::now();
        for i in 0..50 {
            tracker.touch(&format!("5511900000{i:03}"), t0).start_collecting();
        }
        tracker.touch("recent", t0 + Duration::hours(20));
        assert_eq!(tracker.len(), 51);

        tracker.touch("late", t0 + Duration::hours(30));
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.count_in(Stage::CollectingInfo), 0);
        assert!(tracker.snapshots().iter().all(|s| s.user_id == "recent" || s.user_id == "late"));

        assert_eq!(tracker.prune(t0 + Duration::hours(45)), 1);
        assert_eq!(tracker.stage("late"), Stage::Initial);
        assert_eq!(tracker.len(), 1);
    }
}
