//! Tattoo price calculator: base price by size plus fixed surcharges.

use serde::{Deserialize, Serialize};

use crate::text::{fold, format_brl};

/// Body locations that take longer to tattoo and carry a surcharge.
const HARD_LOCATIONS: &[&str] = &["costela", "mao", "pe", "pescoco", "dedo", "nuca"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    /// Up to 10 cm is small, up to 20 cm medium, anything bigger large.
    pub fn from_cm(cm: u32) -> Self {
        match cm {
            0..=10 => Self::Small,
            11..=20 => Self::Medium,
            _ => Self::Large,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "pequena",
            Self::Medium => "média",
            Self::Large => "grande",
        }
    }
}

/// Prices in cents. Every field can be overridden from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub small_cents: i64,
    pub medium_cents: i64,
    pub large_cents: i64,
    pub realism_surcharge_cents: i64,
    pub color_surcharge_cents: i64,
    pub hard_location_surcharge_cents: i64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            small_cents: 20_000,
            medium_cents: 40_000,
            large_cents: 80_000,
            realism_surcharge_cents: 20_000,
            color_surcharge_cents: 10_000,
            hard_location_surcharge_cents: 5_000,
        }
    }
}

impl PriceTable {
    pub fn base_for(&self, size: SizeClass) -> i64 {
        match size {
            SizeClass::Small => self.small_cents,
            SizeClass::Medium => self.medium_cents,
            SizeClass::Large => self.large_cents,
        }
    }
}

/// What the calculator needs to know about a tattoo.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteRequest {
    /// Explicit size class; wins over `size_cm` when both are given.
    #[serde(default)]
    pub size: Option<SizeClass>,
    #[serde(default)]
    pub size_cm: Option<u32>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub body_location: Option<String>,
    #[serde(default)]
    pub colored: bool,
}

impl QuoteRequest {
    fn size_class(&self) -> Option<SizeClass> {
        self.size.or_else(|| self.size_cm.map(SizeClass::from_cm))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteLine {
    pub label: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub size: SizeClass,
    pub base_cents: i64,
    pub surcharges: Vec<QuoteLine>,
    pub total_cents: i64,
}

impl Quote {
    /// Human-readable breakdown, one line per item.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!(
            "Tamanho {}: {}",
            self.size.label(),
            format_brl(self.base_cents)
        )];
        for line in &self.surcharges {
            lines.push(format!("{}: + {}", line.label, format_brl(line.amount_cents)));
        }
        lines.push(format!("Total estimado: {}", format_brl(self.total_cents)));
        lines.join("\n")
    }
}

pub fn is_hard_location(location: &str) -> bool {
    let folded = fold(location);
    folded
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| HARD_LOCATIONS.contains(&word))
}

/// Compute a quote. Returns `None` when the size is unknown.
pub fn quote(table: &PriceTable, request: &QuoteRequest) -> Option<Quote> {
    let size = request.size_class()?;
    let base_cents = table.base_for(size);
    let mut surcharges = Vec::new();

    let style = request.style.as_deref().map(fold).unwrap_or_default();
    if style.contains("realismo") {
        surcharges.push(QuoteLine {
            label: "Realismo".to_string(),
            amount_cents: table.realism_surcharge_cents,
        });
    }
    if request.colored || style.contains("aquarela") {
        surcharges.push(QuoteLine {
            label: "Colorida".to_string(),
            amount_cents: table.color_surcharge_cents,
        });
    }
    if let Some(location) = request.body_location.as_deref()
        && is_hard_location(location)
    {
        surcharges.push(QuoteLine {
            label: format!("Região ({location})"),
            amount_cents: table.hard_location_surcharge_cents,
        });
    }

    let total_cents = base_cents + surcharges.iter().map(|l| l.amount_cents).sum::<i64>();
    Some(Quote { size, base_cents, surcharges, total_cents })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size_cm: u32, style: Option<&str>, location: Option<&str>) -> QuoteRequest {
        QuoteRequest {
            size: None,
            size_cm: Some(size_cm),
            style: style.map(str::to_string),
            body_location: location.map(str::to_string),
            colored: false,
        }
    }

    #[test]
    fn test_size_classes() {
        assert_eq!(SizeClass::from_cm(5), SizeClass::Small);
        assert_eq!(SizeClass::from_cm(10), SizeClass::Small);
        assert_eq!(SizeClass::from_cm(11), SizeClass::Medium);
        assert_eq!(SizeClass::from_cm(20), SizeClass::Medium);
        assert_eq!(SizeClass::from_cm(35), SizeClass::Large);
    }

    #[test]
    fn test_plain_quote_is_base_price() {
        let q = quote(&PriceTable::default(), &request(8, Some("fineline"), Some("braço"))).unwrap();
        assert_eq!(q.base_cents, 20_000);
        assert!(q.surcharges.is_empty());
        assert_eq!(q.total_cents, 20_000);
    }

    #[test]
    fn test_realism_adds_fixed_surcharge() {
        let table = PriceTable::default();
        let plain = quote(&table, &request(15, Some("blackwork"), Some("braço"))).unwrap();
        let realism = quote(&table, &request(15, Some("Realismo preto e cinza"), Some("braço"))).unwrap();
        assert_eq!(realism.total_cents - plain.total_cents, table.realism_surcharge_cents);
    }

    #[test]
    fn test_all_surcharges_stack() {
        let mut req = request(25, Some("realismo"), Some("costela"));
        req.colored = true;
        let q = quote(&PriceTable::default(), &req).unwrap();
        assert_eq!(q.surcharges.len(), 3);
        assert_eq!(q.total_cents, 80_000 + 20_000 + 10_000 + 5_000);
    }

    #[test]
    fn test_watercolor_counts_as_colored() {
        let q = quote(&PriceTable::default(), &request(5, Some("aquarela"), None)).unwrap();
        assert_eq!(q.total_cents, 30_000);
    }

    #[test]
    fn test_hard_location_matches_whole_words() {
        assert!(is_hard_location("Mão"));
        assert!(is_hard_location("lateral do pescoço"));
        assert!(!is_hard_location("perna"));
        // "pe" must not match inside "peito"
        assert!(!is_hard_location("peito"));
    }

    #[test]
    fn test_explicit_size_wins() {
        let req = QuoteRequest { size: Some(SizeClass::Large), size_cm: Some(3), ..Default::default() };
        assert_eq!(quote(&PriceTable::default(), &req).unwrap().size, SizeClass::Large);
    }

    #[test]
    fn test_unknown_size_has_no_quote() {
        assert!(quote(&PriceTable::default(), &QuoteRequest::default()).is_none());
    }

    #[test]
    fn test_describe_lists_total() {
        let q = quote(&PriceTable::default(), &request(15, Some("realismo"), None)).unwrap();
        let text = q.describe();
        assert!(text.contains("Tamanho média: R$ 400,00"));
        assert!(text.contains("Realismo: + R$ 200,00"));
        assert!(text.contains("Total estimado: R$ 600,00"));
    }
}
