//! Text helpers shared by the bot and the pricing table.

/// Lowercase and strip Portuguese diacritics so keyword matching works
/// regardless of how the customer typed "preço" / "preco".
pub fn fold(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        };
        result.push(folded);
    }
    result
}

/// Keep only ASCII digits, e.g. "+55 (11) 98765-4321" -> "5511987654321".
pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}...")
}

/// Format cents as Brazilian reais: 123456 -> "R$ 1.234,56".
pub fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let reais = (cents / 100).to_string();
    let mut grouped = String::with_capacity(reais.len() + reais.len() / 3);
    for (i, c) in reais.chars().enumerate() {
        if i > 0 && (reais.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{sign}R$ {grouped},{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents() {
        assert_eq!(fold("Preço do ANTEBRAÇO"), "preco do antebraco");
        assert_eq!(fold("Pescoço, mão e pé"), "pescoco, mao e pe");
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("+55 (11) 98765-4321"), "5511987654321");
        assert_eq!(digits_only("abc"), "");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("ação", 2), "aç...");
        assert_eq!(preview("ok", 10), "ok");
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(format_brl(0), "R$ 0,00");
        assert_eq!(format_brl(20000), "R$ 200,00");
        assert_eq!(format_brl(123456), "R$ 1.234,56");
        assert_eq!(format_brl(100000000), "R$ 1.000.000,00");
        assert_eq!(format_brl(-550), "-R$ 5,50");
    }
}
