// 🔤 Name Normalizer - Canonical join keys
// "José  da Silva " → "JOSE DA SILVA"

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a free-text name for matching.
///
/// Uppercases, strips accents (NFD + combining marks removed, plus a few
/// letters that have no canonical decomposition), trims and collapses every
/// whitespace run to a single space. Idempotent. Empty input gives "".
pub fn normalize(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_uppercase)
        // Uppercasing can yield precomposed or mark-bearing characters again
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match transliterate(c) {
            Some(ascii) => out.push_str(ascii),
            None => out.push(c),
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `None` (a missing cell) normalizes to the empty string
pub fn normalize_opt(name: Option<&str>) -> String {
    name.map(normalize).unwrap_or_default()
}

/// Letters that survive NFD unchanged but have an obvious ASCII spelling
fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        'Æ' => "AE",
        'Œ' => "OE",
        'Ø' => "O",
        'Đ' | 'Ð' => "D",
        'Ł' => "L",
        'Þ' => "TH",
        'ß' | 'ẞ' => "SS",
        'ı' => "I",
        'ƒ' => "F",
        _ => return None,
    };
    Some(ascii)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accented_and_plain_converge() {
        assert_eq!(normalize("José Da Silva"), "JOSE DA SILVA");
        assert_eq!(normalize("JOSE DA SILVA "), "JOSE DA SILVA");
        assert_eq!(normalize("  joão   pedro\tcoutinho "), "JOAO PEDRO COUTINHO");
    }

    #[test]
    fn test_single_accented_letter() {
        assert_eq!(normalize("É"), "E");
        assert_eq!(normalize("é"), "E");
        assert_eq!(normalize("ç"), "C");
        assert_eq!(normalize("Ñ"), "N");
    }

    #[test]
    fn test_decomposed_input() {
        // "e" + combining acute
        assert_eq!(normalize("Jose\u{301}"), "JOSE");
    }

    #[test]
    fn test_letters_without_decomposition() {
        assert_eq!(normalize("Strauß"), "STRAUSS");
        assert_eq!(normalize("Søren Ærø"), "SOREN AERO");
        assert_eq!(normalize("Łukasz"), "LUKASZ");
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n "), "");
        assert_eq!(normalize_opt(None), "");
        assert_eq!(normalize_opt(Some(" ana ")), "ANA");
    }

    #[test]
    fn test_non_breaking_space_collapses() {
        assert_eq!(normalize("ANA\u{a0}\u{a0}MARIA"), "ANA MARIA");
    }

    #[test]
    fn test_idempotent_on_samples() {
        for name in [
            "José Da Silva",
            "Strauß",
            "Gonçalves  d'Ávila",
            "ÆØÅ æøå",
            "Ǆ ǅ ǆ",
            "ŉ",
            "",
        ] {
            let once = normalize(name);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", name);
        }
    }
}
