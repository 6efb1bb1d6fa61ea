//! Address normalization for free-text Brazilian addresses.
//!
//! Residential addresses arrive with diacritics and unit qualifiers that
//! hurt exact-match geocoding:
//! - Accents: `"Avenida São João"`
//! - Apartment qualifiers: `"Rua X, 10, Apt. 42, Centro"`
//! - Block/tower qualifiers: `"Bloco 2"`, `"Torre 3"`
//! - Stray punctuation and parenthesized notes
//!
//! This module reduces them to an uppercase ASCII form that keeps the
//! street/number/neighborhood content the geocoder matches on.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Regex for any character that is not a word character, whitespace,
/// comma, period, or hyphen.
static NON_ADDRESS_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s,.-]").expect("valid regex"));

/// Regex for runs of whitespace.
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Unit qualifiers to drop, each consuming up to the next comma or end of
/// string: `APT`/`APT.` + number, `BLOCO` + number, `TORRE` + number, and
/// parenthesized spans.
static QUALIFIER_RES: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)APT\.?\s*\d+[^,]*").expect("valid regex"),
        Regex::new(r"(?i)BLOCO\s*\d+[^,]*").expect("valid regex"),
        Regex::new(r"(?i)TORRE\s*\d+[^,]*").expect("valid regex"),
        Regex::new(r"\([^)]*\)").expect("valid regex"),
    ]
});

/// Regex for doubled commas left behind by qualifier removal.
static DOUBLE_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*,").expect("valid regex"));

/// Regex for a leading or trailing comma.
static EDGE_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*,|,\s*$").expect("valid regex"));

/// Normalizes a free-text address into a canonical, geocoder-friendly form.
///
/// In order: NFKD-decompose and keep only ASCII (dropping combining marks
/// and anything with no ASCII equivalent), uppercase, fold punctuation
/// other than `, . -` into spaces, collapse whitespace, strip unit
/// qualifiers, and clean up the commas the stripping leaves behind.
///
/// Pure and infallible; garbage input degrades to an empty string. The
/// result never exceeds the input length and applying the function twice
/// yields the same output as applying it once.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let ascii: String = raw.nfkd().filter(char::is_ascii).collect();
    let upper = ascii.to_uppercase();

    let txt = NON_ADDRESS_CHAR_RE.replace_all(&upper, " ");
    let txt = WHITESPACE_RE.replace_all(&txt, " ");

    let mut txt = txt.into_owned();
    for re in QUALIFIER_RES.iter() {
        txt = re.replace_all(&txt, "").into_owned();
    }

    let txt = DOUBLE_COMMA_RE.replace_all(&txt, ",");
    let txt = EDGE_COMMA_RE.replace_all(&txt, "");
    let txt = WHITESPACE_RE.replace_all(&txt, " ");
    txt.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics() {
        assert_eq!(
            normalize("Avenida São João, 100"),
            "AVENIDA SAO JOAO, 100"
        );
    }

    #[test]
    fn uppercases() {
        assert_eq!(normalize("rua das flores, 25"), "RUA DAS FLORES, 25");
    }

    #[test]
    fn removes_apartment_qualifier() {
        assert_eq!(
            normalize("Rua das Flores, 25, Apt. 101, Jardim América"),
            "RUA DAS FLORES, 25, JARDIM AMERICA"
        );
    }

    #[test]
    fn removes_apartment_qualifier_without_dot() {
        assert_eq!(
            normalize("Rua das Flores, 25, APT 101 fundos, Centro"),
            "RUA DAS FLORES, 25, CENTRO"
        );
    }

    #[test]
    fn removes_bloco_qualifier() {
        assert_eq!(
            normalize("Av Paulista, 900, Bloco 2, Bela Vista"),
            "AV PAULISTA, 900, BELA VISTA"
        );
    }

    #[test]
    fn removes_torre_qualifier_up_to_comma() {
        assert_eq!(
            normalize("R. Teste, Torre 3 apto 31, Centro"),
            "R. TESTE, CENTRO"
        );
    }

    #[test]
    fn folds_symbols_into_spaces() {
        assert_eq!(normalize("Rua A & B, 10"), "RUA A B, 10");
    }

    #[test]
    fn strips_leading_comma_left_by_qualifier() {
        assert_eq!(normalize("Apt 5, Rua X"), "RUA X");
    }

    #[test]
    fn keeps_commas_periods_and_hyphens() {
        assert_eq!(
            normalize("R. Sete de Setembro, 71 - Centro"),
            "R. SETE DE SETEMBRO, 71 - CENTRO"
        );
    }

    #[test]
    fn garbage_degrades_to_empty() {
        assert_eq!(normalize("§†"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "Avenida São João, 100",
            "Rua das Flores, 25, Apt. 101, Jardim América",
            "Av Paulista, 900, Bloco 2, Bela Vista",
            "R. Teste, Torre 3 apto 31, Centro",
            "Rua A & B, 10",
            "  ,, weird ,, input ,,  ",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn never_increases_length() {
        let inputs = [
            "Avenida São João, 100",
            "Rua das Flores, 25, Apt. 101, Jardim América",
            "Rua A & B, 10 (fundos)",
        ];
        for input in inputs {
            assert!(normalize(input).len() <= input.len());
        }
    }

    #[test]
    fn output_is_ascii_uppercase_without_stray_commas() {
        let out = normalize("Rua São João, Apt. 12, (obs) Centro, SP");
        assert!(out.is_ascii());
        assert_eq!(out, out.to_uppercase());
        assert!(!out.contains(",,"));
        assert!(!out.starts_with(','));
        assert!(!out.ends_with(','));
    }
}
