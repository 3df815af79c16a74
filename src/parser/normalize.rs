use std::sync::LazyLock;

use regex::Regex;

use crate::model::PriceTrend;

static RESULT_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+) results? returned").unwrap());

/// Phrases shown instead of a listing when the search has nothing to offer.
const NO_OFFERS_SENTINELS: &[&str] = &["No nonstop flights found", "No flights found"];

/// Boilerplate lines interleaved with the listing. Matched as prefixes.
const NOISE_PREFIXES: &[&str] = &[
    "Price insights",
    "Prices are currently",
    "View price history",
    "The cheapest time to book",
    "Avoids as much CO2",
    "Other flights",
];

const TREND_PREFIX: &str = "Prices are currently";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Tokens(Vec<String>),
    NoOffersFound,
}

/// Clean every raw line and drop the ones that carry no offer data.
pub fn normalize(raw: &[String]) -> Normalized {
    let cleaned: Vec<String> = raw.iter().map(|t| clean_token(t)).collect();

    if cleaned
        .iter()
        .any(|t| NO_OFFERS_SENTINELS.iter().any(|s| t.contains(s)))
    {
        return Normalized::NoOffersFound;
    }

    Normalized::Tokens(cleaned.into_iter().filter(|t| !is_noise(t)).collect())
}

/// ASCII-only, trimmed. Non-ASCII glyphs (narrow spaces, dashes between
/// airport codes, currency signs) are dropped, which glues `10:30 AM` into
/// `10:30AM` and `MUC–FCO` into `MUCFCO`.
pub fn clean_token(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_noise(token: &str) -> bool {
    token.is_empty() || NOISE_PREFIXES.iter().any(|p| token.starts_with(p))
}

/// The price-trend banner, read before noise removal drops it.
pub fn find_price_trend(raw: &[String]) -> PriceTrend {
    let fragment = raw
        .iter()
        .map(|t| clean_token(t))
        .find(|t| t.starts_with(TREND_PREFIX));
    PriceTrend::from_fragment(fragment.as_deref())
}

/// "12 results returned." as announced by the page, if present.
pub fn expected_result_count(tokens: &[String]) -> Option<usize> {
    tokens
        .iter()
        .find_map(|t| RESULT_COUNT_RE.captures(t))
        .and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Trend;

    fn toks(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strips_non_ascii_and_trims() {
        assert_eq!(clean_token(" 10:30\u{202f}AM "), "10:30AM");
        assert_eq!(clean_token("MUC\u{2013}FCO"), "MUCFCO");
        assert_eq!(clean_token("\u{20ac}129"), "129");
    }

    #[test]
    fn drops_empty_and_boilerplate() {
        let raw = toks(&[
            "Sort by:",
            " ",
            "",
            "Price insights",
            "Prices are currently typical",
            "View price history",
            "10:30AM",
            "Avoids as much CO2 as 120 trees",
            "Other flights",
        ]);
        assert_eq!(
            normalize(&raw),
            Normalized::Tokens(toks(&["Sort by:", "10:30AM"]))
        );
    }

    #[test]
    fn sentinel_anywhere() {
        let raw = toks(&["Sort by:", "10:30AM", "No nonstop flights found for these dates"]);
        assert_eq!(normalize(&raw), Normalized::NoOffersFound);
    }

    #[test]
    fn price_trend_from_raw() {
        let raw = toks(&["Search", "Prices are currently high", "Sort by:"]);
        assert_eq!(find_price_trend(&raw).trend, Trend::High);
        assert_eq!(find_price_trend(&toks(&["Sort by:"])).trend, Trend::Unknown);
    }

    #[test]
    fn result_count() {
        let t = toks(&["Sort by:", "12 results returned.", "10:30AM"]);
        assert_eq!(expected_result_count(&t), Some(12));
        assert_eq!(expected_result_count(&toks(&["1 result returned."])), Some(1));
        assert_eq!(expected_result_count(&toks(&["Sort by:"])), None);
    }
}
