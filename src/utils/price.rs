use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

fn price_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d.,]*").expect("price token regex"))
}

fn comma_grouping_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}(?:,\d{3})+$").expect("comma grouping regex"))
}

/// Extract a price from scraped text.
///
/// The first number-looking token wins, so ranges like `$19.99 – $29.99`
/// resolve to the lower bound. Anything that does not parse maps to zero.
pub fn extract_price(text: &str) -> Decimal {
    let Some(token) = price_token_regex().find(text) else {
        return Decimal::ZERO;
    };

    let token = token.as_str().trim_end_matches(['.', ',']);
    Decimal::from_str(&normalize_separators(token)).unwrap_or(Decimal::ZERO)
}

/// Same as [`extract_price`] for optional text.
pub fn extract_price_opt(text: Option<&str>) -> Decimal {
    text.map(extract_price).unwrap_or(Decimal::ZERO)
}

fn normalize_separators(token: &str) -> String {
    match (token.rfind(','), token.rfind('.')) {
        // Whichever separator comes last is the decimal point
        (Some(comma), Some(dot)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(_), None) => {
            if comma_grouping_regex().is_match(token) {
                token.replace(',', "")
            } else {
                token.replace(',', ".")
            }
        }
        (None, Some(_)) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    }
}

/// Resolve a listing link against the source's domain.
///
/// Relative hrefs are joined onto `domain`, absolute ones are kept, and a
/// missing href falls back to the domain itself.
pub fn absolute_url(domain: &Url, href: Option<&str>) -> String {
    match href.map(str::trim).filter(|h| !h.is_empty()) {
        Some(href) => domain
            .join(href)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| domain.to_string()),
        None => domain.to_string(),
    }
}
