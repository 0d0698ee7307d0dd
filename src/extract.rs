use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::debug;

// signed decimal immediately followed by a percent sign, the sign is optional
static RETURN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([+-]?[0-9]+\.[0-9]+)%").expect("valid return pattern"));

static HIDDEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>")
        .expect("valid hidden content pattern")
});

// a bare `<` followed by a space or digit is text, not a tag
static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z/!?][^>]*>").expect("valid tag pattern"));

// numeric references and the legacy named ones may omit the semicolon
static ENTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|amp|lt|gt|quot|nbsp);?|([a-zA-Z]+);)")
        .expect("valid entity pattern")
});

/// Returns the first signed percentage figure found in `text`, scanning left
/// to right, or `None` when the text has no such figure.
///
/// Figures that do not fit a `Decimal` (about 28 significant digits) are
/// skipped and the scan moves on to the next one.
pub fn find_return(text: &str) -> Option<Decimal> {
    RETURN_PATTERN.captures_iter(text).find_map(|captures| {
        let value = captures.get(1)?.as_str();
        match Decimal::from_str(value.trim_start_matches('+')) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!("Could not parse return {} : {}", value, err);
                None
            }
        }
    })
}

/// Extracts the day's return from a document's text.
///
/// A document without any percentage figure yields `0`. This is a weak
/// signal: a page that changed layout is indistinguishable from a flat day.
/// Use [`find_return`] to tell the two apart.
pub fn extract_return(document_text: &str) -> Decimal {
    find_return(document_text).unwrap_or(Decimal::ZERO)
}

/// Reduces an HTML document to the text a reader would see.
///
/// Entities are decoded with or without the trailing `;` for numeric
/// references and `amp`, `lt`, `gt`, `quot`, `nbsp`. Other named entities
/// need the `;`.
pub fn visible_text(html: &str) -> String {
    let without_hidden = HIDDEN_PATTERN.replace_all(html, "");
    let without_tags = TAG_PATTERN.replace_all(&without_hidden, "");
    ENTITY_PATTERN
        .replace_all(&without_tags, |caps: &Captures| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .and_then(|entity| decode_entity(entity.as_str()))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<String> {
    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "percnt" => '%',
        "plus" => '+',
        "minus" => '\u{2212}',
        numeric if numeric.starts_with("#x") || numeric.starts_with("#X") => {
            char::from_u32(u32::from_str_radix(&numeric[2..], 16).ok()?)?
        }
        numeric if numeric.starts_with('#') => char::from_u32(numeric[1..].parse().ok()?)?,
        _ => return None,
    };
    Some(c.to_string())
}
