//! Item identifier detection in free text and generated SQL.
//!
//! Cheap pattern heuristics, no NLP model. Missing an identifier is fine;
//! false positives are kept down by the minimum length and the stop words.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator-joined alphanumeric tokens, e.g. `AB-123`, `PUMP_200_X`.
static ITEM_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z0-9]{2,12}(?:[-_][A-Z0-9]{1,12})+)\b").expect("valid item token regex")
});

/// `item_no = '...'`, `item_no LIKE '...'`, `item_no ILIKE '...'`.
static SQL_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bitem_no\s*(?:=|I?LIKE)\s*'([^']+)'").expect("valid sql item regex")
});

const MIN_TOKEN_LEN: usize = 4;

const STOP_WORDS: &[&str] = &["THE", "AND", "COMPANY", "LIMITED", "LTD", "INC", "LLC"];

/// Pull the first probable item identifier out of user text.
///
/// Returned uppercased.
pub fn extract_from_text(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let upper = text.to_uppercase();

    ITEM_TOKEN_RE
        .captures_iter(&upper)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(token))
        .find(|token| token.chars().any(|c| c.is_ascii_digit()) || token.contains('-'))
        .map(str::to_string)
}

/// Pull the item literal the generated SQL actually filtered on.
///
/// Wildcards are stripped so `'%ab-123%'` yields `AB-123`.
pub fn extract_from_sql(sql: &str) -> Option<String> {
    let caps = SQL_ITEM_RE.captures(sql)?;
    let literal = caps.get(1)?.as_str().replace('%', "");
    let literal = literal.trim().to_uppercase();
    if literal.is_empty() {
        None
    } else {
        Some(literal)
    }
}
