//! Text helpers shared by the dialogue and the worker: inbound message
//! normalization, money parsing, prompt rendering and lead source detection.

use std::str::FromStr;

use rust_decimal::Decimal;
use unicode_normalization::UnicodeNormalization;

const MONEY_MAX_INTEGER_DIGITS: usize = 12;
const MONEY_MAX_FRACTION_DIGITS: usize = 2;

/// NFKC-normalizes, drops control characters and collapses whitespace runs.
pub fn normalize_message(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.nfkc() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if ch.is_control() || is_format_char(ch) {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}

// Zero-width and bidi marks that WhatsApp clients like to inject.
fn is_format_char(ch: char) -> bool {
    matches!(ch, '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}')
}

/// Option answers are reduced to their first ASCII digit; text without digits is kept.
pub fn normalize_option(raw: &str) -> String {
    let normalized = normalize_message(raw);
    match normalized.chars().find(char::is_ascii_digit) {
        Some(digit) => digit.to_string(),
        None => normalized,
    }
}

fn strip_money_decorations(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let without_currency = upper.strip_suffix("MXN").unwrap_or(&upper);
    without_currency.chars().filter(|ch| !matches!(ch, '$' | ',') && !ch.is_whitespace()).collect()
}

fn is_plain_amount(candidate: &str) -> bool {
    let (integer, fraction) = match candidate.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (candidate, None),
    };
    let integer_ok = (1..=MONEY_MAX_INTEGER_DIGITS).contains(&integer.len())
        && integer.chars().all(|ch| ch.is_ascii_digit());
    let fraction_ok = fraction.map_or(true, |fraction| {
        (1..=MONEY_MAX_FRACTION_DIGITS).contains(&fraction.len())
            && fraction.chars().all(|ch| ch.is_ascii_digit())
    });
    integer_ok && fraction_ok
}

/// Whether `raw` reads as an amount such as `$15,000`, `15000.50` or `20 000 MXN`.
pub fn is_money(raw: &str) -> bool {
    is_plain_amount(&strip_money_decorations(raw))
}

pub fn parse_money(raw: &str) -> Option<Decimal> {
    let candidate = strip_money_decorations(raw);
    if !is_plain_amount(&candidate) {
        return None;
    }
    Decimal::from_str(&candidate).ok()
}

/// Turns escaped line breaks stored in the sheet into real ones.
pub fn render_prompt(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(trimmed);
    unquoted
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .trim()
        .to_string()
}

/// Replaces `{Column}` placeholders the lookup knows about; others are left untouched.
pub fn fill_template<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after_open[..close];
        let valid_key = !key.is_empty() && !key.contains('{') && !key.contains(char::is_whitespace);
        match valid_key.then(|| lookup(key)).flatten() {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Strips the channel prefix and keeps the digits of a sender address.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_channel = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed);
    without_channel.chars().filter(char::is_ascii_digit).collect()
}

pub const SOURCE_FACEBOOK: &str = "FACEBOOK";
pub const SOURCE_WEB: &str = "WEB";
pub const SOURCE_INSTAGRAM: &str = "INSTAGRAM";
pub const SOURCE_UNKNOWN: &str = "DESCONOCIDA";

/// Guesses the acquisition channel from the first message of a conversation.
pub fn detect_lead_source(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    let words: Vec<&str> =
        lowered.split(|ch: char| !ch.is_alphanumeric()).filter(|word| !word.is_empty()).collect();
    let has_word = |needle: &str| words.iter().any(|word| *word == needle);

    if lowered.contains("facebook") || lowered.contains("anuncio") || has_word("fb") {
        SOURCE_FACEBOOK
    } else if lowered.contains("sitio")
        || lowered.contains("web")
        || lowered.contains("pagina")
        || lowered.contains("página")
    {
        SOURCE_WEB
    } else if lowered.contains("instagram") || has_word("ig") {
        SOURCE_INSTAGRAM
    } else {
        SOURCE_UNKNOWN
    }
}

/// Capitalized first name for greetings, `Hola` when unknown.
pub fn greeting_name(first_name: &str) -> String {
    let trimmed = first_name.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Hola".to_string(),
    }
}

/// Formats an amount with two decimals and thousands separators, e.g. `125,095.89`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, ch) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{grouped}.{fraction}", if negative { "-" } else { "" })
}
