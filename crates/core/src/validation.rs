use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::text::is_money;

const REGEX_PREFIX: &str = "REGEX:";
const MONEY_RULE: &str = "MONEY";

/// Per-step answer check, parsed from the rule cell of the step table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationRule {
    Always,
    Money,
    Regex(String),
    Unknown(String),
}

impl ValidationRule {
    pub fn parse(raw: &str) -> Self {
        let rule = raw.trim();
        if rule.is_empty() {
            return Self::Always;
        }
        if rule.eq_ignore_ascii_case(MONEY_RULE) {
            return Self::Money;
        }
        if let Some(pattern) = rule.strip_prefix(REGEX_PREFIX) {
            return Self::Regex(pattern.trim().to_string());
        }
        Self::Unknown(rule.to_string())
    }

    pub fn as_str(&self) -> String {
        match self {
            Self::Always => String::new(),
            Self::Money => MONEY_RULE.to_string(),
            Self::Regex(pattern) => format!("{REGEX_PREFIX}{pattern}"),
            Self::Unknown(raw) => raw.clone(),
        }
    }

    pub fn is_valid(&self, text: &str) -> bool {
        match self {
            Self::Always | Self::Unknown(_) => true,
            Self::Money => is_money(text),
            Self::Regex(pattern) => match compiled(pattern) {
                Some(regex) => regex.is_match(text.trim()),
                None => true,
            },
        }
    }
}

fn regex_cache() -> &'static Mutex<HashMap<String, Option<Regex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Option<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

// `None` marks a pattern that failed to compile; such rules accept everything.
fn compiled(pattern: &str) -> Option<Regex> {
    let mut cache = match regex_cache().lock() {
        Ok(cache) => cache,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(entry) = cache.get(pattern) {
        return entry.clone();
    }

    let anchored = format!("^(?:{pattern})$");
    let entry = match Regex::new(&anchored) {
        Ok(regex) => Some(regex),
        Err(error) => {
            warn!(
                event_name = "core.validation.regex_invalid",
                pattern,
                error = %error,
                "validation pattern does not compile; accepting input"
            );
            None
        }
    };
    cache.insert(pattern.to_string(), entry.clone());
    entry
}
