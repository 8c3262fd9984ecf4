use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LawyerId(pub String);

impl LawyerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lawyer {
    pub id: LawyerId,
    pub name: String,
    pub phone: Option<String>,
    pub active: bool,
    pub daily_load: u32,
    pub last_assigned_at: Option<String>,
}

impl Lawyer {
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            format!("Abogada {}", self.id.0)
        } else {
            name.to_string()
        }
    }

    /// `https://wa.me/<digits>` when the roster carries a phone number.
    pub fn contact_link(&self) -> Option<String> {
        let digits: String =
            self.phone.as_deref()?.chars().filter(|ch| ch.is_ascii_digit()).collect();
        (!digits.is_empty()).then(|| format!("https://wa.me/{digits}"))
    }
}

/// A missing flag means active; `0`, `NO`, `FALSE` and blank mean inactive.
pub fn parse_active_flag(flag: Option<&str>) -> bool {
    match flag {
        None => true,
        Some(value) => {
            !matches!(value.trim().to_ascii_uppercase().as_str(), "" | "0" | "NO" | "FALSE")
        }
    }
}

/// Loads are stored as free text; anything unparsable counts as zero.
pub fn parse_load(raw: &str) -> u32 {
    let trimmed = raw.trim();
    trimmed
        .parse::<u32>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().filter(|value| *value >= 0.0).map(|v| v as u32))
        .unwrap_or(0)
}
