use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadField;
use crate::validation::ValidationRule;

/// Number of numbered transition targets a step can carry.
pub const MAX_TRANSITIONS: usize = 9;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
    FreeText,
    Option,
    Money,
    Number,
    Date,
    Other(String),
}

impl InputType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "FREE_TEXT" | "TEXTO" | "TEXT" => Self::FreeText,
            "OPTION" | "OPCION" | "OPCIONES" | "MENU" => Self::Option,
            "MONEY" | "DINERO" => Self::Money,
            "NUMBER" | "NUMERO" => Self::Number,
            "DATE" | "FECHA" => Self::Date,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, Self::Option)
    }
}

/// What to do when the selected option has no configured transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackStep {
    StayOnCurrent,
    EndOfFlow,
    Step(StepId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub prompt: String,
    pub input_type: InputType,
    pub valid_options: Vec<String>,
    pub transitions: [Option<StepId>; MAX_TRANSITIONS],
    pub target_field: Option<LeadField>,
    pub rule: ValidationRule,
    pub error_message: String,
}

impl StepDefinition {
    pub fn new(id: StepId, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            input_type: InputType::FreeText,
            valid_options: Vec::new(),
            transitions: Default::default(),
            target_field: None,
            rule: ValidationRule::Always,
            error_message: String::new(),
        }
    }

    pub fn with_transition(mut self, option: usize, target: &str) -> Self {
        if (1..=MAX_TRANSITIONS).contains(&option) {
            self.transitions[option - 1] = StepId::parse(target);
        }
        self
    }

    pub fn transition(&self, option: &str) -> Option<&StepId> {
        let index = option.trim().parse::<usize>().ok()?;
        if !(1..=MAX_TRANSITIONS).contains(&index) {
            return None;
        }
        self.transitions[index - 1].as_ref()
    }

    /// Total transition lookup: the numbered target for `option`, otherwise the fallback.
    /// `None` means the flow ends here.
    pub fn next_step(&self, option: &str, fallback: &FallbackStep) -> Option<StepId> {
        if let Some(target) = self.transition(option) {
            return Some(target.clone());
        }
        match fallback {
            FallbackStep::StayOnCurrent => Some(self.id.clone()),
            FallbackStep::EndOfFlow => None,
            FallbackStep::Step(step) => Some(step.clone()),
        }
    }
}

pub fn parse_valid_options(raw: &str) -> Vec<String> {
    raw.split([',', '|', ';'])
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_valid_options, FallbackStep, InputType, StepDefinition, StepId};

    fn menu_step() -> StepDefinition {
        StepDefinition::new(StepId::new("CASO_TIPO"), "1) despido 2) renuncia")
            .with_transition(1, "NOMBRE")
            .with_transition(2, "NOMBRE")
            .with_transition(9, "ASESOR")
    }

    #[test]
    fn numbered_transition_wins_over_fallback() {
        let step = menu_step();
        assert_eq!(step.next_step("1", &FallbackStep::EndOfFlow), Some(StepId::new("NOMBRE")));
        assert_eq!(step.next_step("9", &FallbackStep::EndOfFlow), Some(StepId::new("ASESOR")));
    }

    #[test]
    fn missing_transition_uses_fallback() {
        let step = menu_step();
        assert_eq!(
            step.next_step("4", &FallbackStep::StayOnCurrent),
            Some(StepId::new("CASO_TIPO"))
        );
        assert_eq!(step.next_step("hola", &FallbackStep::EndOfFlow), None);
        assert_eq!(
            step.next_step("0", &FallbackStep::Step(StepId::new("FIN"))),
            Some(StepId::new("FIN"))
        );
    }

    #[test]
    fn blank_transition_targets_are_absent() {
        let step = StepDefinition::new(StepId::new("A"), "x").with_transition(1, "   ");
        assert_eq!(step.transition("1"), None);
    }

    #[test]
    fn options_and_input_types_parse_from_sheet_cells() {
        assert_eq!(parse_valid_options("1, 2|3;"), vec!["1", "2", "3"]);
        assert_eq!(InputType::parse("opcion"), InputType::Option);
        assert_eq!(InputType::parse(""), InputType::FreeText);
        assert_eq!(InputType::parse("foto"), InputType::Other("FOTO".to_string()));
    }
}
