use std::sync::Arc;

use casedesk_core::domain::lead::LeadField;
use casedesk_core::domain::step::{
    parse_valid_options, InputType, StepDefinition, StepId, MAX_TRANSITIONS,
};
use casedesk_core::validation::ValidationRule;

use crate::store::{CellUpdate, RecordStore, SheetSnapshot, StoreError};

pub const STEP_ID: &str = "ID_Paso";
pub const PROMPT: &str = "Texto_Bot";
pub const INPUT_TYPE: &str = "Tipo_Entrada";
pub const VALID_OPTIONS: &str = "Opciones_Validas";
pub const TARGET_FIELD: &str = "Campo_BD_Leads_A_Actualizar";
pub const RULE: &str = "Regla_Validacion";
pub const ERROR_MESSAGE: &str = "Mensaje_Error";

pub const HEADERS: &[&str] = &[
    STEP_ID,
    PROMPT,
    INPUT_TYPE,
    VALID_OPTIONS,
    "Siguiente_Si_1",
    "Siguiente_Si_2",
    "Siguiente_Si_3",
    "Siguiente_Si_4",
    "Siguiente_Si_5",
    "Siguiente_Si_6",
    "Siguiente_Si_7",
    "Siguiente_Si_8",
    "Siguiente_Si_9",
    TARGET_FIELD,
    RULE,
    ERROR_MESSAGE,
];

fn transition_column(option: usize) -> String {
    format!("Siguiente_Si_{option}")
}

#[derive(Clone)]
pub struct StepRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl StepRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    /// Every row with a step id, in sheet order.
    pub async fn load_definitions(&self) -> Result<Vec<StepDefinition>, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        if sheet.column_index(STEP_ID).is_none() {
            return Err(StoreError::MissingColumn {
                sheet: self.tab.clone(),
                column: STEP_ID.to_string(),
            });
        }
        Ok((0..sheet.len()).filter_map(|row| step_from_row(&sheet, row)).collect())
    }

    pub async fn append(&self, step: &StepDefinition) -> Result<usize, StoreError> {
        self.store.append_row(&self.tab, &step_to_cells(step)).await
    }
}

pub fn step_from_row(sheet: &SheetSnapshot, row: usize) -> Option<StepDefinition> {
    let id = StepId::parse(&sheet.text(row, STEP_ID))?;
    let mut step = StepDefinition::new(id, sheet.text(row, PROMPT));
    step.input_type = InputType::parse(&sheet.text(row, INPUT_TYPE));
    step.valid_options = parse_valid_options(&sheet.text(row, VALID_OPTIONS));
    for option in 1..=MAX_TRANSITIONS {
        step = step.with_transition(option, &sheet.text(row, &transition_column(option)));
    }
    step.target_field = LeadField::from_column(&sheet.text(row, TARGET_FIELD));
    step.rule = ValidationRule::parse(&sheet.text(row, RULE));
    step.error_message = sheet.text(row, ERROR_MESSAGE);
    Some(step)
}

pub fn step_to_cells(step: &StepDefinition) -> Vec<CellUpdate> {
    let input_type = match &step.input_type {
        InputType::FreeText => "TEXTO".to_string(),
        InputType::Option => "OPCION".to_string(),
        InputType::Money => "DINERO".to_string(),
        InputType::Number => "NUMERO".to_string(),
        InputType::Date => "FECHA".to_string(),
        InputType::Other(raw) => raw.clone(),
    };
    let mut cells = vec![
        CellUpdate::new(STEP_ID, step.id.as_str()),
        CellUpdate::new(PROMPT, step.prompt.clone()),
        CellUpdate::new(INPUT_TYPE, input_type),
        CellUpdate::new(VALID_OPTIONS, step.valid_options.join(",")),
        CellUpdate::new(
            TARGET_FIELD,
            step.target_field.as_ref().map(|field| field.column().to_string()).unwrap_or_default(),
        ),
        CellUpdate::new(RULE, step.rule.as_str()),
        CellUpdate::new(ERROR_MESSAGE, step.error_message.clone()),
    ];
    for (index, target) in step.transitions.iter().enumerate() {
        cells.push(CellUpdate::new(
            transition_column(index + 1),
            target.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
        ));
    }
    cells
}
