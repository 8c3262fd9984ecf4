use std::sync::Arc;

use casedesk_core::config::StoreConfig;
use casedesk_core::domain::lawyer::{Lawyer, LawyerId};
use casedesk_core::domain::lead::{columns, LeadField};
use casedesk_core::domain::step::{InputType, StepDefinition, StepId};
use casedesk_core::validation::ValidationRule;

use crate::repositories::{
    delivery, knowledge, lawyers, logs, steps, system, LawyerRepository, StepRepository,
    SystemConfigRepository,
};
use crate::store::{RecordStore, StoreError};

const YEAR_RULE: &str = r"REGEX:(19\d{2}|20\d{2})";
const MONTH_RULE: &str = r"REGEX:(1[0-2]|[1-9])";
const DAY_RULE: &str = r"REGEX:(3[01]|[12]\d|[1-9])";

/// Every tab with the headers the application reads and writes.
pub fn sheet_layout(tabs: &StoreConfig) -> Vec<(String, Vec<&'static str>)> {
    vec![
        (tabs.leads_tab.clone(), columns::ALL.to_vec()),
        (tabs.steps_tab.clone(), steps::HEADERS.to_vec()),
        (tabs.lawyers_tab.clone(), lawyers::HEADERS.to_vec()),
        (tabs.system_tab.clone(), system::HEADERS.to_vec()),
        (tabs.management_log_tab.clone(), logs::MANAGEMENT_HEADERS.to_vec()),
        (tabs.conversation_log_tab.clone(), logs::CONVERSATION_HEADERS.to_vec()),
        (tabs.delivery_ledger_tab.clone(), delivery::HEADERS.to_vec()),
        (tabs.knowledge_tab.clone(), knowledge::HEADERS.to_vec()),
    ]
}

pub async fn ensure_layout(store: &dyn RecordStore, tabs: &StoreConfig) -> Result<(), StoreError> {
    for (tab, headers) in sheet_layout(tabs) {
        store.ensure_sheet(&tab, &headers).await?;
    }
    Ok(())
}

fn option_step(
    id: &str,
    prompt: &str,
    options: &[&str],
    transitions: &[(usize, &str)],
    error: &str,
) -> StepDefinition {
    let mut step = StepDefinition::new(StepId::new(id), prompt);
    step.input_type = InputType::Option;
    step.valid_options = options.iter().map(ToString::to_string).collect();
    step.error_message = error.to_string();
    transitions.iter().fold(step, |step, (option, target)| step.with_transition(*option, target))
}

fn text_step(
    id: &str,
    prompt: &str,
    next: &str,
    field: LeadField,
    rule: &str,
    error: &str,
) -> StepDefinition {
    let mut step = StepDefinition::new(StepId::new(id), prompt).with_transition(1, next);
    step.target_field = Some(field);
    step.rule = ValidationRule::parse(rule);
    step.error_message = error.to_string();
    step
}

/// Default intake dialogue, lawyer roster and system settings for a fresh store.
pub struct SeedDataset;

impl SeedDataset {
    pub fn steps() -> Vec<StepDefinition> {
        let mut case_type = option_step(
            "CASO_TIPO",
            "Perfecto. Continuemos:\n1) Me acaban de despedir\n2) Tuve que renunciar",
            &["1", "2"],
            &[(1, "NOMBRE"), (2, "NOMBRE")],
            "Responde con 1 o 2.",
        );
        case_type.target_field = Some(LeadField::CaseType);

        let mut salary = text_step(
            "SALARIO",
            "¿Cuál era tu salario mensual en MXN? (solo número, ej. 15000)",
            "DISCLAIMER",
            LeadField::MonthlySalary,
            "MONEY",
            "Escribe un número válido (ej. 15000).",
        );
        salary.input_type = InputType::Money;

        vec![
            option_step(
                "INICIO",
                "Hola, soy Ximena, asistente virtual de *Tu Derecho Laboral México*.\n\n\
                 Te acompañaré durante todo el proceso hasta asignarte un abogado.\n\n\
                 ¿Deseas continuar?\n1) Sí\n2) No",
                &["1", "2"],
                &[(1, "CASO_TIPO"), (2, "FIN_NO_ACEPTA")],
                "Por favor responde con 1 o 2.",
            ),
            option_step(
                "FIN_NO_ACEPTA",
                "Entendido. Si deseas retomar tu caso, escribe 1.",
                &["1"],
                &[(1, "CASO_TIPO")],
                "Cuando quieras retomar, escribe 1.",
            ),
            case_type,
            text_step(
                "NOMBRE",
                "De acuerdo. Empecemos, por favor dime tu *nombre*.",
                "APELLIDO",
                LeadField::FirstName,
                r"REGEX:[^\d]{2,60}",
                "Escribe tu nombre (solo letras).",
            ),
            text_step(
                "APELLIDO",
                "Gracias, {Nombre}. Ahora tu *apellido*.",
                "DESCRIPCION",
                LeadField::LastName,
                r"REGEX:[^\d]{2,60}",
                "Escribe tu apellido (solo letras).",
            ),
            text_step(
                "DESCRIPCION",
                "Describe brevemente tu situación (mínimo 10 caracteres).",
                "INI_ANIO",
                LeadField::Description,
                "REGEX:.{10,}",
                "Escribe un poco más (mínimo 10 caracteres).",
            ),
            text_step(
                "INI_ANIO",
                "Gracias. Dime el *AÑO* de inicio (ej. 2020).",
                "INI_MES",
                LeadField::StartYear,
                YEAR_RULE,
                "Escribe un año válido (ej. 2018, 2020, 2024).",
            ),
            text_step(
                "INI_MES",
                "Ahora el *MES* de inicio (1 a 12).",
                "INI_DIA",
                LeadField::StartMonth,
                MONTH_RULE,
                "Escribe un mes del 1 al 12.",
            ),
            text_step(
                "INI_DIA",
                "Ahora el *DÍA* de inicio (1 a 31).",
                "FIN_ANIO",
                LeadField::StartDay,
                DAY_RULE,
                "Escribe un día del 1 al 31.",
            ),
            text_step(
                "FIN_ANIO",
                "Dime el *AÑO* de término (ej. 2025).",
                "FIN_MES",
                LeadField::EndYear,
                YEAR_RULE,
                "Escribe un año válido (ej. 2020, 2023, 2025).",
            ),
            text_step(
                "FIN_MES",
                "Ahora el *MES* de término (1 a 12).",
                "FIN_DIA",
                LeadField::EndMonth,
                MONTH_RULE,
                "Escribe un mes del 1 al 12.",
            ),
            text_step(
                "FIN_DIA",
                "Finalmente el *DÍA* de término (1 a 31).",
                "SALARIO",
                LeadField::EndDay,
                DAY_RULE,
                "Escribe un día del 1 al 31.",
            ),
            salary,
            option_step(
                "DISCLAIMER",
                "Aviso importante: La información que te brindamos es orientativa y no constituye \
                 asesoría legal.\n\n¿Deseas continuar?\n1) Continuar\n2) No deseo continuar",
                &["1", "2"],
                &[(1, "EN_PROCESO"), (2, "FIN_NO_CONTINUA")],
                "Responde con 1 o 2.",
            ),
            option_step(
                "FIN_NO_CONTINUA",
                "Entendido. Si deseas retomar tu caso, escribe 1.",
                &["1"],
                &[(1, "DISCLAIMER")],
                "Cuando quieras retomar, escribe 1.",
            ),
            StepDefinition::new(
                StepId::new("EN_PROCESO"),
                "Gracias, ya tengo lo necesario ✅\n\nEstoy preparando tu *estimación preliminar* \
                 y asignando a la abogada que llevará tu caso.\nEn un momento te envío el \
                 resultado por este medio.",
            ),
            option_step(
                "CLIENTE_MENU",
                "✅ Ya tengo tu estimación preliminar.\n\n¿Qué deseas hacer?\n1) Ver informe\n\
                 2) Hablar con un abogado\n3) Terminar",
                &["1", "2", "3"],
                &[(1, "VER_INFORME"), (2, "CONTACTO_ABOGADA"), (3, "FIN_GRACIAS")],
                "Elige 1, 2 o 3.",
            ),
            StepDefinition::new(
                StepId::new("VER_INFORME"),
                "📄 Tu informe: {Link_Reporte_Web}\n\nEscribe *menu* para volver.",
            )
            .with_transition(1, "CLIENTE_MENU"),
            StepDefinition::new(
                StepId::new("CONTACTO_ABOGADA"),
                "👩‍⚖️ Tu abogada asignada es *{Abogado_Asignado_Nombre}*.\n\
                 Escríbele aquí: {Link_WhatsApp}\n\nEscribe *menu* para volver.",
            )
            .with_transition(1, "CLIENTE_MENU"),
            StepDefinition::new(
                StepId::new("FIN_GRACIAS"),
                "Gracias por confiar en nosotros. Escribe *menu* cuando quieras volver.",
            )
            .with_transition(1, "CLIENTE_MENU"),
        ]
    }

    pub fn lawyers() -> Vec<Lawyer> {
        let lawyer = |id: &str, name: &str, phone: &str, active: bool| Lawyer {
            id: LawyerId(id.to_string()),
            name: name.to_string(),
            phone: (!phone.is_empty()).then(|| phone.to_string()),
            active,
            daily_load: 0,
            last_assigned_at: None,
        };
        vec![
            lawyer("A01", "Lic. Mariana Rivera", "+5215511110001", true),
            lawyer("A02", "Lic. Daniela Soto", "+5215511110002", true),
            lawyer("A03", "Lic. Fernanda Ortiz", "+5215511110003", true),
            lawyer("A04", "Lic. Paola Méndez", "", false),
        ]
    }

    pub fn system_config(report_base_url: Option<&str>) -> Vec<(&'static str, String)> {
        vec![
            (
                "RUTA_REPORTE",
                report_base_url.unwrap_or("http://127.0.0.1:8080/reporte").to_string(),
            ),
            ("NOMBRE_DESPACHO", "Tu Derecho Laboral México".to_string()),
        ]
    }

    /// Creates the layout and inserts whatever rows are missing. Safe to run twice.
    pub async fn load(
        store: Arc<dyn RecordStore>,
        tabs: &StoreConfig,
        report_base_url: Option<&str>,
    ) -> Result<SeedResult, StoreError> {
        ensure_layout(store.as_ref(), tabs).await?;

        let step_repo = StepRepository::new(store.clone(), tabs.steps_tab.clone());
        let existing_steps: Vec<StepId> =
            step_repo.load_definitions().await?.into_iter().map(|step| step.id).collect();
        let mut steps_seeded = 0;
        for step in Self::steps() {
            if !existing_steps.contains(&step.id) {
                step_repo.append(&step).await?;
                steps_seeded += 1;
            }
        }

        let lawyer_repo = LawyerRepository::new(store.clone(), tabs.lawyers_tab.clone());
        let existing_lawyers: Vec<LawyerId> =
            lawyer_repo.roster().await?.into_iter().map(|lawyer| lawyer.id).collect();
        let mut lawyers_seeded = 0;
        for lawyer in Self::lawyers() {
            if !existing_lawyers.contains(&lawyer.id) {
                lawyer_repo.append(&lawyer).await?;
                lawyers_seeded += 1;
            }
        }

        let system_repo = SystemConfigRepository::new(store, tabs.system_tab.clone());
        let existing_config = system_repo.load().await?;
        let mut config_keys_seeded = 0;
        for (key, value) in Self::system_config(report_base_url) {
            if !existing_config.contains_key(key) {
                system_repo.upsert(key, &value).await?;
                config_keys_seeded += 1;
            }
        }

        Ok(SeedResult { steps_seeded, lawyers_seeded, config_keys_seeded })
    }

    /// Checks that every tab exists and the default dialogue is present.
    pub async fn verify(
        store: Arc<dyn RecordStore>,
        tabs: &StoreConfig,
        default_step: &StepId,
    ) -> Result<VerificationResult, StoreError> {
        let sheets = store.sheet_names().await?;
        let mut checks: Vec<(String, bool)> = sheet_layout(tabs)
            .into_iter()
            .map(|(tab, _)| {
                let present = sheets.contains(&tab);
                (format!("tab:{tab}"), present)
            })
            .collect();

        let steps = if sheets.contains(&tabs.steps_tab) {
            StepRepository::new(store.clone(), tabs.steps_tab.clone()).load_definitions().await?
        } else {
            Vec::new()
        };
        checks.push((
            format!("step:{default_step}"),
            steps.iter().any(|step| &step.id == default_step),
        ));

        let active_lawyers = if sheets.contains(&tabs.lawyers_tab) {
            LawyerRepository::new(store, tabs.lawyers_tab.clone())
                .roster()
                .await?
                .into_iter()
                .filter(|lawyer| lawyer.active)
                .count()
        } else {
            0
        };
        checks.push(("lawyers:active".to_string(), active_lawyers > 0));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub steps_seeded: usize,
    pub lawyers_seeded: usize,
    pub config_keys_seeded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
