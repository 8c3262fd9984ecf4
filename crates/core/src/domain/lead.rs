use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lawyer::LawyerId;
use crate::domain::step::StepId;
use crate::text::parse_money;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl LeadId {
    /// `<phone digits>-<6 hex chars>`, mirroring how leads are keyed in the sheet.
    pub fn for_phone(phone_normalized: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{phone_normalized}-{}", &suffix[..6]))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportToken(pub String);

impl ReportToken {
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(raw[..18].to_string())
    }

    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Termination,
    Resignation,
    Other,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Termination => "TERMINATION",
            Self::Resignation => "RESIGNATION",
            Self::Other => "OTHER",
        }
    }

    /// Accepts the dialogue option digits as well as the stored names.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_uppercase();
        match normalized.as_str() {
            "" => None,
            "1" | "TERMINATION" | "DESPIDO" => Some(Self::Termination),
            "2" | "RESIGNATION" | "RENUNCIA" => Some(Self::Resignation),
            _ => Some(Self::Other),
        }
    }

    pub fn display_es(&self) -> &'static str {
        match self {
            Self::Termination => "despido",
            Self::Resignation => "renuncia",
            Self::Other => "otro",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    None,
    Pending,
    Running,
    Done,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "PENDIENTE" => Self::Pending,
            "RUNNING" => Self::Running,
            "DONE" | "LISTO" => Self::Done,
            "FAILED" => Self::Failed,
            _ => Self::None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// A year/month/day triple as captured by the dialogue, one answer per step.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateParts {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl DateParts {
    pub fn new(year: impl Into<String>, month: impl Into<String>, day: impl Into<String>) -> Self {
        Self { year: year.into(), month: month.into(), day: day.into() }
    }

    /// Incomplete or invalid triples are treated as absent.
    pub fn to_date(&self) -> Option<NaiveDate> {
        let year = self.year.trim().parse::<i32>().ok()?;
        let month = self.month.trim().parse::<u32>().ok()?;
        let day = self.day.trim().parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

/// Lead attributes a step may target, addressed by their column header.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadField {
    FirstName,
    LastName,
    CaseType,
    Description,
    MonthlySalary,
    StartYear,
    StartMonth,
    StartDay,
    EndYear,
    EndMonth,
    EndDay,
    Other(String),
}

impl LeadField {
    pub fn from_column(column: &str) -> Option<Self> {
        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        let field = match column.to_ascii_lowercase().as_str() {
            "nombre" => Self::FirstName,
            "apellido" => Self::LastName,
            "tipo_caso" => Self::CaseType,
            "descripcion_situacion" => Self::Description,
            "salario_mensual" => Self::MonthlySalary,
            "inicio_anio" => Self::StartYear,
            "inicio_mes" => Self::StartMonth,
            "inicio_dia" => Self::StartDay,
            "fin_anio" => Self::EndYear,
            "fin_mes" => Self::EndMonth,
            "fin_dia" => Self::EndDay,
            _ => Self::Other(column.to_string()),
        };
        Some(field)
    }

    pub fn column(&self) -> &str {
        match self {
            Self::FirstName => columns::FIRST_NAME,
            Self::LastName => columns::LAST_NAME,
            Self::CaseType => columns::CASE_TYPE,
            Self::Description => columns::DESCRIPTION,
            Self::MonthlySalary => columns::MONTHLY_SALARY,
            Self::StartYear => columns::START_YEAR,
            Self::StartMonth => columns::START_MONTH,
            Self::StartDay => columns::START_DAY,
            Self::EndYear => columns::END_YEAR,
            Self::EndMonth => columns::END_MONTH,
            Self::EndDay => columns::END_DAY,
            Self::Other(column) => column,
        }
    }
}

/// Header names of the leads tab.
pub mod columns {
    pub const ID: &str = "ID_Lead";
    pub const PHONE: &str = "Telefono";
    pub const PHONE_NORMALIZED: &str = "Telefono_Normalizado";
    pub const FIRST_NAME: &str = "Nombre";
    pub const LAST_NAME: &str = "Apellido";
    pub const CASE_TYPE: &str = "Tipo_Caso";
    pub const DESCRIPTION: &str = "Descripcion_Situacion";
    pub const MONTHLY_SALARY: &str = "Salario_Mensual";
    pub const START_YEAR: &str = "Inicio_Anio";
    pub const START_MONTH: &str = "Inicio_Mes";
    pub const START_DAY: &str = "Inicio_Dia";
    pub const END_YEAR: &str = "Fin_Anio";
    pub const END_MONTH: &str = "Fin_Mes";
    pub const END_DAY: &str = "Fin_Dia";
    pub const CURRENT_STEP: &str = "ESTATUS";
    pub const PROCESSING_STATUS: &str = "Procesar_AI_Status";
    pub const CLAIMED_AT: &str = "Procesar_AI_Reclamado";
    pub const ESTIMATE_TEXT: &str = "Resultado_Calculo";
    pub const ESTIMATE_TOTAL: &str = "Total_Estimado";
    pub const ESTIMATE_BREAKDOWN: &str = "Desglose_Calculo_JSON";
    pub const AI_SUMMARY: &str = "Analisis_AI";
    pub const REPORT_TOKEN: &str = "Token_Reporte";
    pub const REPORT_LINK: &str = "Link_Reporte_Web";
    pub const LAWYER_ID: &str = "Abogado_Asignado_ID";
    pub const LAWYER_NAME: &str = "Abogado_Asignado_Nombre";
    pub const LAWYER_LINK: &str = "Link_WhatsApp";
    pub const LEAD_SOURCE: &str = "Fuente_Lead";
    pub const CREATED_AT: &str = "Fecha_Registro";
    pub const UPDATED_AT: &str = "Ultima_Actualizacion";
    pub const LAST_ERROR: &str = "Ultimo_Error";

    pub const ALL: &[&str] = &[
        ID,
        PHONE,
        PHONE_NORMALIZED,
        FIRST_NAME,
        LAST_NAME,
        CASE_TYPE,
        DESCRIPTION,
        MONTHLY_SALARY,
        START_YEAR,
        START_MONTH,
        START_DAY,
        END_YEAR,
        END_MONTH,
        END_DAY,
        CURRENT_STEP,
        PROCESSING_STATUS,
        CLAIMED_AT,
        ESTIMATE_TEXT,
        ESTIMATE_TOTAL,
        ESTIMATE_BREAKDOWN,
        AI_SUMMARY,
        REPORT_TOKEN,
        REPORT_LINK,
        LAWYER_ID,
        LAWYER_NAME,
        LAWYER_LINK,
        LEAD_SOURCE,
        CREATED_AT,
        UPDATED_AT,
        LAST_ERROR,
    ];
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Lead {
    pub id: Option<LeadId>,
    pub phone: String,
    pub phone_normalized: String,
    pub first_name: String,
    pub last_name: String,
    pub case_type: Option<CaseType>,
    pub description: String,
    pub monthly_salary: Option<Decimal>,
    pub employment_start: DateParts,
    pub employment_end: DateParts,
    pub current_step: Option<StepId>,
    pub status: ProcessingStatus,
    pub estimate_text: String,
    pub estimate_total: Option<Decimal>,
    pub estimate_breakdown_json: String,
    pub ai_summary: String,
    pub report_token: Option<ReportToken>,
    pub report_link: String,
    pub assigned_lawyer_id: Option<LawyerId>,
    pub assigned_lawyer_name: String,
    pub lawyer_contact_link: String,
    pub lead_source: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: String,
    pub extra: BTreeMap<String, String>,
}

impl Lead {
    pub fn new(id: LeadId, phone: impl Into<String>, phone_normalized: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            phone: phone.into(),
            phone_normalized: phone_normalized.into(),
            ..Self::default()
        }
    }

    /// Writes a validated answer into the targeted attribute and returns the stored value.
    pub fn apply_field(&mut self, field: &LeadField, value: &str) -> String {
        match field {
            LeadField::FirstName => self.first_name = value.to_string(),
            LeadField::LastName => self.last_name = value.to_string(),
            LeadField::CaseType => {
                self.case_type = CaseType::parse(value);
                return self.case_type.map(|case| case.as_str().to_string()).unwrap_or_default();
            }
            LeadField::Description => self.description = value.to_string(),
            LeadField::MonthlySalary => {
                self.monthly_salary = parse_money(value).filter(|amount| !amount.is_sign_negative());
                return self.monthly_salary.map(|amount| amount.to_string()).unwrap_or_default();
            }
            LeadField::StartYear => self.employment_start.year = value.to_string(),
            LeadField::StartMonth => self.employment_start.month = value.to_string(),
            LeadField::StartDay => self.employment_start.day = value.to_string(),
            LeadField::EndYear => self.employment_end.year = value.to_string(),
            LeadField::EndMonth => self.employment_end.month = value.to_string(),
            LeadField::EndDay => self.employment_end.day = value.to_string(),
            LeadField::Other(column) => {
                self.extra.insert(column.clone(), value.to_string());
            }
        }
        value.to_string()
    }

    /// Current value of a column, used for prompt placeholders.
    pub fn column_value(&self, column: &str) -> Option<String> {
        let computed = match column.trim().to_ascii_lowercase().as_str() {
            "id_lead" => Some(self.id.as_ref().map(|id| id.0.clone()).unwrap_or_default()),
            "telefono" => Some(self.phone.clone()),
            "resultado_calculo" => Some(self.estimate_text.clone()),
            "total_estimado" => {
                Some(self.estimate_total.map(|total| total.to_string()).unwrap_or_default())
            }
            "analisis_ai" => Some(self.ai_summary.clone()),
            "token_reporte" => {
                Some(self.report_token.as_ref().map(|token| token.0.clone()).unwrap_or_default())
            }
            "link_reporte_web" => Some(self.report_link.clone()),
            "abogado_asignado_nombre" => Some(self.assigned_lawyer_name.clone()),
            "link_whatsapp" => Some(self.lawyer_contact_link.clone()),
            _ => None,
        };
        if computed.is_some() {
            return computed;
        }

        let field = LeadField::from_column(column)?;
        let value = match field {
            LeadField::FirstName => self.first_name.clone(),
            LeadField::LastName => self.last_name.clone(),
            LeadField::CaseType => {
                self.case_type.map(|case| case.display_es().to_string()).unwrap_or_default()
            }
            LeadField::Description => self.description.clone(),
            LeadField::MonthlySalary => {
                self.monthly_salary.map(|amount| amount.to_string()).unwrap_or_default()
            }
            LeadField::StartYear => self.employment_start.year.clone(),
            LeadField::StartMonth => self.employment_start.month.clone(),
            LeadField::StartDay => self.employment_start.day.clone(),
            LeadField::EndYear => self.employment_end.year.clone(),
            LeadField::EndMonth => self.employment_end.month.clone(),
            LeadField::EndDay => self.employment_end.day.clone(),
            LeadField::Other(column) => self.extra.get(&column).cloned()?,
        };
        Some(value)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim()).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CaseType, DateParts, Lead, LeadField, LeadId, ProcessingStatus, ReportToken};

    #[test]
    fn case_type_accepts_option_digits_and_names() {
        assert_eq!(CaseType::parse("1"), Some(CaseType::Termination));
        assert_eq!(CaseType::parse("renuncia"), Some(CaseType::Resignation));
        assert_eq!(CaseType::parse("TERMINATION"), Some(CaseType::Termination));
        assert_eq!(CaseType::parse("3"), Some(CaseType::Other));
        assert_eq!(CaseType::parse("  "), None);
    }

    #[test]
    fn processing_status_accepts_legacy_done_marker() {
        assert_eq!(ProcessingStatus::parse("LISTO"), ProcessingStatus::Done);
        assert_eq!(ProcessingStatus::parse("pending"), ProcessingStatus::Pending);
        assert_eq!(ProcessingStatus::parse(""), ProcessingStatus::None);
        assert_eq!(ProcessingStatus::parse("whatever"), ProcessingStatus::None);
    }

    #[test]
    fn invalid_or_incomplete_dates_are_absent() {
        assert!(DateParts::new("2020", "1", "1").to_date().is_some());
        assert!(DateParts::new("2021", "2", "30").to_date().is_none());
        assert!(DateParts::new("2021", "", "3").to_date().is_none());
        assert!(DateParts::new("abc", "1", "3").to_date().is_none());
    }

    #[test]
    fn report_token_has_stable_shape() {
        let token = ReportToken::generate();
        assert_eq!(token.0.len(), 18);
        assert!(token.0.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(ReportToken::parse("  "), None);
    }

    #[test]
    fn lead_id_is_prefixed_by_phone_digits() {
        let id = LeadId::for_phone("5215512345678");
        assert!(id.0.starts_with("5215512345678-"));
        assert_eq!(id.0.len(), "5215512345678-".len() + 6);
    }

    #[test]
    fn apply_field_normalizes_typed_attributes() {
        let mut lead = Lead::default();

        let stored = lead.apply_field(&LeadField::CaseType, "1");
        assert_eq!(stored, "TERMINATION");
        assert_eq!(lead.case_type, Some(CaseType::Termination));

        let stored = lead.apply_field(&LeadField::MonthlySalary, "$15,000");
        assert_eq!(stored, "15000");
        assert_eq!(lead.monthly_salary, Some(Decimal::new(15_000, 0)));

        lead.apply_field(&LeadField::Other("Correo".to_string()), "a@b.mx");
        assert_eq!(lead.extra.get("Correo").map(String::as_str), Some("a@b.mx"));
        assert_eq!(lead.column_value("correo"), None);
        assert_eq!(lead.column_value("Correo").as_deref(), Some("a@b.mx"));
    }

    #[test]
    fn computed_columns_are_available_to_templates() {
        let mut lead = Lead::new(LeadId("52155-abc123".to_string()), "whatsapp:+52155", "52155");
        lead.report_link = "https://casos.example.mx/?token=abc".to_string();
        lead.assigned_lawyer_name = "Lic. Ana".to_string();

        assert_eq!(
            lead.column_value("Link_Reporte_Web").as_deref(),
            Some("https://casos.example.mx/?token=abc")
        );
        assert_eq!(lead.column_value("Abogado_Asignado_Nombre").as_deref(), Some("Lic. Ana"));
        assert_eq!(lead.column_value("ID_Lead").as_deref(), Some("52155-abc123"));
        assert_eq!(lead.column_value("Token_Reporte").as_deref(), Some(""));
    }

    #[test]
    fn field_lookup_is_case_insensitive_on_known_columns() {
        assert_eq!(LeadField::from_column("nombre"), Some(LeadField::FirstName));
        assert_eq!(LeadField::from_column("SALARIO_MENSUAL"), Some(LeadField::MonthlySalary));
        assert_eq!(LeadField::from_column(""), None);
        assert_eq!(LeadField::FirstName.column(), "Nombre");
    }
}
