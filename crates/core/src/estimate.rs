//! Deterministic severance estimate for a labor case.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::lead::CaseType;
use crate::text::format_amount;

const DAYS_PER_MONTH: i64 = 30;
const DAYS_PER_YEAR: i64 = 365;
const YEAR_END_BONUS_DAYS: i64 = 15;
const INDEMNITY_DAYS: i64 = 90;
const SEVERANCE_DAYS_PER_YEAR: i64 = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub case_type: Option<CaseType>,
    pub daily_salary: Decimal,
    pub days_worked: Option<i64>,
    pub years_worked: Option<Decimal>,
    pub year_end_bonus: Decimal,
    pub indemnity: Decimal,
    pub severance: Decimal,
    pub total: Decimal,
}

/// Computes the estimate. Dates where `start > end` count as unknown.
pub fn estimate(
    case_type: Option<CaseType>,
    monthly_salary: Option<Decimal>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Estimate {
    let daily_salary = match monthly_salary {
        Some(salary) if salary > Decimal::ZERO => salary / Decimal::from(DAYS_PER_MONTH),
        _ => Decimal::ZERO,
    };

    let days_worked = match (start, end) {
        (Some(start), Some(end)) if end >= start => Some((end - start).num_days() + 1),
        _ => None,
    };
    let years_worked = days_worked.map(|days| Decimal::from(days) / Decimal::from(DAYS_PER_YEAR));

    let year_end_bonus = days_worked
        .map(|days| {
            daily_salary * Decimal::from(YEAR_END_BONUS_DAYS) * Decimal::from(days)
                / Decimal::from(DAYS_PER_YEAR)
        })
        .unwrap_or(Decimal::ZERO);

    let (indemnity, severance) = match case_type {
        Some(CaseType::Termination) => (
            daily_salary * Decimal::from(INDEMNITY_DAYS),
            years_worked
                .map(|years| daily_salary * Decimal::from(SEVERANCE_DAYS_PER_YEAR) * years)
                .unwrap_or(Decimal::ZERO),
        ),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };

    Estimate {
        case_type,
        daily_salary,
        days_worked,
        years_worked,
        year_end_bonus,
        indemnity,
        severance,
        total: indemnity + severance + year_end_bonus,
    }
}

impl Estimate {
    pub fn total_rounded(&self) -> Decimal {
        self.total.round_dp(2)
    }

    /// WhatsApp-formatted breakdown shown to the client.
    pub fn render_text(&self) -> String {
        let mut lines = vec!["📌 *Estimación preliminar (informativa)*".to_string()];
        if let Some(years) = self.years_worked {
            lines.push(format!("• Antigüedad estimada: {:.2} años", years.round_dp(2)));
        } else {
            lines.push("• Antigüedad: sin fechas válidas".to_string());
        }
        lines.push(format!("• Salario diario: ${}", format_amount(self.daily_salary)));

        if matches!(self.case_type, Some(CaseType::Termination)) {
            lines.push(format!("• 3 meses (90 días): ${}", format_amount(self.indemnity)));
            lines.push(format!("• 20 días por año: ${}", format_amount(self.severance)));
            lines.push(format!("• Aguinaldo proporcional: ${}", format_amount(self.year_end_bonus)));
            lines.push(format!("✅ *Total estimado:* ${}", format_amount(self.total)));
        } else {
            lines.push(format!(
                "• Aguinaldo proporcional (aprox): ${}",
                format_amount(self.year_end_bonus)
            ));
            lines.push(format!("✅ *Subtotal estimado:* ${}", format_amount(self.total)));
        }

        lines.push(String::new());
        lines.push(
            "Nota: puede variar por salario integrado real, salarios caídos y otras prestaciones."
                .to_string(),
        );
        lines.join("\n")
    }

    /// Machine-readable breakdown persisted next to the lead.
    pub fn breakdown_json(&self) -> String {
        json!({
            "tipo": self.case_type.map(|case| case.as_str()).unwrap_or(""),
            "salario_diario": self.daily_salary.round_dp(2).to_string(),
            "dias_trabajados": self.days_worked,
            "anios_trabajados": self.years_worked.map(|years| years.round_dp(4).to_string()),
            "aguinaldo_prop": self.year_end_bonus.round_dp(2).to_string(),
            "indemnizacion_90": self.indemnity.round_dp(2).to_string(),
            "ind_20": self.severance.round_dp(2).to_string(),
            "total": self.total_rounded().to_string(),
        })
        .to_string()
    }
}
