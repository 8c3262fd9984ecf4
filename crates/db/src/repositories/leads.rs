use std::sync::Arc;

use chrono::{DateTime, Utc};

use casedesk_core::domain::lawyer::LawyerId;
use casedesk_core::domain::lead::{
    columns, CaseType, DateParts, Lead, LeadId, ProcessingStatus, ReportToken,
};
use casedesk_core::domain::step::StepId;
use casedesk_core::text::parse_money;

use super::{format_timestamp, parse_timestamp};
use crate::store::{CellGuard, CellUpdate, RecordStore, SheetSnapshot, StoreError};

/// A lead together with its row and the raw cells used to guard a claim.
#[derive(Clone, Debug, PartialEq)]
pub struct LeadRecord {
    pub row: usize,
    pub lead: Lead,
    pub status_cell: String,
    pub claimed_cell: String,
}

#[derive(Clone)]
pub struct LeadRepository {
    store: Arc<dyn RecordStore>,
    tab: String,
}

impl LeadRepository {
    pub fn new(store: Arc<dyn RecordStore>, tab: impl Into<String>) -> Self {
        Self { store, tab: tab.into() }
    }

    pub fn tab(&self) -> &str {
        &self.tab
    }

    pub async fn list(&self) -> Result<Vec<LeadRecord>, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        Ok((0..sheet.len()).map(|row| record_from_row(&sheet, row)).collect())
    }

    /// Looks up by normalized phone, falling back to the raw phone column.
    pub async fn find_by_phone(&self, normalized: &str) -> Result<Option<LeadRecord>, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        let row = sheet
            .find_row_by_column_value(columns::PHONE_NORMALIZED, normalized)
            .or_else(|| {
                (0..sheet.len()).find(|row| {
                    let raw = sheet.text(*row, columns::PHONE);
                    !normalized.trim().is_empty()
                        && casedesk_core::text::normalize_phone(&raw) == normalized.trim()
                })
            });
        Ok(row.map(|row| record_from_row(&sheet, row)))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<LeadRecord>, StoreError> {
        self.find_by(columns::ID, id).await
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<LeadRecord>, StoreError> {
        self.find_by(columns::REPORT_TOKEN, token).await
    }

    async fn find_by(&self, column: &str, value: &str) -> Result<Option<LeadRecord>, StoreError> {
        let sheet = self.store.get_all_rows(&self.tab).await?;
        Ok(sheet.find_row_by_column_value(column, value).map(|row| record_from_row(&sheet, row)))
    }

    pub async fn create(&self, lead: Lead) -> Result<LeadRecord, StoreError> {
        let cells = lead_to_cells(&lead);
        let row = self.store.append_row(&self.tab, &cells).await?;
        Ok(LeadRecord {
            row,
            status_cell: lead.status.as_str().to_string(),
            claimed_cell: lead.claimed_at.map(format_timestamp).unwrap_or_default(),
            lead,
        })
    }

    /// Writes every lead column back to its row.
    pub async fn save(&self, record: &LeadRecord) -> Result<(), StoreError> {
        self.store.update_cells(&self.tab, record.row, &lead_to_cells(&record.lead)).await
    }

    pub async fn update_columns(&self, row: usize, updates: &[CellUpdate]) -> Result<(), StoreError> {
        self.store.update_cells(&self.tab, row, updates).await
    }

    /// Moves the lead to `RUNNING` unless another claimant got there first.
    ///
    /// Pending leads are guarded on the status cell, stale running leads on the
    /// claim timestamp they were observed with.
    pub async fn claim(&self, record: &LeadRecord, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let guard = if record.lead.status == ProcessingStatus::Running {
            CellGuard::new(columns::CLAIMED_AT, record.claimed_cell.clone())
        } else {
            CellGuard::new(columns::PROCESSING_STATUS, record.status_cell.clone())
        };
        let stamp = format_timestamp(now);
        let updates = [
            CellUpdate::new(columns::PROCESSING_STATUS, ProcessingStatus::Running.as_str()),
            CellUpdate::new(columns::CLAIMED_AT, stamp.clone()),
            CellUpdate::new(columns::LAST_ERROR, ""),
            CellUpdate::new(columns::UPDATED_AT, stamp),
        ];
        self.store.compare_and_set(&self.tab, record.row, &guard, &updates).await
    }

    pub async fn mark_failed(
        &self,
        row: usize,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_columns(
            row,
            &[
                CellUpdate::new(columns::PROCESSING_STATUS, ProcessingStatus::Failed.as_str()),
                CellUpdate::new(columns::LAST_ERROR, error),
                CellUpdate::new(columns::UPDATED_AT, format_timestamp(now)),
            ],
        )
        .await
    }
}

fn record_from_row(sheet: &SheetSnapshot, row: usize) -> LeadRecord {
    LeadRecord {
        row,
        lead: lead_from_row(sheet, row),
        status_cell: sheet.text(row, columns::PROCESSING_STATUS),
        claimed_cell: sheet.text(row, columns::CLAIMED_AT),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

pub fn lead_from_row(sheet: &SheetSnapshot, row: usize) -> Lead {
    let text = |column: &str| sheet.text(row, column);
    let known: Vec<String> = columns::ALL.iter().map(|column| column.to_lowercase()).collect();
    let extra = sheet
        .row_map(row)
        .into_iter()
        .filter(|(header, _)| !known.contains(&header.to_lowercase()))
        .collect();

    Lead {
        id: non_empty(text(columns::ID)).map(LeadId),
        phone: text(columns::PHONE),
        phone_normalized: text(columns::PHONE_NORMALIZED),
        first_name: text(columns::FIRST_NAME),
        last_name: text(columns::LAST_NAME),
        case_type: CaseType::parse(&text(columns::CASE_TYPE)),
        description: text(columns::DESCRIPTION),
        monthly_salary: parse_money(&text(columns::MONTHLY_SALARY))
            .filter(|amount| !amount.is_sign_negative()),
        employment_start: DateParts::new(
            text(columns::START_YEAR),
            text(columns::START_MONTH),
            text(columns::START_DAY),
        ),
        employment_end: DateParts::new(
            text(columns::END_YEAR),
            text(columns::END_MONTH),
            text(columns::END_DAY),
        ),
        current_step: StepId::parse(&text(columns::CURRENT_STEP)),
        status: ProcessingStatus::parse(&text(columns::PROCESSING_STATUS)),
        estimate_text: text(columns::ESTIMATE_TEXT),
        estimate_total: parse_money(&text(columns::ESTIMATE_TOTAL)),
        estimate_breakdown_json: text(columns::ESTIMATE_BREAKDOWN),
        ai_summary: text(columns::AI_SUMMARY),
        report_token: ReportToken::parse(&text(columns::REPORT_TOKEN)),
        report_link: text(columns::REPORT_LINK),
        assigned_lawyer_id: non_empty(text(columns::LAWYER_ID)).map(LawyerId),
        assigned_lawyer_name: text(columns::LAWYER_NAME),
        lawyer_contact_link: text(columns::LAWYER_LINK),
        lead_source: text(columns::LEAD_SOURCE),
        created_at: parse_timestamp(&text(columns::CREATED_AT)),
        updated_at: parse_timestamp(&text(columns::UPDATED_AT)),
        claimed_at: parse_timestamp(&text(columns::CLAIMED_AT)),
        last_error: text(columns::LAST_ERROR),
        extra,
    }
}

pub fn lead_to_cells(lead: &Lead) -> Vec<CellUpdate> {
    let stamp = |at: Option<DateTime<Utc>>| at.map(format_timestamp).unwrap_or_default();
    let mut cells = vec![
        CellUpdate::new(columns::ID, lead.id.as_ref().map(|id| id.0.clone()).unwrap_or_default()),
        CellUpdate::new(columns::PHONE, lead.phone.clone()),
        CellUpdate::new(columns::PHONE_NORMALIZED, lead.phone_normalized.clone()),
        CellUpdate::new(columns::FIRST_NAME, lead.first_name.clone()),
        CellUpdate::new(columns::LAST_NAME, lead.last_name.clone()),
        CellUpdate::new(
            columns::CASE_TYPE,
            lead.case_type.map(|case| case.as_str()).unwrap_or_default(),
        ),
        CellUpdate::new(columns::DESCRIPTION, lead.description.clone()),
        CellUpdate::new(
            columns::MONTHLY_SALARY,
            lead.monthly_salary.map(|amount| amount.to_string()).unwrap_or_default(),
        ),
        CellUpdate::new(columns::START_YEAR, lead.employment_start.year.clone()),
        CellUpdate::new(columns::START_MONTH, lead.employment_start.month.clone()),
        CellUpdate::new(columns::START_DAY, lead.employment_start.day.clone()),
        CellUpdate::new(columns::END_YEAR, lead.employment_end.year.clone()),
        CellUpdate::new(columns::END_MONTH, lead.employment_end.month.clone()),
        CellUpdate::new(columns::END_DAY, lead.employment_end.day.clone()),
        CellUpdate::new(
            columns::CURRENT_STEP,
            lead.current_step.as_ref().map(|step| step.0.clone()).unwrap_or_default(),
        ),
        CellUpdate::new(columns::PROCESSING_STATUS, lead.status.as_str()),
        CellUpdate::new(columns::CLAIMED_AT, stamp(lead.claimed_at)),
        CellUpdate::new(columns::ESTIMATE_TEXT, lead.estimate_text.clone()),
        CellUpdate::new(
            columns::ESTIMATE_TOTAL,
            lead.estimate_total.map(|total| format!("{:.2}", total)).unwrap_or_default(),
        ),
        CellUpdate::new(columns::ESTIMATE_BREAKDOWN, lead.estimate_breakdown_json.clone()),
        CellUpdate::new(columns::AI_SUMMARY, lead.ai_summary.clone()),
        CellUpdate::new(
            columns::REPORT_TOKEN,
            lead.report_token.as_ref().map(|token| token.0.clone()).unwrap_or_default(),
        ),
        CellUpdate::new(columns::REPORT_LINK, lead.report_link.clone()),
        CellUpdate::new(
            columns::LAWYER_ID,
            lead.assigned_lawyer_id.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
        ),
        CellUpdate::new(columns::LAWYER_NAME, lead.assigned_lawyer_name.clone()),
        CellUpdate::new(columns::LAWYER_LINK, lead.lawyer_contact_link.clone()),
        CellUpdate::new(columns::LEAD_SOURCE, lead.lead_source.clone()),
        CellUpdate::new(columns::CREATED_AT, stamp(lead.created_at)),
        CellUpdate::new(columns::UPDATED_AT, stamp(lead.updated_at)),
        CellUpdate::new(columns::LAST_ERROR, lead.last_error.clone()),
    ];
    cells.extend(lead.extra.iter().map(|(column, value)| CellUpdate::new(column, value)));
    cells
}
