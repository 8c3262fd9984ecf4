use std::sync::Arc;

use casedesk_core::config::StoreConfig;
use casedesk_core::domain::lead::{Lead, LeadId, ProcessingStatus};
use casedesk_core::domain::step::StepId;
use casedesk_core::flows::StepTable;
use casedesk_db::migrations::run_pending;
use casedesk_db::repositories::{LawyerRepository, LeadRepository, StepRepository};
use casedesk_db::{connect_with_settings, RecordStore, SeedDataset, SqliteRecordStore};
use chrono::Utc;

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

async fn sqlite_store(url: &str) -> SeedContractTestResult<Arc<dyn RecordStore>> {
    let pool = connect_with_settings(url, 1, 30).await.map_err(|error| error.to_string())?;
    run_pending(&pool).await.map_err(|error| error.to_string())?;
    Ok(Arc::new(SqliteRecordStore::new(pool)))
}

#[tokio::test]
async fn seeded_sqlite_store_passes_verification() -> SeedContractTestResult {
    let store = sqlite_store("sqlite::memory:").await?;
    let tabs = StoreConfig::default();

    let seeded = SeedDataset::load(store.clone(), &tabs, Some("https://casos.example/reporte"))
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(seeded.steps_seeded, SeedDataset::steps().len());
    require_eq!(seeded.lawyers_seeded, 4);

    let verification = SeedDataset::verify(store.clone(), &tabs, &StepId::new("INICIO"))
        .await
        .map_err(|error| error.to_string())?;
    require!(verification.all_present, "failed checks: {:?}", verification.checks);

    let steps = StepRepository::new(store.clone(), tabs.steps_tab.clone())
        .load_definitions()
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(steps, SeedDataset::steps(), "steps must survive a sqlite round trip");
    StepTable::from_definitions(steps, StepId::new("INICIO")).map_err(|error| error.to_string())?;

    let active = LawyerRepository::new(store, tabs.lawyers_tab.clone())
        .roster()
        .await
        .map_err(|error| error.to_string())?
        .into_iter()
        .filter(|lawyer| lawyer.active)
        .count();
    require_eq!(active, 3);
    Ok(())
}

#[tokio::test]
async fn seeding_survives_reopening_the_database_file() -> SeedContractTestResult {
    let dir = tempfile::tempdir().map_err(|error| error.to_string())?;
    let url = format!("sqlite://{}", dir.path().join("casedesk.db").display());
    let tabs = StoreConfig::default();

    let first = sqlite_store(&url).await?;
    SeedDataset::load(first, &tabs, None).await.map_err(|error| error.to_string())?;

    let reopened = sqlite_store(&url).await?;
    let again = SeedDataset::load(reopened.clone(), &tabs, None)
        .await
        .map_err(|error| error.to_string())?;
    require_eq!((again.steps_seeded, again.lawyers_seeded, again.config_keys_seeded), (0, 0, 0));

    let names = reopened.sheet_names().await.map_err(|error| error.to_string())?;
    require!(names.contains(&tabs.leads_tab), "missing {} in {names:?}", tabs.leads_tab);
    Ok(())
}

#[tokio::test]
async fn only_one_claim_wins_on_sqlite() -> SeedContractTestResult {
    let store = sqlite_store("sqlite::memory:").await?;
    let tabs = StoreConfig::default();
    SeedDataset::load(store.clone(), &tabs, None).await.map_err(|error| error.to_string())?;

    let leads = LeadRepository::new(store, tabs.leads_tab.clone());
    let mut lead = Lead::new(LeadId::for_phone("5215512345678"), "+5215512345678", "5215512345678");
    lead.status = ProcessingStatus::Pending;
    let record = leads.create(lead).await.map_err(|error| error.to_string())?;

    let first = leads.claim(&record, Utc::now()).await.map_err(|error| error.to_string())?;
    let second = leads.claim(&record, Utc::now()).await.map_err(|error| error.to_string())?;
    require!(first, "the first claimant must win");
    require!(!second, "a stale snapshot must not claim twice");

    let stored = leads
        .find_by_id(&record.lead.id.as_ref().map(|id| id.0.clone()).unwrap_or_default())
        .await
        .map_err(|error| error.to_string())?
        .ok_or_else(|| "lead disappeared".to_string())?;
    require_eq!(stored.lead.status, ProcessingStatus::Running);
    require!(stored.lead.claimed_at.is_some());
    Ok(())
}
