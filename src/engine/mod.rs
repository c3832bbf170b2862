//! Orchestrates one submission: load the month's workbook, make sure the
//! contributor and Total sheets exist, write the day, rebuild Total and store
//! the whole workbook back.

use tracing::{debug, error, info, warn};

use crate::{
    Result,
    error::{Absence, DentalXlsxError},
    stats::{
        DailyRecord, MonthKey, SheetLayout, TOTAL_SHEET, recompute_totals,
        schema::{claim_sheet, contributor_sheet_name},
        write_record,
    },
    storage::{Contributor, ContributorDirectory, ObjectStore, StorageError},
    workbook::{Workbook, XLSX_CONTENT_TYPE},
};
pub mod builder;
pub mod config;
pub mod locks;

use builder::StatsEngineBuilder;
use config::EngineConfig;
use locks::MonthLocks;

/// A month's workbook as found in storage.
#[derive(Debug, Clone)]
pub struct LoadedWorkbook {
    pub workbook: Workbook,
    /// Whether a stored blob existed. Only used for logging.
    pub existed: bool,
}

/// Result of the best-effort spreadsheet update that follows a record write.
#[derive(Debug)]
pub enum SyncOutcome {
    Updated,
    Failed(DentalXlsxError),
}

impl SyncOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, SyncOutcome::Updated)
    }
}

pub struct StatsEngine<S, D> {
    pub(crate) store: S,
    pub(crate) directory: D,
    pub(crate) config: EngineConfig,
    pub(crate) locks: MonthLocks,
}

impl<S, D> StatsEngine<S, D>
where
    S: ObjectStore,
    D: ContributorDirectory,
{
    pub fn builder(store: S, directory: D) -> StatsEngineBuilder<S, D> {
        StatsEngineBuilder::new(store, directory)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn object_key(&self, year: i32, month: u32) -> Result<String> {
        Ok(self.config.object_key(MonthKey::new(year, month)?))
    }

    /// Fetches and parses the stored workbook, or starts an empty one when
    /// the month has none yet.
    pub async fn load_workbook(&self, period: MonthKey) -> Result<LoadedWorkbook> {
        let key = self.config.object_key(period);
        match self.store.fetch(&key).await? {
            Some(bytes) => Ok(LoadedWorkbook {
                workbook: Workbook::from_bytes(&bytes)?,
                existed: true,
            }),
            None => {
                debug!(key = %key, "no stored workbook, starting a new one");
                Ok(LoadedWorkbook {
                    workbook: Workbook::new(),
                    existed: false,
                })
            }
        }
    }

    /// Serializes the workbook and upserts it under the month's key.
    pub async fn persist_workbook(&self, period: MonthKey, workbook: &Workbook) -> Result<()> {
        let key = self.config.object_key(period);
        let bytes = workbook.to_bytes()?;
        self.store.store(&key, bytes, XLSX_CONTENT_TYPE).await?;
        Ok(())
    }

    /// Applies one daily submission to the month's workbook and stores it.
    ///
    /// Submissions for the same month are serialized; the stored workbook is
    /// read, changed and written while the month lock is held. Each
    /// contributor id gets its own sheet, see [`claim_sheet`].
    pub async fn generate_monthly_excel(
        &self,
        year: i32,
        month: u32,
        contributor_id: &str,
        contributor_name: &str,
        record: &DailyRecord,
    ) -> Result<()> {
        let period = MonthKey::new(year, month)?;
        let layout = SheetLayout::new(period, &self.config.title_suffix);
        // Unusable names fail before any I/O.
        contributor_sheet_name(contributor_name)?;
        if !period.contains(record.date()) {
            return Err(DentalXlsxError::DateOutsideMonth {
                date: record.date().to_string(),
                year,
                month,
            });
        }
        if let Some(user) = record.user_id().filter(|u| *u != contributor_id) {
            warn!(record_user = user, contributor_id, "record owner differs from contributor");
        }

        let _guard = self.locks.lock(period).await;

        let contributors = self.directory.list_contributors().await?;
        let LoadedWorkbook { workbook, existed } = self.load_workbook(period).await?;
        report_directory_drift(&workbook, &contributors, contributor_id);

        let (workbook, sheet_name) =
            claim_sheet(workbook, contributor_id, contributor_name, &layout)?;
        let workbook = write_record(workbook, &sheet_name, &layout, record)?;
        let workbook = recompute_totals(workbook, &layout)?;
        self.persist_workbook(period, &workbook).await?;

        info!(
            key = %self.config.object_key(period),
            sheet = %sheet_name,
            day = record.day(),
            "workbook {}",
            if existed { "updated" } else { "created" }
        );
        Ok(())
    }

    /// Runs [`generate_monthly_excel`](Self::generate_monthly_excel) as a side
    /// effect of a record write that has already succeeded. Failures are
    /// logged and returned, never raised.
    pub async fn sync_after_submission(
        &self,
        year: i32,
        month: u32,
        contributor_id: &str,
        contributor_name: &str,
        record: &DailyRecord,
    ) -> SyncOutcome {
        match self
            .generate_monthly_excel(year, month, contributor_id, contributor_name, record)
            .await
        {
            Ok(()) => SyncOutcome::Updated,
            Err(e) => {
                error!(error = %e, year, month, contributor_id, "spreadsheet update failed");
                SyncOutcome::Failed(e)
            }
        }
    }

    /// Raw bytes of the month's workbook for delivery. A month with no
    /// workbook, or a bucket that was never provisioned, is
    /// [`DentalXlsxError::NoWorkbook`]; everything else is a storage error.
    pub async fn download_monthly_excel(&self, year: i32, month: u32) -> Result<Vec<u8>> {
        let period = MonthKey::new(year, month)?;
        let key = self.config.object_key(period);

        let absence = match self.store.fetch(&key).await {
            Ok(Some(bytes)) => {
                debug!(key = %key, bytes = bytes.len(), "workbook downloaded");
                return Ok(bytes);
            }
            Ok(None) => Absence::ObjectMissing,
            Err(StorageError::BucketMissing(bucket)) => {
                error!(key = %key, bucket = %bucket, "storage bucket does not exist");
                Absence::BucketMissing
            }
            Err(e) => {
                error!(key = %key, error = %e, "workbook download failed");
                return Err(e.into());
            }
        };
        warn!(key = %key, cause = %absence, "no workbook for requested month");
        Err(DentalXlsxError::NoWorkbook { key, absence })
    }

    /// The month's workbook parsed into the grid model.
    pub async fn monthly_workbook(&self, year: i32, month: u32) -> Result<Workbook> {
        let bytes = self.download_monthly_excel(year, month).await?;
        Workbook::from_bytes(&bytes)
    }

    /// File name a consumer should save the download as.
    pub fn download_file_name(&self, year: i32, month: u32) -> Result<String> {
        Ok(self.config.file_name(MonthKey::new(year, month)?))
    }
}

/// The directory is advisory: sheets are neither created for listed
/// contributors nor removed for unlisted ones.
fn report_directory_drift(workbook: &Workbook, contributors: &[Contributor], submitter: &str) {
    if !contributors.iter().any(|c| c.id == submitter) {
        warn!(contributor_id = submitter, "submitter is not in the contributor directory");
    }
    for sheet in workbook.sheets() {
        let name = sheet.name();
        if name.eq_ignore_ascii_case(TOTAL_SHEET) {
            continue;
        }
        let listed = match sheet.owner() {
            Some(owner) => contributors.iter().any(|c| c.id == owner),
            None => contributors.iter().any(|c| {
                contributor_sheet_name(&c.display_name).is_ok_and(|n| n.eq_ignore_ascii_case(name))
            }),
        };
        if !listed {
            debug!(sheet = %name, owner = ?sheet.owner(), "sheet has no matching directory entry");
        }
    }
}
