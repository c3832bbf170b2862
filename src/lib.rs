//! Monthly dental statistics workbooks.
//!
//! Each month is one XLSX workbook with a sheet per contributor and a `Total`
//! sheet. A daily submission rewrites that contributor's day column and then
//! rebuilds `Total` from every contributor sheet.
//!
//! ```no_run
//! # async fn demo() -> dental_xlsx::Result<()> {
//! use dental_xlsx::{
//!     engine::StatsEngine,
//!     stats::{DailyRecord, Parameter},
//!     storage::{MemoryObjectStore, StaticDirectory},
//! };
//!
//! let engine = StatsEngine::builder(
//!     MemoryObjectStore::new("excel-reports"),
//!     StaticDirectory::default(),
//! )
//! .build()?;
//!
//! let record = DailyRecord::parse_date("2024-02-05")?.with(Parameter::Extractions, 3.0);
//! engine.generate_monthly_excel(2024, 2, "u1", "Alice", &record).await?;
//! let xlsx = engine.download_monthly_excel(2024, 2).await?;
//! # let _ = xlsx;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod reader;
pub mod stats;
pub mod storage;
pub mod workbook;

pub type Result<T> = std::result::Result<T, error::DentalXlsxError>;
