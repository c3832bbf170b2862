use std::fmt;

use thiserror::Error;
use zip::result::ZipError;

use crate::storage::StorageError;

/// Message shown to end users whenever a month cannot be exported.
pub const NO_WORKBOOK_MESSAGE: &str = "No excel sheet exists for the month selected.";

/// Why a month's workbook could not be found at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// The backing bucket/container has not been provisioned.
    BucketMissing,
    /// The bucket exists but holds no workbook for the month.
    ObjectMissing,
}

impl fmt::Display for Absence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Absence::BucketMissing => f.write_str("storage bucket is not configured"),
            Absence::ObjectMissing => f.write_str("no workbook stored for this month"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DentalXlsxError {
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("malformed workbook: {0}")]
    Xml(String),
    #[error("month {0} is not in 1..=12")]
    InvalidMonth(u32),
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unreadable daily record: {0}")]
    InvalidRecord(String),
    #[error("record date {date} is outside {year}-{month:02}")]
    DateOutsideMonth { date: String, year: i32, month: u32 },
    #[error("day {day} is outside 1..={days_in_month}")]
    DayOutOfRange { day: u32, days_in_month: u32 },
    #[error("sheet name '{0}' is reserved")]
    ReservedSheetName(String),
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("{key}: {absence}")]
    NoWorkbook { key: String, absence: Absence },
}

impl DentalXlsxError {
    /// Text safe to surface to an end user. Export failures of every kind
    /// collapse to the same message; `Display` keeps the detailed cause.
    pub fn user_message(&self) -> String {
        match self {
            DentalXlsxError::NoWorkbook { .. } | DentalXlsxError::Storage(_) => {
                NO_WORKBOOK_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_no_workbook(&self) -> bool {
        matches!(self, DentalXlsxError::NoWorkbook { .. })
    }
}

impl From<quick_xml::Error> for DentalXlsxError {
    fn from(e: quick_xml::Error) -> DentalXlsxError {
        DentalXlsxError::Xml(e.to_string())
    }
}

impl From<StorageError> for DentalXlsxError {
    fn from(e: StorageError) -> DentalXlsxError {
        DentalXlsxError::Storage(e.to_string())
    }
}
