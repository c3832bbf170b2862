//! The month workbook's domain rules: which parameters are tallied, how a
//! sheet is laid out, how one day is written and how the Total sheet is
//! rebuilt.
//!
//! Every workbook stage takes the [`Workbook`](crate::workbook::Workbook) by
//! value and hands it back, so a caller holding the month lock owns the whole
//! read-modify-write in one place.

pub mod aggregate;
pub mod parameter;
pub mod period;
pub mod record;
pub mod schema;
pub mod writer;

pub use aggregate::recompute_totals;
pub use parameter::Parameter;
pub use period::MonthKey;
pub use record::DailyRecord;
pub use schema::{SheetLayout, TOTAL_SHEET, ensure_sheet};
pub use writer::{write_day, write_record};
