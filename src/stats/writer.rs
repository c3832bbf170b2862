use crate::{
    Result,
    error::DentalXlsxError,
    stats::{
        record::DailyRecord,
        schema::{SheetLayout, stamp_row_total},
    },
    workbook::{Workbook, cell::CellValue, sheet::Sheet},
};

/// Writes one day's column of a contributor sheet. Every parameter is
/// written, so a resubmission replaces the whole column.
pub fn write_day(
    sheet: &mut Sheet,
    layout: &SheetLayout,
    day: u32,
    record: &DailyRecord,
) -> Result<()> {
    if day == 0 || day > layout.days {
        return Err(DentalXlsxError::DayOutOfRange {
            day,
            days_in_month: layout.days,
        });
    }

    let col = SheetLayout::day_col(day);
    for (param, value) in record.values() {
        sheet.set(param.row(), col, CellValue::num(value));
        stamp_row_total(sheet, layout, param.row());
    }
    Ok(())
}

/// Workbook stage: writes `record` into `sheet_name` on the day its date names.
/// The date must lie in the layout's month; nothing is written otherwise.
pub fn write_record(
    mut workbook: Workbook,
    sheet_name: &str,
    layout: &SheetLayout,
    record: &DailyRecord,
) -> Result<Workbook> {
    if !layout.period.contains(record.date()) {
        return Err(DentalXlsxError::DateOutsideMonth {
            date: record.date().to_string(),
            year: layout.period.year(),
            month: layout.period.month(),
        });
    }
    let sheet = workbook
        .get_sheet_mut(sheet_name)
        .ok_or_else(|| DentalXlsxError::NotFound(format!("Sheet {sheet_name} not found!!")))?;
    write_day(sheet, layout, record.day(), record)?;
    Ok(workbook)
}
