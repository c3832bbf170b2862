use tracing::debug;

use crate::{
    Result,
    error::DentalXlsxError,
    stats::{
        parameter::{PARAM_COUNT, Parameter},
        schema::{SheetLayout, TOTAL_SHEET, ensure_sheet, stamp_row_total},
    },
    workbook::{Workbook, cell::CellValue, sheet::Sheet},
};

/// Per-(parameter, day) sums across contributor sheets.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotals {
    days: u32,
    sums: Vec<[f64; PARAM_COUNT]>,
}

impl DailyTotals {
    fn new(days: u32) -> Self {
        DailyTotals {
            days,
            sums: vec![[0.0; PARAM_COUNT]; days as usize],
        }
    }

    /// Adds every numeric tally of `sheet`. Text, formulas and missing cells
    /// count as 0, so short or partly filled sheets are fine.
    fn add_sheet(&mut self, sheet: &Sheet) {
        for day in 1..=self.days {
            let col = SheetLayout::day_col(day);
            for param in Parameter::ALL {
                if let Some(v) = sheet.number_at(param.row(), col) {
                    self.sums[(day - 1) as usize][param.index()] += v;
                }
            }
        }
    }

    pub fn get(&self, param: Parameter, day: u32) -> f64 {
        match day.checked_sub(1).and_then(|d| self.sums.get(d as usize)) {
            Some(row) => row[param.index()],
            None => 0.0,
        }
    }
}

/// Sums the same cell of every contributor sheet. Sheets are visited in
/// name order so the floating-point result does not depend on tab order.
pub fn collect_totals(workbook: &Workbook, layout: &SheetLayout) -> DailyTotals {
    let mut contributors: Vec<&Sheet> = workbook
        .sheets()
        .filter(|s| !s.name().eq_ignore_ascii_case(TOTAL_SHEET))
        .collect();
    contributors.sort_by(|a, b| a.name().cmp(b.name()));

    let mut totals = DailyTotals::new(layout.days);
    for sheet in &contributors {
        totals.add_sheet(sheet);
    }
    debug!(sheets = contributors.len(), month = %layout.period, "summed contributor sheets");
    totals
}

/// Rebuilds the Total sheet from scratch out of all contributor sheets,
/// creating it first if the month has none yet.
pub fn recompute_totals(workbook: Workbook, layout: &SheetLayout) -> Result<Workbook> {
    let totals = collect_totals(&workbook, layout);
    let mut workbook = ensure_sheet(workbook, TOTAL_SHEET, layout)?;
    let total = workbook
        .get_sheet_mut(TOTAL_SHEET)
        .ok_or_else(|| DentalXlsxError::NotFound(format!("Sheet {TOTAL_SHEET} not found!!")))?;

    for param in Parameter::ALL {
        for day in 1..=layout.days {
            total.clear(param.row(), SheetLayout::day_col(day));
        }
    }
    for param in Parameter::ALL {
        let row = param.row();
        for day in 1..=layout.days {
            total.set(
                row,
                SheetLayout::day_col(day),
                CellValue::num(totals.get(param, day)),
            );
        }
        stamp_row_total(total, layout, row);
    }
    Ok(workbook)
}
