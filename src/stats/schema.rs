use tracing::{debug, warn};

use crate::{
    Result,
    error::DentalXlsxError,
    stats::{
        parameter::Parameter,
        period::MonthKey,
    },
    workbook::{Workbook, cell::CellValue, col_to_letters, sheet::Sheet, style::Style},
};

/// Name of the roll-up sheet. No contributor may use it.
pub const TOTAL_SHEET: &str = "Total";

pub const TITLE_ROW: u32 = 1;
pub const HEADER_ROW: u32 = 3;
/// Column holding parameter labels; day `d` lives in column `d + 1`.
pub const LABEL_COL: u32 = 1;

const MAX_SHEET_NAME_CHARS: usize = 31;
const LABEL_WIDTH: f64 = 25.0;
const COLUMN_WIDTH: f64 = 15.0;

/// Geometry and title shared by every sheet of one month's workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub period: MonthKey,
    pub days: u32,
    pub title: String,
}

impl SheetLayout {
    pub fn new(period: MonthKey, title_suffix: &str) -> Self {
        SheetLayout {
            period,
            days: period.days_in_month(),
            title: format!("{} {} {}", period.month_name(), period.year(), title_suffix),
        }
    }

    pub fn day_col(day: u32) -> u32 {
        day + 1
    }

    pub fn first_day_col(&self) -> u32 {
        Self::day_col(1)
    }

    pub fn last_day_col(&self) -> u32 {
        Self::day_col(self.days)
    }

    pub fn total_col(&self) -> u32 {
        self.days + 2
    }

    /// `SUM(B{row}:{last day column}{row})`.
    pub fn row_total_formula(&self, row: u32) -> String {
        format!(
            "SUM({}{row}:{}{row})",
            col_to_letters(self.first_day_col()),
            col_to_letters(self.last_day_col())
        )
    }
}

/// Re-stamps a row's total column with the sum formula and its current result.
pub fn stamp_row_total(sheet: &mut Sheet, layout: &SheetLayout, row: u32) {
    let sum = sheet.row_sum(row, layout.first_day_col(), layout.last_day_col());
    sheet.set(
        row,
        layout.total_col(),
        CellValue::formula(layout.row_total_formula(row), Some(sum)),
    );
}

/// Returns the workbook with `name` present. An existing sheet is left
/// untouched; a new one gets the title, header and parameter rows.
pub fn ensure_sheet(mut workbook: Workbook, name: &str, layout: &SheetLayout) -> Result<Workbook> {
    if workbook.contains_sheet(name) {
        return Ok(workbook);
    }
    let sheet = workbook.add_sheet(name)?;
    stamp_layout(sheet, layout);
    debug!(sheet = name, month = %layout.period, "created sheet");
    Ok(workbook)
}

fn stamp_layout(sheet: &mut Sheet, layout: &SheetLayout) {
    let total_col = layout.total_col();

    sheet.set_styled(
        TITLE_ROW,
        LABEL_COL,
        CellValue::text(layout.title.as_str()),
        Style::new().bold().font_size(14).center(),
    );
    sheet.merge_cells(&format!("A{TITLE_ROW}:{}{TITLE_ROW}", col_to_letters(total_col)));

    let header = Style::new().bold().center();
    sheet.set(HEADER_ROW, LABEL_COL, CellValue::text("Parameter"));
    for day in 1..=layout.days {
        sheet.set_styled(
            HEADER_ROW,
            SheetLayout::day_col(day),
            CellValue::num(day as f64),
            header.clone(),
        );
    }
    sheet.set_styled(HEADER_ROW, total_col, CellValue::text("Total"), header);

    let label = Style::new().bold();
    for param in Parameter::ALL {
        let row = param.row();
        sheet.set_styled(row, LABEL_COL, CellValue::text(param.label()), label.clone());
        stamp_row_total(sheet, layout, row);
    }

    for col in 1..=total_col {
        sheet.set_column_width(col, COLUMN_WIDTH);
    }
    sheet.set_column_width(LABEL_COL, LABEL_WIDTH);
}

/// Finds or creates the sheet belonging to `contributor_id` and returns it
/// with its name.
///
/// A contributor keeps the sheet recorded as theirs even if their display
/// name changes. Otherwise the sheet is named from the display name. When
/// that name is already taken by someone else, a ` (2)`, ` (3)`, ... suffix
/// is appended. Names differing only in case, in characters sheet names
/// cannot hold or past the 31st character count as taken. An unowned sheet
/// whose name matches exactly is adopted.
pub fn claim_sheet(
    workbook: Workbook,
    contributor_id: &str,
    display_name: &str,
    layout: &SheetLayout,
) -> Result<(Workbook, String)> {
    if let Some(name) = workbook.sheet_owned_by(contributor_id) {
        let name = name.to_string();
        return Ok((workbook, name));
    }

    let base = contributor_sheet_name(display_name)?;
    let name = match workbook.get_sheet(&base) {
        None => base,
        Some(sheet) if sheet.owner().is_none() && sheet.name() == base => base,
        Some(sheet) => {
            let name = free_suffixed_name(&workbook, &base);
            warn!(
                contributor_id,
                taken = sheet.name(),
                sheet = %name,
                "sheet name already in use, using a suffixed name"
            );
            name
        }
    };

    let mut workbook = ensure_sheet(workbook, &name, layout)?;
    workbook
        .get_sheet_mut(&name)
        .ok_or_else(|| DentalXlsxError::NotFound(format!("Sheet {name} not found!!")))?
        .set_owner(contributor_id);
    Ok((workbook, name))
}

fn free_suffixed_name(workbook: &Workbook, base: &str) -> String {
    (2u32..)
        .map(|n| {
            let suffix = format!(" ({n})");
            let keep = MAX_SHEET_NAME_CHARS.saturating_sub(suffix.chars().count());
            let stem: String = base.chars().take(keep).collect();
            format!("{}{suffix}", stem.trim_end())
        })
        .find(|candidate| !workbook.contains_sheet(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Maps a contributor's display name onto a legal, non-reserved sheet name:
/// `[]:*?/\` become `_`, surrounding apostrophes and whitespace go, and the
/// result is cut to 31 characters.
pub fn contributor_sheet_name(display_name: &str) -> Result<String> {
    let cleaned: String = display_name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'').trim();
    let name: String = trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect();
    let name = name.trim_end().to_string();

    if name.is_empty() {
        return Err(DentalXlsxError::ReservedSheetName(display_name.to_string()));
    }
    if name.eq_ignore_ascii_case(TOTAL_SHEET) {
        return Err(DentalXlsxError::ReservedSheetName(name));
    }
    Ok(name)
}
