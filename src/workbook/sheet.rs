use std::collections::BTreeMap;
use std::io::Write;

use crate::{
    Result,
    workbook::{
        cell::{Cell, CellValue},
        make_cell_ref,
        style::{Style, StyleRegistry},
        write_cell, xml_escape,
    },
};

/// One worksheet held fully in memory. Rows and columns are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<(u32, u32), Cell>,
    merges: Vec<String>,
    col_widths: BTreeMap<u32, f64>,
    /// Contributor id the sheet belongs to, kept as a custom document property.
    owner: Option<String>,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Sheet {
            name: name.to_string(),
            cells: BTreeMap::new(),
            merges: Vec::new(),
            col_widths: BTreeMap::new(),
            owner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, contributor_id: &str) {
        self.owner = Some(contributor_id.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cells.get(&(row, col)).map(|c| &c.value)
    }

    /// Numeric content of a cell; text, formulas and gaps yield `None`.
    pub fn number_at(&self, row: u32, col: u32) -> Option<f64> {
        self.get(row, col).and_then(CellValue::as_number)
    }

    /// Replaces the value and keeps whatever style the cell already had.
    pub fn set(&mut self, row: u32, col: u32, value: CellValue) {
        match self.cells.get_mut(&(row, col)) {
            Some(c) => c.value = value,
            None => {
                self.cells.insert((row, col), Cell::new(value));
            }
        }
    }

    pub fn set_styled(&mut self, row: u32, col: u32, value: CellValue, style: Style) {
        self.cells.insert((row, col), Cell::styled(value, style));
    }

    pub(crate) fn insert_cell(&mut self, row: u32, col: u32, cell: Cell) {
        self.cells.insert((row, col), cell);
    }

    pub fn clear(&mut self, row: u32, col: u32) {
        if let Some(c) = self.cells.get_mut(&(row, col)) {
            c.value = CellValue::Blank;
        }
    }

    /// Writes `cells` left to right starting at column 1 of `row`.
    pub fn write_row(&mut self, row: u32, cells: Vec<CellValue>, style: Option<&Style>) {
        for (i, value) in cells.into_iter().enumerate() {
            let col = i as u32 + 1;
            match style {
                Some(s) => self.set_styled(row, col, value, s.clone()),
                None => self.set(row, col, value),
            }
        }
    }

    /// Sum of the numeric cells in `row` between two columns, inclusive.
    pub fn row_sum(&self, row: u32, first_col: u32, last_col: u32) -> f64 {
        self.cells
            .range((row, first_col)..=(row, last_col))
            .filter_map(|(_, c)| c.value.as_number())
            .sum()
    }

    pub fn merge_cells(&mut self, range: &str) {
        if !self.merges.iter().any(|m| m == range) {
            self.merges.push(range.to_string());
        }
    }

    pub fn merges(&self) -> &[String] {
        &self.merges
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.col_widths.insert(col, width);
    }

    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.col_widths.get(&col).copied()
    }

    pub fn max_row(&self) -> u32 {
        self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0)
    }

    pub fn max_col(&self) -> u32 {
        self.cells.keys().map(|(_, c)| *c).max().unwrap_or(0)
    }

    pub(crate) fn write_xml<W: Write>(&self, w: &mut W, styles: &mut StyleRegistry) -> Result<()> {
        write!(
            w,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
            )
        )?;
        if !self.cells.is_empty() {
            write!(
                w,
                "<dimension ref=\"A1:{}\"/>",
                make_cell_ref(self.max_row().max(1), self.max_col().max(1))
            )?;
        }
        write!(
            w,
            r#"<sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="15"/>"#
        )?;

        if !self.col_widths.is_empty() {
            write!(w, "<cols>")?;
            for (col, width) in &self.col_widths {
                write!(
                    w,
                    "<col min=\"{col}\" max=\"{col}\" width=\"{width}\" customWidth=\"1\"/>"
                )?;
            }
            write!(w, "</cols>")?;
        }

        write!(w, "<sheetData>")?;
        let mut open_row = None;
        for (&(row, col), cell) in &self.cells {
            if open_row != Some(row) {
                if open_row.is_some() {
                    write!(w, "</row>")?;
                }
                write!(w, "<row r=\"{row}\">")?;
                open_row = Some(row);
            }
            let style_idx = cell.style.as_ref().map(|s| styles.register(s));
            write_cell(w, &make_cell_ref(row, col), &cell.value, style_idx)?;
        }
        if open_row.is_some() {
            write!(w, "</row>")?;
        }
        write!(w, "</sheetData>")?;

        if !self.merges.is_empty() {
            write!(w, "<mergeCells count=\"{}\">", self.merges.len())?;
            for range in &self.merges {
                write!(w, "<mergeCell ref=\"{}\"/>", xml_escape(range))?;
            }
            write!(w, "</mergeCells>")?;
        }

        write!(
            w,
            "<pageMargins left=\"0.75\" right=\"0.75\" top=\"1\" bottom=\"1\" header=\"0.5\" footer=\"0.5\"/>\
             </worksheet>"
        )?;
        Ok(())
    }
}
