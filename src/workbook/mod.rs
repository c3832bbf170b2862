use std::{
    collections::HashMap,
    io::{Cursor, Seek, Write},
};

use zip::{ZipWriter, write::SimpleFileOptions};

use crate::{
    Result,
    error::DentalXlsxError,
    workbook::{cell::CellValue, sheet::Sheet, style::StyleRegistry},
};
pub mod cell;
pub mod sheet;
pub mod style;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const RELS_DOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/custom-properties" Target="docProps/custom.xml"/>"#,
    r#"</Relationships>"#,
);

pub(crate) const CUSTOM_PROPS_PATH: &str = "docProps/custom.xml";

/// Custom property name prefix recording which contributor id owns a sheet.
pub(crate) const OWNER_PROPERTY_PREFIX: &str = "contributor:";

/// Well-known format id every user-defined custom property carries.
const CUSTOM_PROPERTY_FMTID: &str = "{D5CDD505-2E9C-101B-9397-08002B2CF9AE}";

fn custom_props_xml<'a>(owners: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut props = String::new();
    // pid 0 and 1 are reserved.
    for (pid, (sheet, owner)) in (2..).zip(owners) {
        let name = xml_escape(&format!("{OWNER_PROPERTY_PREFIX}{sheet}"));
        let owner = xml_escape(owner);
        props.push_str(&format!(
            r#"<property fmtid="{CUSTOM_PROPERTY_FMTID}" pid="{pid}" name="{name}"><vt:lpwstr>{owner}</vt:lpwstr></property>"#
        ));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" "#,
            r#"xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
            r#"{}"#,
            r#"</Properties>"#,
        ),
        props
    )
}

fn workbook_xml(order: &[String]) -> String {
    let mut sheets = String::new();
    for (i, name) in order.iter().enumerate() {
        let sheet_id = i + 1;
        let r_id = format!("rId{}", i + 1);
        let escaped_name = xml_escape(name);
        sheets.push_str(&format!(
            r#"<sheet name="{escaped_name}" sheetId="{sheet_id}" r:id="{r_id}"/>"#
        ));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<bookViews><workbookView activeTab="0"/></bookViews>"#,
            r#"<sheets>{}</sheets>"#,
            r#"<calcPr fullCalcOnLoad="1"/>"#,
            r#"</workbook>"#,
        ),
        sheets
    )
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut rels = String::new();

    for i in 1..=sheet_count {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }

    let styles_id = sheet_count + 1;
    rels.push_str(&format!(
        r#"<Relationship Id="rId{styles_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#
    ));

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"{}"#,
            r#"</Relationships>"#,
        ),
        rels
    )
}

fn content_types_xml(sheet_count: usize) -> String {
    let mut overrides = String::new();

    for i in 1..=sheet_count {
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
            r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
            r#"<Default Extension="xml" ContentType="application/xml"/>"#,
            r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
            r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
            r#"<Override PartName="/docProps/custom.xml" ContentType="application/vnd.openxmlformats-officedocument.custom-properties+xml"/>"#,
            r#"{}"#,
            r#"</Types>"#,
        ),
        overrides
    )
}

/// A whole workbook held in memory. Sheet names are unique ignoring ASCII
/// case, the way spreadsheet applications compare them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: HashMap<String, Sheet>,
    insertion_order: Vec<String>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    /// Parses an OOXML package.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        crate::reader::XlsxReader::from_bytes(bytes)?.into_workbook()
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        self.insertion_order
            .iter()
            .find(|n| n.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn contains_sheet(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.resolve(name).and_then(|n| self.sheets.get(n))
    }

    pub fn get_sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let key = self.resolve(name)?.to_string();
        self.sheets.get_mut(&key)
    }

    pub fn add_sheet(&mut self, name: &str) -> Result<&mut Sheet> {
        self.insert_sheet(Sheet::new(name))?;
        self.get_sheet_mut(name)
            .ok_or_else(|| DentalXlsxError::NotFound(format!("Sheet {name} not found!!")))
    }

    pub fn insert_sheet(&mut self, sheet: Sheet) -> Result<()> {
        let name = sheet.name().to_string();
        if self.contains_sheet(&name) {
            return Err(DentalXlsxError::AlreadyExists(format!(
                "Sheet '{name}' already exists"
            )));
        }
        self.insertion_order.push(name.clone());
        self.sheets.insert(name, sheet);
        Ok(())
    }

    /// Name of the sheet recorded as belonging to `contributor_id`.
    pub fn sheet_owned_by(&self, contributor_id: &str) -> Option<&str> {
        self.sheets()
            .find(|s| s.owner() == Some(contributor_id))
            .map(Sheet::name)
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.insertion_order
    }

    /// Sheets in tab order.
    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.insertion_order
            .iter()
            .filter_map(|name| self.sheets.get(name))
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Serializes the workbook into an XLSX package.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let count = self.insertion_order.len();

        zip_write_str(&mut zip, "[Content_Types].xml", &content_types_xml(count), options)?;
        zip_write_str(&mut zip, "_rels/.rels", RELS_DOT_RELS, options)?;
        zip_write_str(
            &mut zip,
            "xl/workbook.xml",
            &workbook_xml(&self.insertion_order),
            options,
        )?;
        zip_write_str(
            &mut zip,
            "xl/_rels/workbook.xml.rels",
            &workbook_rels_xml(count),
            options,
        )?;

        // Styles are interned while the sheets render, so the sheet parts go
        // first and styles.xml last.
        let mut style_reg = StyleRegistry::new();
        for (i, sheet) in self.sheets().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            sheet.write_xml(&mut zip, &mut style_reg)?;
        }
        zip_write_str(&mut zip, "xl/styles.xml", &style_reg.to_xml(), options)?;

        let owners = self
            .sheets()
            .filter_map(|s| s.owner().map(|owner| (s.name(), owner)));
        zip_write_str(&mut zip, CUSTOM_PROPS_PATH, &custom_props_xml(owners), options)?;

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

pub fn make_cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letters(col), row)
}

/// Spreadsheet column name for a 1-based column: 1 is `A`, 26 is `Z`,
/// 27 is `AA`. Bijective base 26, so there is no zero digit.
pub fn col_to_letters(col: u32) -> String {
    let mut result = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        result.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    result.reverse();
    result.into_iter().map(char::from).collect()
}

/// Inverse of [`col_to_letters`]; ignores a trailing row number.
pub fn letters_to_col(cell_ref: &str) -> Option<u32> {
    let letters = cell_ref.trim_end_matches(|c: char| c.is_ascii_digit());
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    letters
        .bytes()
        .try_fold(0u32, |acc, b| acc.checked_mul(26)?.checked_add((b - b'A') as u32 + 1))
}

pub(crate) fn xml_escape(s: &str) -> String {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn write_cell<W: Write>(
    w: &mut W,
    cell_ref: &str,
    value: &CellValue,
    style_idx: Option<usize>,
) -> Result<()> {
    let s = match style_idx {
        Some(0) | None => String::new(),
        Some(n) => format!(" s=\"{n}\""),
    };

    match value {
        CellValue::Blank => {
            write!(w, "<c r=\"{cell_ref}\"{s}/>")?;
        }
        CellValue::Number(n) if !n.is_finite() => {
            write!(w, "<c r=\"{cell_ref}\"{s} t=\"e\"><v>#NUM!</v></c>")?;
        }
        CellValue::Number(n) => {
            write!(w, "<c r=\"{cell_ref}\"{s}><v>{n}</v></c>")?;
        }
        CellValue::Text(text) => {
            let escaped = xml_escape(text);
            let space = if text.trim() != text {
                " xml:space=\"preserve\""
            } else {
                ""
            };
            write!(
                w,
                "<c r=\"{cell_ref}\"{s} t=\"inlineStr\"><is><t{space}>{escaped}</t></is></c>"
            )?;
        }
        CellValue::Bool(b) => {
            let val = if *b { 1 } else { 0 };
            write!(w, "<c r=\"{cell_ref}\"{s} t=\"b\"><v>{val}</v></c>")?;
        }
        CellValue::Formula { expr, cached } => {
            let escaped = xml_escape(expr);
            match cached.filter(|v| v.is_finite()) {
                Some(v) => write!(w, "<c r=\"{cell_ref}\"{s}><f>{escaped}</f><v>{v}</v></c>")?,
                None => write!(w, "<c r=\"{cell_ref}\"{s}><f>{escaped}</f></c>")?,
            }
        }
    }
    Ok(())
}

pub(crate) fn zip_write_str<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    path: &str,
    content: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(path, options)?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_are_bijective_base_26() {
        assert_eq!(col_to_letters(1), "A");
        assert_eq!(col_to_letters(26), "Z");
        assert_eq!(col_to_letters(27), "AA");
        assert_eq!(col_to_letters(52), "AZ");
        assert_eq!(col_to_letters(53), "BA");
        assert_eq!(col_to_letters(702), "ZZ");
        assert_eq!(col_to_letters(703), "AAA");
        assert_eq!(col_to_letters(0), "");
    }

    #[test]
    fn letters_parse_back_to_columns() {
        for col in [1, 2, 26, 27, 33, 52, 702, 703, 16384] {
            assert_eq!(letters_to_col(&col_to_letters(col)), Some(col));
        }
        assert_eq!(letters_to_col("AG12"), Some(33));
        assert_eq!(letters_to_col("12"), None);
        assert_eq!(letters_to_col("a1"), None);
    }

    #[test]
    fn cell_refs_put_letters_before_row() {
        assert_eq!(make_cell_ref(4, 6), "F4");
        assert_eq!(make_cell_ref(21, 30), "AD21");
    }

    #[test]
    fn escape_only_allocates_when_needed() {
        assert_eq!(xml_escape("Dr Smith"), "Dr Smith");
        assert_eq!(xml_escape("A&B <x>"), "A&amp;B &lt;x&gt;");
    }

    #[test]
    fn sheet_names_are_case_insensitive() {
        let mut wb = Workbook::new();
        wb.add_sheet("Alice").unwrap();
        assert!(wb.contains_sheet("alice"));
        assert!(matches!(
            wb.add_sheet("ALICE"),
            Err(DentalXlsxError::AlreadyExists(_))
        ));
        assert_eq!(wb.sheet_names(), ["Alice".to_string()]);
    }

    #[test]
    fn formula_cells_carry_cached_results() {
        let mut out = Vec::new();
        write_cell(&mut out, "AG4", &CellValue::formula("SUM(B4:AF4)", Some(9.0)), None).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<c r=\"AG4\"><f>SUM(B4:AF4)</f><v>9</v></c>"
        );
    }

    #[test]
    fn non_finite_numbers_become_error_cells() {
        let mut out = Vec::new();
        write_cell(&mut out, "B4", &CellValue::num(f64::NAN), None).unwrap();
        write_cell(&mut out, "C4", &CellValue::formula("1/0", Some(f64::INFINITY)), None).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<c r=\"B4\" t=\"e\"><v>#NUM!</v></c><c r=\"C4\"><f>1/0</f></c>"
        );
    }

    #[test]
    fn padded_text_keeps_its_spaces() {
        let mut out = Vec::new();
        write_cell(&mut out, "A1", &CellValue::text(" Dr Smith "), None).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<c r=\"A1\" t=\"inlineStr\"><is><t xml:space=\"preserve\"> Dr Smith </t></is></c>"
        );

        let mut out = Vec::new();
        write_cell(&mut out, "A1", &CellValue::text("Dr Smith"), None).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("xml:space"));
    }

    #[test]
    fn owners_are_written_as_custom_properties() {
        let mut wb = Workbook::new();
        wb.add_sheet("A&B").unwrap().set_owner("u-1");
        wb.add_sheet("Total").unwrap();
        assert_eq!(wb.sheet_owned_by("u-1"), Some("A&B"));
        assert_eq!(wb.sheet_owned_by("u-2"), None);

        let xml = custom_props_xml(
            wb.sheets()
                .filter_map(|s| s.owner().map(|owner| (s.name(), owner))),
        );
        assert!(xml.contains(
            r#"pid="2" name="contributor:A&amp;B"><vt:lpwstr>u-1</vt:lpwstr></property>"#
        ));
        assert_eq!(xml.matches("<property ").count(), 1);
    }

    #[test]
    fn package_lists_every_sheet() {
        let mut wb = Workbook::new();
        wb.add_sheet("Alice").unwrap().set(1, 1, CellValue::num(1.0));
        wb.add_sheet("Total").unwrap();
        let bytes = wb.to_bytes().unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "docProps/custom.xml",
            "xl/worksheets/sheet1.xml",
            "xl/worksheets/sheet2.xml",
        ] {
            assert!(names.iter().any(|n| n == part), "missing {part}");
        }
        assert!(archive.by_name("xl/worksheets/sheet3.xml").is_err());
    }
}
