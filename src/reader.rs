use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::Reader as XmlReader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;
use zip::ZipArchive;

use crate::{
    Result,
    error::DentalXlsxError,
    workbook::{
        CUSTOM_PROPS_PATH, OWNER_PROPERTY_PREFIX, Workbook,
        cell::{Cell, CellValue},
        letters_to_col,
        sheet::Sheet,
        style::{HorizontalAlign, Style},
    },
};

/// Column ranges wider than this in `<cols>` are layout defaults for the
/// rest of the sheet, not per-column widths worth keeping.
const MAX_COL_SPAN: u32 = 64;

#[inline]
fn attr_val(attr: &quick_xml::events::attributes::Attribute) -> String {
    let raw = std::str::from_utf8(attr.value.as_ref()).unwrap_or("");
    quick_xml::escape::unescape(raw)
        .unwrap_or_default()
        .into_owned()
}

#[inline]
fn text_val(e: &quick_xml::events::BytesText) -> String {
    let raw = std::str::from_utf8(e.as_ref()).unwrap_or("");
    quick_xml::escape::unescape(raw)
        .unwrap_or_default()
        .into_owned()
}

fn find_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| attr_val(&a))
}

fn malformed(part: &str, e: impl std::fmt::Display) -> DentalXlsxError {
    DentalXlsxError::Xml(format!("{part}: {e}"))
}

/// Parses an XLSX package held in memory into the grid model.
pub struct XlsxReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    sheet_paths: HashMap<String, String>,
    sheet_order: Vec<String>,
    shared_strings: Vec<String>,
    styles: Vec<Style>,
    owners: HashMap<String, String>,
}

impl<'a> XlsxReader<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let (sheet_order, rid_to_name) = parse_workbook(&mut archive)?;
        let rid_to_path = parse_workbook_rels(&mut archive)?;

        let sheet_paths: HashMap<String, String> = rid_to_name
            .into_iter()
            .filter_map(|(rid, name)| rid_to_path.get(&rid).map(|p| (name, p.clone())))
            .collect();

        let shared_strings = parse_shared_strings(&mut archive)?;
        let styles = parse_styles(&mut archive)?;
        let owners = parse_owners(&mut archive)?;

        Ok(XlsxReader {
            archive,
            sheet_paths,
            sheet_order,
            shared_strings,
            styles,
            owners,
        })
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_order
    }

    pub fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet> {
        let zip_path = self
            .sheet_paths
            .get(sheet_name)
            .ok_or_else(|| DentalXlsxError::NotFound(format!("sheet '{sheet_name}' not found")))?
            .clone();
        let xml = slurp_entry(&mut self.archive, &zip_path)?;
        let mut sheet = parse_sheet(
            sheet_name,
            &xml,
            &self.shared_strings,
            &self.styles,
        )
        .map_err(|e| malformed(&zip_path, e))?;
        if let Some(owner) = self.owners.get(sheet_name) {
            sheet.set_owner(owner);
        }
        Ok(sheet)
    }

    pub fn into_workbook(mut self) -> Result<Workbook> {
        let mut workbook = Workbook::new();
        for name in self.sheet_order.clone() {
            let sheet = self.read_sheet(&name)?;
            debug!(sheet = %name, rows = sheet.max_row(), "loaded sheet");
            workbook.insert_sheet(sheet)?;
        }
        Ok(workbook)
    }
}

#[derive(Clone, Copy)]
enum CellType {
    Number,
    SharedStr,
    Inline,
    Bool,
    Str,
    Error,
}

struct CellState {
    row: u32,
    col: u32,
    cell_type: CellType,
    style: usize,
    value_buf: String,
    formula: Option<String>,
}

fn parse_sheet(
    name: &str,
    xml: &[u8],
    shared_strings: &[String],
    styles: &[Style],
) -> std::result::Result<Sheet, quick_xml::Error> {
    let mut sheet = Sheet::new(name);
    let mut reader = XmlReader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut current_row = 0u32;
    let mut next_col = 1u32;
    let mut cell: Option<CellState> = None;
    let (mut in_v, mut in_t, mut in_f) = (false, false, false);

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                current_row = find_attr(e, b"r")
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(current_row + 1);
                next_col = 1;
            }

            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                let mut state = CellState {
                    row: current_row,
                    col: next_col,
                    cell_type: CellType::Number,
                    style: 0,
                    value_buf: String::new(),
                    formula: None,
                };
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"r" => {
                            let r = attr_val(&attr);
                            if let Some(col) = letters_to_col(&r) {
                                state.col = col;
                            }
                            if let Ok(row) = r.trim_start_matches(|c: char| c.is_ascii_uppercase()).parse() {
                                state.row = row;
                            }
                        }
                        b"t" => {
                            state.cell_type = match attr_val(&attr).as_str() {
                                "s" => CellType::SharedStr,
                                "inlineStr" => CellType::Inline,
                                "b" => CellType::Bool,
                                "str" => CellType::Str,
                                "e" => CellType::Error,
                                _ => CellType::Number,
                            }
                        }
                        b"s" => state.style = attr_val(&attr).parse().unwrap_or(0),
                        _ => {}
                    }
                }
                next_col = state.col + 1;
                if is_empty {
                    finish_cell(&mut sheet, state, shared_strings, styles);
                } else {
                    cell = Some(state);
                }
            }

            Event::Start(ref e) => match e.local_name().as_ref() {
                b"v" => in_v = true,
                b"t" => in_t = true,
                b"f" => {
                    in_f = true;
                    if let Some(state) = cell.as_mut() {
                        state.formula = Some(String::new());
                    }
                }
                _ => {}
            },

            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"f" => {
                    if let Some(state) = cell.as_mut() {
                        state.formula = Some(String::new());
                    }
                }
                b"mergeCell" => {
                    if let Some(range) = find_attr(e, b"ref") {
                        sheet.merge_cells(&range);
                    }
                }
                b"col" => read_col_width(&mut sheet, e),
                _ => {}
            },

            Event::Text(ref e) => {
                if let Some(state) = cell.as_mut() {
                    if in_f {
                        if let Some(f) = state.formula.as_mut() {
                            f.push_str(&text_val(e));
                        }
                    } else if in_v || in_t {
                        state.value_buf.push_str(&text_val(e));
                    }
                }
            }

            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_t = false,
                b"f" => in_f = false,
                b"c" => {
                    if let Some(state) = cell.take() {
                        finish_cell(&mut sheet, state, shared_strings, styles);
                    }
                }
                _ => {}
            },

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheet)
}

fn read_col_width(sheet: &mut Sheet, e: &BytesStart) {
    let min: Option<u32> = find_attr(e, b"min").and_then(|v| v.parse().ok());
    let max: Option<u32> = find_attr(e, b"max").and_then(|v| v.parse().ok());
    let width: Option<f64> = find_attr(e, b"width").and_then(|v| v.parse().ok());
    if let (Some(min), Some(max), Some(width)) = (min, max, width) {
        if max >= min && max - min < MAX_COL_SPAN {
            for col in min..=max {
                sheet.set_column_width(col, width);
            }
        }
    }
}

fn finish_cell(sheet: &mut Sheet, state: CellState, shared_strings: &[String], styles: &[Style]) {
    let raw = state.value_buf;
    let value = match state.formula {
        Some(expr) if !expr.trim().is_empty() => CellValue::Formula {
            expr,
            cached: raw.trim().parse().ok(),
        },
        // Shared-formula followers only carry their cached result.
        _ => match state.cell_type {
            CellType::SharedStr => {
                let idx: usize = raw.trim().parse().unwrap_or(usize::MAX);
                shared_strings
                    .get(idx)
                    .cloned()
                    .map(CellValue::Text)
                    .unwrap_or(CellValue::Blank)
            }
            CellType::Inline | CellType::Str | CellType::Error => CellValue::Text(raw),
            CellType::Bool => CellValue::Bool(raw.trim() == "1"),
            CellType::Number => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    CellValue::Blank
                } else {
                    trimmed
                        .parse()
                        .map(CellValue::Number)
                        .unwrap_or_else(|_| CellValue::Text(raw.clone()))
                }
            }
        },
    };

    let style = match state.style {
        0 => None,
        idx => styles
            .get(idx)
            .filter(|s| **s != Style::default())
            .cloned(),
    };
    sheet.insert_cell(state.row, state.col, Cell { value, style });
}

fn parse_workbook(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
) -> Result<(Vec<String>, HashMap<String, String>)> {
    let bytes = slurp_entry(archive, "xl/workbook.xml")?;
    let mut xml = XmlReader::from_reader(bytes.as_slice());
    xml.config_mut().trim_text(true);

    let mut order = Vec::new();
    let mut rid_map = HashMap::new();
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                let (mut name, mut rid) = (String::new(), String::new());
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = attr_val(&attr),
                        b"r:id" | b"id" => rid = attr_val(&attr),
                        _ => {}
                    }
                }
                if !name.is_empty() && !rid.is_empty() {
                    order.push(name.clone());
                    rid_map.insert(rid, name);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed("xl/workbook.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok((order, rid_map))
}

fn parse_workbook_rels(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<HashMap<String, String>> {
    let bytes = slurp_entry(archive, "xl/_rels/workbook.xml.rels")?;
    let mut xml = XmlReader::from_reader(bytes.as_slice());
    xml.config_mut().trim_text(true);

    let mut map = HashMap::new();
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let (mut id, mut target, mut is_sheet) = (String::new(), String::new(), false);
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr_val(&attr),
                        b"Target" => target = attr_val(&attr),
                        b"Type" => is_sheet = attr_val(&attr).ends_with("/worksheet"),
                        _ => {}
                    }
                }
                if is_sheet && !id.is_empty() {
                    map.insert(id, normalize_path(&target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed("xl/_rels/workbook.xml.rels", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(map)
}

fn parse_shared_strings(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<Vec<String>> {
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let bytes = slurp_entry(archive, "xl/sharedStrings.xml")?;
    let mut xml = XmlReader::from_reader(bytes.as_slice());
    xml.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.clone()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_t => current.push_str(&text_val(e)),
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed("xl/sharedStrings.xml", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Sheet name to owning contributor id, from the `contributor:` custom
/// properties. Packages written elsewhere usually have none.
fn parse_owners(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<HashMap<String, String>> {
    if archive.by_name(CUSTOM_PROPS_PATH).is_err() {
        return Ok(HashMap::new());
    }
    let bytes = slurp_entry(archive, CUSTOM_PROPS_PATH)?;
    let mut xml = XmlReader::from_reader(bytes.as_slice());
    xml.config_mut().trim_text(false);

    let mut owners = HashMap::new();
    let mut sheet: Option<String> = None;
    let mut in_value = false;
    let mut value = String::new();
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"property" => {
                    sheet = find_attr(e, b"name")
                        .and_then(|n| n.strip_prefix(OWNER_PROPERTY_PREFIX).map(str::to_string));
                    value.clear();
                }
                b"lpwstr" => in_value = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"property" => {
                    if let Some(name) = sheet.take() {
                        owners.insert(name, std::mem::take(&mut value));
                    }
                }
                b"lpwstr" => in_value = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_value => value.push_str(&text_val(e)),
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(CUSTOM_PROPS_PATH, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(owners)
}

#[derive(PartialEq)]
enum StyleSection {
    Other,
    Fonts,
    CellXfs,
}

/// Resolves every `cellXfs` entry into a [`Style`], keeping only the parts
/// the grid model understands (font and horizontal alignment).
fn parse_styles(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<Vec<Style>> {
    if archive.by_name("xl/styles.xml").is_err() {
        return Ok(Vec::new());
    }
    let bytes = slurp_entry(archive, "xl/styles.xml")?;
    let mut xml = XmlReader::from_reader(bytes.as_slice());
    xml.config_mut().trim_text(true);

    let mut section = StyleSection::Other;
    let mut fonts = Vec::new();
    let mut font = None;
    let mut xfs: Vec<(usize, Option<HorizontalAlign>)> = Vec::new();
    let mut buf = Vec::new();

    loop {
        let event = xml
            .read_event_into(&mut buf)
            .map_err(|e| malformed("xl/styles.xml", e))?;
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"fonts" => section = StyleSection::Fonts,
                b"cellXfs" => section = StyleSection::CellXfs,
                b"font" if section == StyleSection::Fonts => {
                    let f = crate::workbook::style::font::Font {
                        name: String::new(),
                        ..Default::default()
                    };
                    if is_empty {
                        fonts.push(f);
                    } else {
                        font = Some(f);
                    }
                }
                b"b" | b"i" => {
                    if let Some(f) = font.as_mut() {
                        let on = !matches!(find_attr(e, b"val").as_deref(), Some("0" | "false"));
                        if e.local_name().as_ref() == b"b" {
                            f.bold = on;
                        } else {
                            f.italic = on;
                        }
                    }
                }
                b"sz" => {
                    if let (Some(f), Some(pt)) = (
                        font.as_mut(),
                        find_attr(e, b"val").and_then(|v| v.parse::<f64>().ok()),
                    ) {
                        f.set_points(pt);
                    }
                }
                b"name" => {
                    if let (Some(f), Some(name)) = (font.as_mut(), find_attr(e, b"val")) {
                        f.name = name;
                    }
                }
                b"xf" if section == StyleSection::CellXfs => {
                    let font_id = find_attr(e, b"fontId")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    xfs.push((font_id, None));
                }
                b"alignment" if section == StyleSection::CellXfs => {
                    if let (Some(last), Some(h)) = (xfs.last_mut(), find_attr(e, b"horizontal")) {
                        last.1 = HorizontalAlign::from_xml_attr(&h);
                    }
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"font" => {
                    if let Some(mut f) = font.take() {
                        if f.name.is_empty() {
                            f.name = crate::workbook::style::font::DEFAULT_FONT_NAME.into();
                        }
                        fonts.push(f);
                    }
                }
                b"fonts" | b"cellXfs" => section = StyleSection::Other,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(xfs
        .into_iter()
        .map(|(font_id, align)| Style {
            font: fonts.get(font_id).cloned().unwrap_or_default(),
            align,
        })
        .collect())
}

fn slurp_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, path: &str) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(path)
        .map_err(|e| DentalXlsxError::Xml(format!("'{path}': {e}")))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn normalize_path(target: &str) -> String {
    let t = target.trim_start_matches('/');
    if t.starts_with("xl/") {
        t.to_string()
    } else {
        format!("xl/{t}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workbook_survives_a_package_roundtrip() {
        let mut wb = Workbook::new();
        {
            let sheet = wb.add_sheet("Dr A&B").unwrap();
            sheet.set_styled(1, 1, CellValue::text("Title"), Style::new().bold().font_size(14).center());
            sheet.merge_cells("A1:D1");
            sheet.set(4, 2, CellValue::num(3.0));
            sheet.set(4, 3, CellValue::num(1.5));
            sheet.set(4, 4, CellValue::formula("SUM(B4:C4)", Some(4.5)));
            sheet.set(5, 2, CellValue::bool(true));
            sheet.set(6, 1, CellValue::text("  indented"));
            sheet.set_column_width(1, 25.0);
            sheet.set_owner("u-7");
        }
        wb.add_sheet("Total").unwrap();

        let bytes = wb.to_bytes().unwrap();
        let loaded = Workbook::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, wb);
        assert_eq!(loaded.sheet_owned_by("u-7"), Some("Dr A&B"));
        assert_eq!(loaded.get_sheet("Total").unwrap().owner(), None);
    }

    #[test]
    fn reads_shared_strings_and_shared_formula_followers() {
        let sheet_xml = br#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="1"><c r="A1" t="s"><v>1</v></c><c r="B1" t="e"><v>#REF!</v></c></row>
<row r="4"><c r="C4"><f t="shared" ref="C4:C5" si="0">SUM(A4:B4)</f><v>3</v></c></row>
<row r="5"><c r="C5"><f t="shared" si="0"/><v>7</v></c><c r="D5" t="inlineStr"><is><t xml:space="preserve"> x </t></is></c></row>
</sheetData>
<mergeCells count="1"><mergeCell ref="A1:C1"/></mergeCells>
</worksheet>"#;
        let strings = vec!["zero".to_string(), "one".to_string()];
        let sheet = parse_sheet("s", sheet_xml, &strings, &[]).unwrap();

        assert_eq!(sheet.get(1, 1), Some(&CellValue::text("one")));
        assert_eq!(sheet.get(1, 2), Some(&CellValue::text("#REF!")));
        assert_eq!(sheet.get(4, 3), Some(&CellValue::formula("SUM(A4:B4)", Some(3.0))));
        assert_eq!(sheet.get(5, 3), Some(&CellValue::num(7.0)));
        assert_eq!(sheet.get(5, 4), Some(&CellValue::text(" x ")));
        assert_eq!(sheet.merges(), ["A1:C1".to_string()]);
    }

    #[test]
    fn cells_without_refs_follow_their_neighbours() {
        let sheet_xml = br#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c/><c><v>5</v></c></row></sheetData></worksheet>"#;
        let sheet = parse_sheet("s", sheet_xml, &[], &[]).unwrap();
        assert_eq!(sheet.number_at(1, 1), Some(1.0));
        assert_eq!(sheet.number_at(1, 2), Some(2.0));
        assert_eq!(sheet.get(2, 1), Some(&CellValue::Blank));
        assert_eq!(sheet.number_at(2, 2), Some(5.0));
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        assert!(Workbook::from_bytes(b"not a zip").is_err());
    }
}
