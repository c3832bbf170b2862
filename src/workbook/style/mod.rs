use std::collections::HashMap;

use crate::workbook::style::font::Font;
pub mod font;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

impl HorizontalAlign {
    pub(crate) fn as_xml_attr(&self) -> &'static str {
        match self {
            HorizontalAlign::Left => "left",
            HorizontalAlign::Center => "center",
            HorizontalAlign::Right => "right",
        }
    }

    pub(crate) fn from_xml_attr(s: &str) -> Option<Self> {
        match s {
            "left" => Some(HorizontalAlign::Left),
            "center" => Some(HorizontalAlign::Center),
            "right" => Some(HorizontalAlign::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Style {
    pub font: Font,
    pub align: Option<HorizontalAlign>,
}

impl Style {
    pub fn new() -> Self {
        Style::default()
    }

    pub fn bold(mut self) -> Self {
        self.font.bold = true;
        self
    }
    pub fn italic(mut self) -> Self {
        self.font.italic = true;
        self
    }
    pub fn font_size(mut self, pt: u32) -> Self {
        self.font.size = pt * 20;
        self
    }
    pub fn center(mut self) -> Self {
        self.align = Some(HorizontalAlign::Center);
        self
    }
}

type XfKey = (usize, Option<HorizontalAlign>);

/// Interns fonts and cell formats while a workbook is serialized; index 0 is
/// always the default format.
pub struct StyleRegistry {
    fonts: Vec<Font>,
    font_index: HashMap<Font, usize>,
    xfs: Vec<XfKey>,
    xf_index: HashMap<XfKey, usize>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        let mut reg = StyleRegistry {
            fonts: Vec::new(),
            font_index: HashMap::new(),
            xfs: Vec::new(),
            xf_index: HashMap::new(),
        };
        reg.register(&Style::default());
        reg
    }

    pub fn register(&mut self, style: &Style) -> usize {
        let font_id = self.intern_font(style.font.clone());
        let key = (font_id, style.align);
        if let Some(&i) = self.xf_index.get(&key) {
            return i;
        }
        let i = self.xfs.len();
        self.xf_index.insert(key, i);
        self.xfs.push(key);
        i
    }

    fn intern_font(&mut self, font: Font) -> usize {
        if let Some(&i) = self.font_index.get(&font) {
            return i;
        }
        let i = self.fonts.len();
        self.font_index.insert(font.clone(), i);
        self.fonts.push(font);
        i
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        out.push_str(
            "<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\n",
        );

        out.push_str(&format!("<fonts count=\"{}\">\n", self.fonts.len()));
        for font in &self.fonts {
            out.push_str(&format!("{}\n", font.to_xml()));
        }
        out.push_str("</fonts>\n");

        // Both reserved fills must be present for Excel to accept the part.
        out.push_str("<fills count=\"2\">\n");
        out.push_str("<fill><patternFill patternType=\"none\"/></fill>\n");
        out.push_str("<fill><patternFill patternType=\"gray125\"/></fill>\n");
        out.push_str("</fills>\n");

        out.push_str("<borders count=\"1\">\n");
        out.push_str("<border><left/><right/><top/><bottom/><diagonal/></border>\n");
        out.push_str("</borders>\n");

        out.push_str("<cellStyleXfs count=\"1\">\n");
        out.push_str("<xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/>\n");
        out.push_str("</cellStyleXfs>\n");

        out.push_str(&format!("<cellXfs count=\"{}\">\n", self.xfs.len()));
        for (font_id, align) in &self.xfs {
            let apply_font = if *font_id > 0 { " applyFont=\"1\"" } else { "" };
            match align {
                Some(a) => out.push_str(&format!(
                    "<xf numFmtId=\"0\" fontId=\"{font_id}\" fillId=\"0\" borderId=\"0\" xfId=\"0\"{apply_font} applyAlignment=\"1\"><alignment horizontal=\"{}\"/></xf>\n",
                    a.as_xml_attr()
                )),
                None => out.push_str(&format!(
                    "<xf numFmtId=\"0\" fontId=\"{font_id}\" fillId=\"0\" borderId=\"0\" xfId=\"0\"{apply_font}/>\n"
                )),
            }
        }
        out.push_str("</cellXfs>\n");

        out.push_str("<cellStyles count=\"1\">\n");
        out.push_str("<cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/>\n");
        out.push_str("</cellStyles>\n");

        out.push_str("</styleSheet>");
        out
    }
}
