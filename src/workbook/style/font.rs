use crate::workbook::xml_escape;

pub const DEFAULT_FONT_NAME: &str = "Calibri";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Font {
    pub bold: bool,
    pub italic: bool,
    /// Twentieths of a point, so fractional sizes hash.
    pub size: u32,
    pub name: String,
}

impl Default for Font {
    fn default() -> Self {
        Font {
            bold: false,
            italic: false,
            size: 220,
            name: DEFAULT_FONT_NAME.into(),
        }
    }
}

impl Font {
    pub fn points(&self) -> f64 {
        self.size as f64 / 20.0
    }

    pub(crate) fn set_points(&mut self, pt: f64) {
        self.size = (pt * 20.0).round() as u32;
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<font>");
        if self.bold {
            xml.push_str("<b/>");
        }
        if self.italic {
            xml.push_str("<i/>");
        }
        xml.push_str(&format!("<sz val=\"{}\"/>", self.points()));
        xml.push_str(&format!("<name val=\"{}\"/>", xml_escape(&self.name)));
        xml.push_str("</font>");
        xml
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_xml_carries_weight_and_size() {
        let mut font = Font {
            bold: true,
            ..Font::default()
        };
        font.set_points(14.0);
        assert_eq!(
            font.to_xml(),
            "<font><b/><sz val=\"14\"/><name val=\"Calibri\"/></font>"
        );
    }

    #[test]
    fn half_points_survive() {
        let mut font = Font::default();
        font.set_points(10.5);
        assert_eq!(font.size, 210);
        assert_eq!(font.points(), 10.5);
    }
}
