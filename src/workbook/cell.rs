use crate::workbook::style::Style;

/// Value stored in a grid cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Every number is an f64, as in the file format.
    Number(f64),
    /// Written as an inline string, no sharedStrings part.
    Text(String),
    Bool(bool),
    /// Formula text without the leading `=`, with the last computed result.
    Formula { expr: String, cached: Option<f64> },
    Blank,
}

impl CellValue {
    pub fn num(v: f64) -> Self {
        CellValue::Number(v)
    }
    pub fn text(v: impl Into<String>) -> Self {
        CellValue::Text(v.into())
    }
    pub fn bool(v: bool) -> Self {
        CellValue::Bool(v)
    }
    pub fn formula(expr: impl Into<String>, cached: Option<f64>) -> Self {
        CellValue::Formula {
            expr: expr.into(),
            cached,
        }
    }

    /// Plain numeric content. Formula results are not numbers for aggregation.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn formula_expr(&self) -> Option<&str> {
        match self {
            CellValue::Formula { expr, .. } => Some(expr),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: Option<Style>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Cell { value, style: None }
    }

    pub fn styled(value: CellValue, style: Style) -> Self {
        Cell {
            value,
            style: Some(style),
        }
    }
}
