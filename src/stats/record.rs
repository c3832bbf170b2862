use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    Result,
    error::DentalXlsxError,
    stats::parameter::{PARAM_COUNT, Parameter},
};

/// One contributor's tallies for one day.
///
/// Values are indexed by [`Parameter::index`]. A parameter the submission did
/// not carry is 0, never "keep what the sheet had".
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    date: NaiveDate,
    user_id: Option<String>,
    values: [f64; PARAM_COUNT],
}

/// Wire shape of a stored statistics row.
#[derive(Deserialize)]
struct RawRecord {
    date: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(flatten)]
    fields: HashMap<String, Value>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        DailyRecord {
            date,
            user_id: None,
            values: [0.0; PARAM_COUNT],
        }
    }

    /// Builds a record from an ISO-8601 (`YYYY-MM-DD`) date string.
    pub fn parse_date(date: &str) -> Result<Self> {
        NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map(DailyRecord::new)
            .map_err(|_| DentalXlsxError::InvalidDate(date.to_string()))
    }

    /// Decodes the JSON row the form layer stores. Unknown fields are ignored;
    /// missing or null parameters are 0.
    pub fn from_json(value: Value) -> Result<Self> {
        let raw: RawRecord = serde_json::from_value(value)
            .map_err(|e| DentalXlsxError::InvalidRecord(e.to_string()))?;
        let mut record = DailyRecord::parse_date(&raw.date)?;
        record.user_id = raw.user_id;

        for param in Parameter::ALL {
            let v = match raw.fields.get(param.field()) {
                None | Some(Value::Null) => 0.0,
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(other) => {
                    warn!(field = param.field(), value = %other, "non-numeric tally treated as 0");
                    0.0
                }
            };
            record.values[param.index()] = v;
        }
        Ok(record)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| DentalXlsxError::InvalidRecord(e.to_string()))?;
        DailyRecord::from_json(value)
    }

    /// Sets one tally. NaN and infinities cannot be stored in a cell and
    /// count as 0.
    pub fn with(mut self, param: Parameter, value: f64) -> Self {
        self.values[param.index()] = if value.is_finite() {
            value
        } else {
            warn!(field = param.field(), value, "non-finite tally treated as 0");
            0.0
        };
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn value(&self, param: Parameter) -> f64 {
        self.values[param.index()]
    }

    /// Parameters paired with their values, in row order.
    pub fn values(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        Parameter::ALL.into_iter().map(|p| (p, self.values[p.index()]))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_and_null_fields_are_zero() {
        let record = DailyRecord::from_json(json!({
            "id": "abc",
            "user_id": "u1",
            "date": "2024-02-05",
            "extractions": 3,
            "others": 1,
            "gic": null,
            "created_at": "2024-02-05T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.day(), 5);
        assert_eq!(record.user_id(), Some("u1"));
        assert_eq!(record.value(Parameter::Extractions), 3.0);
        assert_eq!(record.value(Parameter::Others), 1.0);
        assert_eq!(record.value(Parameter::Gic), 0.0);
        assert_eq!(record.value(Parameter::InwardPatients), 0.0);
        assert_eq!(record.values().count(), PARAM_COUNT);
    }

    #[test]
    fn non_finite_tallies_count_as_zero() {
        let record = DailyRecord::parse_date("2024-02-05")
            .unwrap()
            .with(Parameter::Extractions, f64::NAN)
            .with(Parameter::Scaling, f64::INFINITY)
            .with(Parameter::Others, 2.0);
        assert_eq!(record.value(Parameter::Extractions), 0.0);
        assert_eq!(record.value(Parameter::Scaling), 0.0);
        assert_eq!(record.value(Parameter::Others), 2.0);
    }

    #[test]
    fn strings_in_numeric_fields_count_as_zero() {
        let record =
            DailyRecord::from_json_str(r#"{"date":"2024-02-05","scaling":"4"}"#).unwrap();
        assert_eq!(record.value(Parameter::Scaling), 0.0);
    }

    #[test]
    fn malformed_dates_are_rejected() {
        for bad in ["2024-02-30", "05/02/2024", "", "2024-2"] {
            assert!(matches!(
                DailyRecord::parse_date(bad),
                Err(DentalXlsxError::InvalidDate(_))
            ));
        }
        assert!(DailyRecord::from_json(json!({"extractions": 1})).is_err());
    }
}
