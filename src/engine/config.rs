use serde::Deserialize;

use crate::{Result, error::DentalXlsxError, stats::MonthKey};

/// Naming knobs for stored workbooks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Folder inside the bucket.
    pub key_prefix: String,
    /// File name before `_{YYYY-MM}.xlsx`.
    pub file_stem: String,
    /// Text after "<Month> <Year>" in every sheet title.
    pub title_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            key_prefix: "monthly".into(),
            file_stem: "dental_statistics".into(),
            title_suffix: "Dental Statistics".into(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON object; absent fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| DentalXlsxError::Config(e.to_string()))?;
        if !value.is_object() {
            return Err(DentalXlsxError::Config(format!(
                "expected a JSON object, found {value}"
            )));
        }
        let config: EngineConfig =
            serde_json::from_value(value).map_err(|e| DentalXlsxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_stem.trim().is_empty() {
            return Err(DentalXlsxError::Config("file_stem must not be empty".into()));
        }
        if self.key_prefix.split('/').any(|seg| seg == "..") {
            return Err(DentalXlsxError::Config(format!(
                "key_prefix '{}' escapes the bucket",
                self.key_prefix
            )));
        }
        Ok(())
    }

    /// `dental_statistics_2024-02.xlsx`
    pub fn file_name(&self, period: MonthKey) -> String {
        format!("{}_{period}.xlsx", self.file_stem)
    }

    /// `monthly/dental_statistics_2024-02.xlsx`
    pub fn object_key(&self, period: MonthKey) -> String {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            self.file_name(period)
        } else {
            format!("{prefix}/{}", self.file_name(period))
        }
    }
}
