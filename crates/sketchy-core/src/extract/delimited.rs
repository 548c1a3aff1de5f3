use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvConverterConfig {
    /// Field name -> zero-based column index
    pub column_map: BTreeMap<String, usize>,
    #[serde(rename = "delim", default = "default_delimiter")]
    pub delimiter: char,
}

/// Splits one delimited line into named fields.
#[derive(Debug, Clone)]
pub struct CsvConverter {
    column_map: BTreeMap<String, usize>,
    delimiter: u8,
}

impl CsvConverter {
    pub fn new(config: &CsvConverterConfig) -> Result<Self> {
        if !config.delimiter.is_ascii() {
            return Err(ConfigError::InvalidExtractor(format!(
                "delimiter {:?} is not a single-byte character",
                config.delimiter
            )));
        }
        if config.column_map.is_empty() {
            return Err(ConfigError::InvalidExtractor(
                "columnMap is empty".to_string(),
            ));
        }
        Ok(Self {
            column_map: config.column_map.clone(),
            delimiter: config.delimiter as u8,
        })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.column_map.contains_key(name)
    }

    /// Map a raw line to `field -> text`.
    ///
    /// Comment lines (first non-blank character `#`), lines that are not
    /// UTF-8 or cannot be parsed, and lines too short for the column map all
    /// yield `None`.
    pub fn convert(&self, line: &[u8]) -> Option<BTreeMap<String, String>> {
        let line = std::str::from_utf8(line).ok()?;
        if line.trim().starts_with('#') {
            return None;
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(line.as_bytes());
        let record = reader.records().next()?.ok()?;

        let mut fields = BTreeMap::new();
        for (name, &index) in &self.column_map {
            fields.insert(name.clone(), record.get(index)?.to_string());
        }
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(delimiter: char) -> CsvConverter {
        CsvConverter::new(&CsvConverterConfig {
            column_map: BTreeMap::from([("ts".to_string(), 0), ("value".to_string(), 2)]),
            delimiter,
        })
        .unwrap()
    }

    #[test]
    fn test_convert_picks_mapped_columns() {
        let fields = converter(',').convert(b"10,ignored,3.5").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["ts"], "10");
        assert_eq!(fields["value"], "3.5");
    }

    #[test]
    fn test_quoted_fields_are_unquoted() {
        let fields = converter(',').convert(b"\"10\",\"a,b\",\"3.5\"").unwrap();
        assert_eq!(fields["value"], "3.5");
    }

    #[test]
    fn test_comment_and_short_lines() {
        let c = converter(',');
        assert!(c.convert(b"   #10,x,3.5").is_none());
        assert!(c.convert(b"10,x").is_none());
        assert!(c.convert(b"").is_none());
        assert!(c.convert(&[0xff, 0xfe, b',']).is_none());
    }

    #[test]
    fn test_custom_delimiter() {
        let fields = converter('|').convert(b"10|x|3.5").unwrap();
        assert_eq!(fields["ts"], "10");
    }

    #[test]
    fn test_rejects_multibyte_delimiter() {
        let config = CsvConverterConfig {
            column_map: BTreeMap::from([("ts".to_string(), 0)]),
            delimiter: '§',
        };
        assert!(CsvConverter::new(&config).is_err());
    }
}
