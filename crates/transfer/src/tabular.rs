//! Tabular export: records rendered as CSV or a JSON array before upload.

use serde_json::{Map, Value};

use crate::TransferError;

/// Output format for tabular records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    /// Delimited text with a header row.
    Csv { delimiter: u8 },
    /// JSON array of objects, one per record.
    JsonRecords,
}

impl Default for TabularFormat {
    fn default() -> Self {
        Self::Csv { delimiter: b',' }
    }
}

impl TabularFormat {
    /// Picks the export format from the destination key's extension.
    ///
    /// `.json` keys get JSON records, `.xlsx` is rejected, anything else is CSV.
    pub fn for_key(key: &str, delimiter: Option<u8>) -> Result<Self, TransferError> {
        let lower = key.to_ascii_lowercase();
        if lower.ends_with(".json") {
            Ok(Self::JsonRecords)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Err(TransferError::UnsupportedFormat(format!(
                "spreadsheet export is not supported: {key}"
            )))
        } else {
            Ok(Self::Csv {
                delimiter: delimiter.unwrap_or(b','),
            })
        }
    }
}

/// Renders `rows` in `format`.
///
/// CSV columns come from the first record; missing cells are left empty
/// and `null` renders as an empty cell.
pub fn export_records(
    rows: &[Map<String, Value>],
    format: TabularFormat,
) -> Result<Vec<u8>, TransferError> {
    match format {
        TabularFormat::JsonRecords => Ok(serde_json::to_vec(rows)?),
        TabularFormat::Csv { delimiter } => export_csv(rows, delimiter),
    }
}

fn export_csv(rows: &[Map<String, Value>], delimiter: u8) -> Result<Vec<u8>, TransferError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&String> = first.keys().collect();
    writer.write_record(columns.iter().map(|c| c.as_str()))?;

    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| row.get(c.as_str()).map(cell).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    writer.into_inner().map_err(|e| TransferError::Io(e.into_error()))
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Map<String, Value>> {
        vec![
            json!({"price": 10.5, "symbol": "AAPL", "note": null})
                .as_object()
                .unwrap()
                .clone(),
            json!({"price": 3, "symbol": "MSFT, Inc"})
                .as_object()
                .unwrap()
                .clone(),
        ]
    }

    #[test]
    fn csv_export_has_header_and_quotes() {
        let out = export_records(&rows(), TabularFormat::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        // serde_json::Map without preserve_order iterates keys sorted.
        assert_eq!(text, "note,price,symbol\n,10.5,AAPL\n,3,\"MSFT, Inc\"\n");
    }

    #[test]
    fn csv_export_custom_delimiter() {
        let out = export_records(&rows(), TabularFormat::Csv { delimiter: b'|' }).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("note|price|symbol\n"));
        assert!(text.contains("|3|MSFT, Inc"));
    }

    #[test]
    fn json_export_is_array() {
        let out = export_records(&rows(), TabularFormat::JsonRecords).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["symbol"], "MSFT, Inc");
    }

    #[test]
    fn empty_rows_export_nothing() {
        assert!(export_records(&[], TabularFormat::default()).unwrap().is_empty());
    }

    #[test]
    fn format_for_key() {
        assert_eq!(
            TabularFormat::for_key("exports/Prices.JSON", None).unwrap(),
            TabularFormat::JsonRecords
        );
        assert_eq!(
            TabularFormat::for_key("exports/prices.tsv", Some(b'\t')).unwrap(),
            TabularFormat::Csv { delimiter: b'\t' }
        );
        assert!(matches!(
            TabularFormat::for_key("report.xlsx", None),
            Err(TransferError::UnsupportedFormat(_))
        ));
    }
}
