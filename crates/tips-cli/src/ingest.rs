//! CSV ingestion: comma-separated, header row, rows with the literal
//! `?` missing-value token in any column dropped.
//!
//! Grounded on `data_utils.py::read_csv_data` / `_parse_data_point`:
//! every cell is tried as an integer first, falling back to a string.
//! The original also tries a float fallback; [`tips_hierarchy::AttrValue`]
//! has no float variant, so a cell that parses as a float but not an
//! integer is kept as a string, same as any other categorical value.

use std::path::Path;

use tips_hierarchy::AttrValue;

/// The literal token marking a missing value, per spec.md §6.
pub const MISSING_VALUE: &str = "?";

/// A parsed CSV file: the header row and every surviving data row.
pub struct Dataset {
    /// Column names, in file order.
    pub headers: Vec<String>,
    /// Parsed data rows, one [`AttrValue`] per column.
    pub rows: Vec<Vec<AttrValue>>,
}

/// Read and parse a dataset CSV from `path`.
pub fn read_csv(path: &Path) -> anyhow::Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .from_path(path)?;

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.is_empty() || record.iter().any(|field| field == MISSING_VALUE) {
            continue;
        }
        rows.push(record.iter().map(parse_cell).collect());
    }

    Ok(Dataset { headers, rows })
}

fn parse_cell(raw: &str) -> AttrValue {
    match raw.trim().parse::<i64>() {
        Ok(v) => AttrValue::Int(v),
        Err(_) => AttrValue::Str(raw.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn drops_rows_with_missing_value_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a,b,c").unwrap();
        writeln!(file, "1,2,3").unwrap();
        writeln!(file, "4,?,6").unwrap();
        writeln!(file, "7,8,nine").unwrap();
        file.flush().unwrap();

        let dataset = read_csv(file.path()).unwrap();
        assert_eq!(dataset.headers, vec!["a", "b", "c"]);
        assert_eq!(dataset.rows.len(), 2);
        assert_eq!(dataset.rows[0], vec![
            AttrValue::Int(1),
            AttrValue::Int(2),
            AttrValue::Int(3)
        ]);
        assert_eq!(dataset.rows[1][2], AttrValue::Str("nine".to_string()));
    }
}
