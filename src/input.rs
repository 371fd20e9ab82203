//! Tabular input loading
//!
//! Reads a CSV file into rows of owned fields. Rows are kept as-is; picking
//! the label column and rejecting blank or short rows is left to the
//! aggregation step.

use std::path::Path;

use tracing::{debug, info};

use crate::{GeoTallyError, Result};

const UTF8_BOM: char = '\u{feff}';

/// Which column holds the place name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelColumn {
    /// Zero-based column index
    Index(usize),
    /// Header name, requires a header row
    Name(String),
}

impl Default for LabelColumn {
    fn default() -> Self {
        LabelColumn::Index(0)
    }
}

/// Options for [`load_table`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    /// First row is a header and not counted
    pub has_header: bool,
    pub column: LabelColumn,
    pub delimiter: u8,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            column: LabelColumn::default(),
            delimiter: b',',
        }
    }
}

/// One data row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableRow {
    fields: Vec<String>,
}

impl TableRow {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Field at `index`, `None` if the row is too short
    #[must_use]
    pub fn field(&self, index: usize) -> Option<String> {
        self.fields.get(index).cloned()
    }
}

/// Loaded rows plus the resolved label column index
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Option<Vec<String>>,
    pub rows: Vec<TableRow>,
    pub label_index: usize,
}

impl Table {
    /// Raw label of `row`
    #[must_use]
    pub fn label_of(&self, row: &TableRow) -> Option<String> {
        row.field(self.label_index)
    }
}

/// Read a CSV table from `path`
pub fn load_table(path: impl AsRef<Path>, options: &TableOptions) -> Result<Table> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(GeoTallyError::input(format!(
            "Input file not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.has_header)
        .flexible(true)
        .delimiter(options.delimiter)
        .from_path(path)
        .map_err(|e| GeoTallyError::input(format!("Failed to open {}: {e}", path.display())))?;

    let headers = if options.has_header {
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| GeoTallyError::input(format!("Failed to read header row: {e}")))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches(UTF8_BOM) } else { h };
                h.trim().to_string()
            })
            .collect();
        info!("Header row: {}", headers.join(", "));
        Some(headers)
    } else {
        None
    };

    let label_index = resolve_column(&options.column, headers.as_deref())?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            GeoTallyError::input(format!("Failed to read row {}: {e}", line + 1))
        })?;
        let fields = record
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if i == 0 && rows.is_empty() && !options.has_header {
                    field.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    field.to_string()
                }
            })
            .collect();
        rows.push(TableRow::new(fields));
    }

    debug!(
        "Loaded {} rows from {} (label column {})",
        rows.len(),
        path.display(),
        label_index
    );

    Ok(Table {
        headers,
        rows,
        label_index,
    })
}

fn resolve_column(column: &LabelColumn, headers: Option<&[String]>) -> Result<usize> {
    match column {
        LabelColumn::Index(index) => Ok(*index),
        LabelColumn::Name(name) => {
            let headers = headers.ok_or_else(|| {
                GeoTallyError::input(format!(
                    "Column '{name}' selected by name but the table has no header row"
                ))
            })?;
            headers
                .iter()
                .position(|h| h == name.trim())
                .ok_or_else(|| GeoTallyError::input(format!("No column named '{name}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_with_header() {
        let file = csv_file("id,city\n1,Paris\n2,Lyon\n");
        let table = load_table(file.path(), &TableOptions::default()).unwrap();

        assert_eq!(
            table.headers,
            Some(vec!["id".to_string(), "city".to_string()])
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].field(1), Some("Paris".to_string()));
    }

    #[test]
    fn test_column_by_name() {
        let file = csv_file("id,city\n1,Paris\n");
        let options = TableOptions {
            column: LabelColumn::Name("city".to_string()),
            ..TableOptions::default()
        };
        let table = load_table(file.path(), &options).unwrap();

        assert_eq!(table.label_index, 1);
        assert_eq!(table.label_of(&table.rows[0]), Some("Paris".to_string()));
    }

    #[test]
    fn test_bom_is_stripped() {
        let file = csv_file("\u{feff}city,id\nParis,1\n");
        let options = TableOptions {
            column: LabelColumn::Name("city".to_string()),
            ..TableOptions::default()
        };
        let table = load_table(file.path(), &options).unwrap();
        assert_eq!(table.label_index, 0);

        let file = csv_file("\u{feff}Paris\nLyon\n");
        let options = TableOptions {
            has_header: false,
            ..TableOptions::default()
        };
        let table = load_table(file.path(), &options).unwrap();
        assert_eq!(table.rows[0].field(0), Some("Paris".to_string()));
    }

    #[test]
    fn test_short_rows_have_no_label() {
        let file = csv_file("id,city\n1,Paris\n2\n3,\n");
        let options = TableOptions {
            column: LabelColumn::Index(1),
            ..TableOptions::default()
        };
        let table = load_table(file.path(), &options).unwrap();

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.label_of(&table.rows[1]), None);
        assert_eq!(table.label_of(&table.rows[2]), Some(String::new()));
    }

    #[test]
    fn test_unknown_column_name() {
        let file = csv_file("id,city\n1,Paris\n");
        let options = TableOptions {
            column: LabelColumn::Name("province".to_string()),
            ..TableOptions::default()
        };
        let err = load_table(file.path(), &options).unwrap_err();
        assert!(matches!(err, GeoTallyError::Input { .. }));
    }

    #[test]
    fn test_name_without_header() {
        let file = csv_file("Paris\n");
        let options = TableOptions {
            has_header: false,
            column: LabelColumn::Name("city".to_string()),
            ..TableOptions::default()
        };
        assert!(load_table(file.path(), &options).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_table("/nonexistent/input.csv", &TableOptions::default()).unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }
}
