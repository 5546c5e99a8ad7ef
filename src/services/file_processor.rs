//! Tabular file ingestion (CSV and Excel) and the summary the model sees.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::utils::text_table;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "csv"];
const MAX_TEXT_LEN: usize = 1000;
const SAMPLE_RECORDS: usize = 5;
const PREVIEW_ROWS: usize = 10;

const NA_VALUES: [&str; 14] = [
    "", "#N/A", "#NA", "N/A", "n/a", "NA", "<NA>", "NULL", "null", "NaN", "nan", "-NaN", "None",
    "-nan",
];

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("Only .xlsx, .xls, and .csv files are supported")]
    Unsupported,

    #[error("File too large ({size_mb:.1} MB). Please use files smaller than {limit_mb} MB.")]
    TooLarge { size_mb: f64, limit_mb: f64 },

    #[error("Could not read CSV file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not read Excel file: {0}")]
    Excel(String),

    #[error("The file has no header row")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    fn is_missing(&self) -> bool {
        matches!(self, Cell::Empty) || matches!(self, Cell::Float(f) if f.is_nan())
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    fn display(&self) -> String {
        match self {
            Cell::Empty => "NaN".to_string(),
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => format_number(*v),
            Cell::Bool(v) => if *v { "True" } else { "False" }.to_string(),
            Cell::Text(v) => v.clone(),
            Cell::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Cell::Empty => Value::Null,
            Cell::Int(v) => json!(v),
            Cell::Float(v) if v.is_nan() => Value::Null,
            Cell::Float(v) => json!(v),
            Cell::Bool(v) => json!(v),
            Cell::Text(v) => json!(v),
            Cell::DateTime(v) => json!(v.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    /// CSV fields carry no types; infer them the way a spreadsheet user would expect.
    fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if NA_VALUES.contains(&trimmed) {
            return Cell::Empty;
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Cell::Int(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Cell::Float(v);
        }
        match trimmed {
            "True" | "TRUE" | "true" => Cell::Bool(true),
            "False" | "FALSE" | "false" => Cell::Bool(false),
            _ => Cell::Text(raw.to_string()),
        }
    }
}

fn format_number(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{v:.1}");
    }
    let s = format!("{v:.6}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// A loaded sheet: header plus rows, every row as wide as the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    fn column(&self, idx: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().map(move |r| &r[idx])
    }

    pub fn dtype(&self, idx: usize) -> &'static str {
        let mut missing = false;
        let (mut ints, mut floats, mut bools, mut dates, mut other) = (0, 0, 0, 0, 0);

        for cell in self.column(idx) {
            match cell {
                c if c.is_missing() => missing = true,
                Cell::Int(_) => ints += 1,
                Cell::Float(_) => floats += 1,
                Cell::Bool(_) => bools += 1,
                Cell::DateTime(_) => dates += 1,
                _ => other += 1,
            }
        }

        let present = ints + floats + bools + dates + other;
        if present == 0 {
            "float64"
        } else if ints == present && !missing {
            "int64"
        } else if ints + floats == present {
            "float64"
        } else if bools == present && !missing {
            "bool"
        } else if dates == present {
            "datetime64[ns]"
        } else {
            "object"
        }
    }

    fn is_numeric(&self, idx: usize) -> bool {
        matches!(self.dtype(idx), "int64" | "float64")
    }

    fn missing(&self, idx: usize) -> usize {
        self.column(idx).filter(|c| c.is_missing()).count()
    }

    /// Render rows with a leading positional index.
    fn preview(&self, limit: usize) -> String {
        let mut headers = vec![String::new()];
        headers.extend(self.columns.iter().cloned());

        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, row)| {
                let mut line = vec![i.to_string()];
                line.extend(row.iter().map(Cell::display));
                line
            })
            .collect();

        text_table::render(&headers, &rows)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub p25: Option<f64>,
    #[serde(rename = "50%")]
    pub p50: Option<f64>,
    #[serde(rename = "75%")]
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

impl NumericSummary {
    fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.total_cmp(b));
        let count = values.len();

        let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
        let std = match (mean, count) {
            (Some(m), n) if n > 1 => {
                let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
                Some(var.sqrt())
            }
            _ => None,
        };

        Self {
            count,
            mean,
            std,
            min: values.first().copied(),
            p25: quantile(&values, 0.25),
            p50: quantile(&values, 0.5),
            p75: quantile(&values, 0.75),
            max: values.last().copied(),
        }
    }

    fn rows(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("count", Some(self.count as f64)),
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("25%", self.p25),
            ("50%", self.p50),
            ("75%", self.p75),
            ("max", self.max),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub rows: usize,
    pub original_rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub sample_data: Vec<Map<String, Value>>,
    pub file_size_mb: f64,
    pub numeric_stats: Option<BTreeMap<String, NumericSummary>>,
    pub missing_values: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub text: String,
    pub stats: FileStats,
}

pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Strip any client-supplied directories from an upload name.
pub fn safe_file_name(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.trim_start_matches('\u{feff}').to_string(),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Table, FileError> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if columns.is_empty() {
        return Err(FileError::Empty);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(Cell::parse).collect());
    }

    Ok(Table::new(unnamed(columns), rows))
}

fn unnamed(columns: Vec<String>) -> Vec<String> {
    columns
        .into_iter()
        .enumerate()
        .map(|(i, c)| if c.trim().is_empty() { format!("Unnamed: {i}") } else { c })
        .collect()
}

fn excel_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(v) => Cell::Int(*v),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Cell::Int(*v as i64),
        Data::Float(v) => Cell::Float(*v),
        Data::Bool(v) => Cell::Bool(*v),
        Data::String(v) => Cell::Text(v.clone()),
        Data::DateTime(v) => v
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(v) | Data::DurationIso(v) => Cell::Text(v.clone()),
    }
}

fn read_excel(bytes: &[u8]) -> Result<Table, FileError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| FileError::Excel(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| FileError::Excel("workbook has no sheets".into()))?
        .map_err(|e| FileError::Excel(e.to_string()))?;

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .ok_or(FileError::Empty)?
        .iter()
        .map(|c| match c {
            Data::Empty => String::new(),
            other => other.to_string(),
        })
        .collect();

    let rows = rows.map(|r| r.iter().map(excel_cell).collect()).collect();
    Ok(Table::new(unnamed(columns), rows))
}

pub fn load_table(extension: &str, bytes: &[u8]) -> Result<Table, FileError> {
    match extension {
        "csv" => read_csv(bytes),
        "xlsx" | "xls" => read_excel(bytes),
        _ => Err(FileError::Unsupported),
    }
}

/// Parse an upload and build the statistics and text summary for the model.
pub fn process_file(
    filename: &str,
    bytes: &[u8],
    max_upload_mb: f64,
    max_rows: usize,
) -> Result<ProcessedFile, FileError> {
    let extension = extension_of(filename).ok_or(FileError::Unsupported)?;

    let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
    info!(file = %filename, size_mb = %format!("{size_mb:.1}"), "Processing file");
    if size_mb > max_upload_mb {
        return Err(FileError::TooLarge {
            size_mb,
            limit_mb: max_upload_mb,
        });
    }

    let mut table = load_table(&extension, bytes)?;

    let original_rows = table.rows.len();
    if original_rows > max_rows {
        info!(rows = original_rows, kept = max_rows, "Large file, sampling leading rows");
        table.rows.truncate(max_rows);
    }

    for row in &mut table.rows {
        for cell in row.iter_mut() {
            if let Cell::Text(text) = cell {
                if text.chars().count() > MAX_TEXT_LEN {
                    *text = text.chars().take(MAX_TEXT_LEN).collect();
                }
            }
        }
    }

    let stats = build_stats(&table, original_rows, size_mb);
    let text = render_summary(filename, &table, &stats);

    Ok(ProcessedFile { text, stats })
}

fn build_stats(table: &Table, original_rows: usize, size_mb: f64) -> FileStats {
    let numeric: Vec<usize> = (0..table.columns.len())
        .filter(|&i| table.is_numeric(i))
        .collect();

    let numeric_stats = (!numeric.is_empty()).then(|| {
        numeric
            .iter()
            .map(|&i| {
                let values = table.column(i).filter_map(Cell::as_f64).collect();
                (table.columns[i].clone(), NumericSummary::from_values(values))
            })
            .collect()
    });

    FileStats {
        rows: table.rows.len(),
        original_rows,
        columns: table.columns.len(),
        column_names: table.columns.clone(),
        dtypes: (0..table.columns.len())
            .map(|i| (table.columns[i].clone(), table.dtype(i).to_string()))
            .collect(),
        sample_data: table
            .rows
            .iter()
            .take(SAMPLE_RECORDS)
            .map(|row| {
                table
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Cell::to_json))
                    .collect()
            })
            .collect(),
        file_size_mb: (size_mb * 100.0).round() / 100.0,
        numeric_stats,
        missing_values: (0..table.columns.len())
            .map(|i| (table.columns[i].clone(), table.missing(i)))
            .collect(),
    }
}

fn render_summary(filename: &str, table: &Table, stats: &FileStats) -> String {
    let mut text = format!("File: {filename} ({} MB)\n", stats.file_size_mb);

    if stats.original_rows != stats.rows {
        let _ = writeln!(
            text,
            "Total Rows: {} (showing first {} for analysis)\nColumns: {}",
            stats.original_rows, stats.rows, stats.columns
        );
    } else {
        let _ = writeln!(text, "Rows: {}, Columns: {}", stats.rows, stats.columns);
    }

    let _ = write!(
        text,
        "Column names: {}\n\nSample data (first {PREVIEW_ROWS} rows):\n{}\n",
        stats.column_names.join(", "),
        table.preview(PREVIEW_ROWS)
    );

    if let Some(numeric) = &stats.numeric_stats {
        // Keep the sheet's column order rather than the map's.
        let ordered: Vec<(&String, &NumericSummary)> = table
            .columns
            .iter()
            .filter_map(|c| numeric.get(c).map(|s| (c, s)))
            .collect();

        let mut headers = vec![String::new()];
        headers.extend(ordered.iter().map(|(c, _)| (*c).clone()));

        let rows: Vec<Vec<String>> = (0..8)
            .map(|r| {
                let mut line = vec![ordered[0].1.rows()[r].0.to_string()];
                line.extend(
                    ordered
                        .iter()
                        .map(|(_, s)| s.rows()[r].1.map(format_number).unwrap_or("NaN".into())),
                );
                line
            })
            .collect();

        let _ = write!(
            text,
            "\nSummary statistics for numeric columns:\n{}\n\n",
            text_table::render(&headers, &rows)
        );
    }

    let missing: Vec<(&String, usize)> = table
        .columns
        .iter()
        .filter_map(|c| stats.missing_values.get(c).map(|n| (c, *n)))
        .filter(|(_, n)| *n > 0)
        .collect();

    if !missing.is_empty() {
        text.push_str("\nMissing values per column:\n");
        for (column, count) in missing {
            let _ = writeln!(text, "- {column}: {count} missing values");
        }
    }

    if stats.columns == 0 {
        warn!(file = %filename, "File has no columns");
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Name,Age,Salary,Active\n\
                       Ali,30,1000.5,True\n\
                       Sara,25,,False\n\
                       Omar,35,3000,True\n";

    #[test]
    fn csv_stats_match_dataframe_semantics() {
        let processed = process_file("staff.csv", CSV.as_bytes(), 50.0, 10_000).unwrap();
        let stats = &processed.stats;

        assert_eq!(stats.rows, 3);
        assert_eq!(stats.columns, 4);
        assert_eq!(stats.column_names, vec!["Name", "Age", "Salary", "Active"]);
        assert_eq!(stats.dtypes["Age"], "int64");
        assert_eq!(stats.dtypes["Salary"], "float64");
        assert_eq!(stats.dtypes["Active"], "bool");
        assert_eq!(stats.dtypes["Name"], "object");
        assert_eq!(stats.missing_values["Salary"], 1);
        assert_eq!(stats.sample_data.len(), 3);
        assert_eq!(stats.sample_data[1]["Salary"], Value::Null);

        let numeric = stats.numeric_stats.as_ref().unwrap();
        assert_eq!(numeric.len(), 2);

        let age = &numeric["Age"];
        assert_eq!(age.count, 3);
        assert_eq!(age.mean, Some(30.0));
        assert_eq!(age.std, Some(5.0));
        assert_eq!(age.p25, Some(27.5));
        assert_eq!(age.p50, Some(30.0));
        assert_eq!(age.max, Some(35.0));

        assert_eq!(numeric["Salary"].count, 2);
    }

    #[test]
    fn text_summary_follows_the_expected_layout() {
        let processed = process_file("staff.csv", CSV.as_bytes(), 50.0, 10_000).unwrap();
        let text = processed.text;

        assert!(text.starts_with("File: staff.csv (0 MB)\nRows: 3, Columns: 4\n"));
        assert!(text.contains("Column names: Name, Age, Salary, Active\n\nSample data (first 10 rows):\n"));
        assert!(text.contains("\nSummary statistics for numeric columns:\n"));
        assert!(text.ends_with("\nMissing values per column:\n- Salary: 1 missing values\n"));
    }

    #[test]
    fn large_files_are_sampled() {
        let mut csv = String::from("n\n");
        for i in 0..25 {
            let _ = writeln!(csv, "{i}");
        }

        let processed = process_file("big.csv", csv.as_bytes(), 50.0, 10).unwrap();
        assert_eq!(processed.stats.rows, 10);
        assert_eq!(processed.stats.original_rows, 25);
        assert!(
            processed
                .text
                .contains("Total Rows: 25 (showing first 10 for analysis)\nColumns: 1\n")
        );
    }

    #[test]
    fn long_text_is_truncated() {
        let csv = format!("note\n{}\n", "x".repeat(1500));
        let processed = process_file("notes.csv", csv.as_bytes(), 50.0, 10_000).unwrap();

        let sample = &processed.stats.sample_data[0]["note"];
        assert_eq!(sample.as_str().unwrap().len(), 1000);
    }

    #[test]
    fn latin1_csv_is_accepted() {
        let bytes = b"City\nS\xe3o Paulo\n";
        let processed = process_file("cities.csv", bytes, 50.0, 10_000).unwrap();
        assert_eq!(processed.stats.sample_data[0]["City"], "S\u{e3}o Paulo");
    }

    #[test]
    fn unsupported_and_oversized_files_are_rejected() {
        assert!(matches!(
            process_file("report.pdf", b"x", 50.0, 10),
            Err(FileError::Unsupported)
        ));

        let big = vec![b'a'; 2 * 1024 * 1024];
        let err = process_file("big.csv", &big, 1.0, 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "File too large (2.0 MB). Please use files smaller than 1 MB."
        );
    }

    #[test]
    fn upload_names_lose_their_directories() {
        assert_eq!(safe_file_name("../../etc/passwd.csv").as_deref(), Some("passwd.csv"));
        assert_eq!(safe_file_name("C:\\Users\\me\\data.xlsx").as_deref(), Some("data.xlsx"));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(extension_of("Data.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(extension_of("notes.txt"), None);
    }

    #[test]
    fn numbers_format_compactly() {
        assert_eq!(format_number(3.0), "3.0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(f64::NAN), "NaN");
    }
}
