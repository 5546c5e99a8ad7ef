use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// A single decoded cell from an arbitrary result set.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
    Bytes(Vec<u8>),
}

impl CellValue {
    /// Rendering used in the plain-text result tables.
    pub fn to_display(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(v) => if *v { "True" } else { "False" }.to_string(),
            CellValue::Int(v) => v.to_string(),
            CellValue::UInt(v) => v.to_string(),
            CellValue::Float(v) => v.to_string(),
            CellValue::Decimal(v) => v.to_string(),
            CellValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            CellValue::Time(v) => v.format("%H:%M:%S").to_string(),
            CellValue::Text(v) => v.clone(),
            CellValue::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{b:02X}")).collect();
                format!("0x{hex}")
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(v) => json!(v),
            CellValue::Int(v) => json!(v),
            CellValue::UInt(v) => json!(v),
            CellValue::Float(v) => json!(v),
            // Kept as a string so money columns never lose precision.
            CellValue::Decimal(v) => json!(v.to_string()),
            CellValue::DateTime(v) => json!(v.format("%Y-%m-%dT%H:%M:%S").to_string()),
            CellValue::Date(v) => json!(v.format("%Y-%m-%d").to_string()),
            CellValue::Time(v) => json!(v.format("%H:%M:%S").to_string()),
            CellValue::Text(v) => json!(v),
            CellValue::Bytes(_) => json!(self.to_display()),
        }
    }
}

fn typed(row: &MySqlRow, idx: usize, type_name: &str) -> Result<CellValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => CellValue::Bool(row.try_get(idx)?),
        t if t.ends_with("UNSIGNED") => CellValue::UInt(row.try_get(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => CellValue::Int(row.try_get(idx)?),
        "FLOAT" => CellValue::Float(row.try_get::<f32, _>(idx)? as f64),
        "DOUBLE" => CellValue::Float(row.try_get(idx)?),
        "DECIMAL" => CellValue::Decimal(row.try_get(idx)?),
        "DATETIME" => CellValue::DateTime(row.try_get(idx)?),
        "TIMESTAMP" => CellValue::DateTime(row.try_get::<DateTime<Utc>, _>(idx)?.naive_utc()),
        "DATE" => CellValue::Date(row.try_get(idx)?),
        "TIME" => CellValue::Time(row.try_get(idx)?),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            CellValue::Bytes(row.try_get(idx)?)
        }
        _ => CellValue::Text(row.try_get(idx)?),
    };

    Ok(value)
}

/// Decode one cell without knowing the column type up front.
///
/// The declared column type picks the decoder. When that fails (YEAR,
/// out-of-range TIME values, unusual collations) the raw bytes are read as
/// text, which is what the text protocol sends anyway.
pub fn decode_cell(row: &MySqlRow, idx: usize) -> CellValue {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(_) => {}
        Err(_) => return CellValue::Null,
    }

    let type_name = row.column(idx).type_info().name().to_string();

    typed(row, idx, &type_name)
        .or_else(|_| row.try_get::<String, _>(idx).map(CellValue::Text))
        .or_else(|_| row.try_get_unchecked::<String, _>(idx).map(CellValue::Text))
        .or_else(|_| row.try_get_unchecked::<Vec<u8>, _>(idx).map(CellValue::Bytes))
        .unwrap_or_else(|e| {
            tracing::warn!(column = %row.column(idx).name(), error = %e, "Could not decode cell");
            CellValue::Null
        })
}

pub fn column_names(row: &MySqlRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

pub fn row_to_display(row: &MySqlRow) -> Vec<String> {
    (0..row.len()).map(|i| decode_cell(row, i).to_display()).collect()
}

pub fn row_to_json(row: &MySqlRow) -> Value {
    let mut map = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_cell(row, idx).to_json());
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_result_table_conventions() {
        assert_eq!(CellValue::Null.to_display(), "NULL");
        assert_eq!(CellValue::Bool(true).to_display(), "True");
        assert_eq!(CellValue::Bytes(vec![0x0A, 0xFF]).to_display(), "0x0AFF");

        let dt = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(CellValue::DateTime(dt).to_display(), "2025-03-01 08:05:00");
    }

    #[test]
    fn json_keeps_decimal_precision() {
        let value = CellValue::Decimal(Decimal::new(123_456_789, 4)).to_json();
        assert_eq!(value, json!("12345.6789"));
        assert_eq!(CellValue::Null.to_json(), Value::Null);
        assert_eq!(CellValue::UInt(7).to_json(), json!(7));
    }
}
