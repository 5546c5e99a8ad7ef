use std::collections::BTreeMap;
use std::fmt::Write as _;

use sqlx::MySqlPool;
use tracing::{info, instrument};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("No tables found in database '{0}'")]
    Empty(String),
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TableRow {
    pub table_name: String,
    pub table_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub column_type: String,
    pub is_nullable: String,
    pub column_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ForeignKeyRow {
    pub table_name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone)]
pub struct DiscoveredSchema {
    pub text: String,
    pub tables: Vec<String>,
}

/// Describe the connected database for the assistant.
pub fn render_schema(
    database: &str,
    tables: &[TableRow],
    columns: &[ColumnRow],
    foreign_keys: &[ForeignKeyRow],
) -> DiscoveredSchema {
    let mut by_table: BTreeMap<&str, Vec<&ColumnRow>> = BTreeMap::new();
    for column in columns {
        by_table.entry(column.table_name.as_str()).or_default().push(column);
    }

    let mut fks: BTreeMap<&str, Vec<&ForeignKeyRow>> = BTreeMap::new();
    for fk in foreign_keys {
        fks.entry(fk.table_name.as_str()).or_default().push(fk);
    }

    let mut text = format!(
        "Database: {database} (MySQL). Schema discovered from INFORMATION_SCHEMA.\n\
         Rows with IsDeleted = 1 are soft-deleted.\n"
    );

    for table in tables {
        let kind = if table.table_type.eq_ignore_ascii_case("VIEW") {
            "View (read-only)"
        } else {
            "Table"
        };
        let _ = write!(text, "\n{kind}: {}\nColumns:\n", table.table_name);

        for column in by_table.get(table.table_name.as_str()).into_iter().flatten() {
            let mut line = format!("  - {}: {}", column.column_name, column.column_type);
            line.push_str(if column.is_nullable.eq_ignore_ascii_case("YES") {
                ", nullable"
            } else {
                ", not null"
            });
            if column.column_key == "PRI" {
                line.push_str(", primary key");
            }
            let _ = writeln!(text, "{line}");
        }

        if let Some(keys) = fks.get(table.table_name.as_str()) {
            let _ = writeln!(text, "Foreign keys:");
            for fk in keys {
                let _ = writeln!(
                    text,
                    "  - {} -> {}.{}",
                    fk.column_name, fk.referenced_table, fk.referenced_column
                );
            }
        }
    }

    DiscoveredSchema {
        text,
        tables: tables.iter().map(|t| t.table_name.clone()).collect(),
    }
}

#[instrument(skip(pool))]
pub async fn discover_schema(pool: &MySqlPool, database: &str) -> Result<DiscoveredSchema, DiscoveryError> {
    // INFORMATION_SCHEMA reports some columns as binary strings; cast for decoding.
    let tables = sqlx::query_as::<_, TableRow>(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS table_name,
               CAST(TABLE_TYPE AS CHAR) AS table_type
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME
        "#,
    )
    .fetch_all(pool)
    .await?;

    if tables.is_empty() {
        return Err(DiscoveryError::Empty(database.to_string()));
    }

    let columns = sqlx::query_as::<_, ColumnRow>(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS table_name,
               CAST(COLUMN_NAME AS CHAR) AS column_name,
               CAST(COLUMN_TYPE AS CHAR) AS column_type,
               CAST(IS_NULLABLE AS CHAR) AS is_nullable,
               CAST(COLUMN_KEY AS CHAR) AS column_key
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME, ORDINAL_POSITION
        "#,
    )
    .fetch_all(pool)
    .await?;

    let foreign_keys = sqlx::query_as::<_, ForeignKeyRow>(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS table_name,
               CAST(COLUMN_NAME AS CHAR) AS column_name,
               CAST(REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
               CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY TABLE_NAME, COLUMN_NAME
        "#,
    )
    .fetch_all(pool)
    .await?;

    info!(
        tables = tables.len(),
        columns = columns.len(),
        foreign_keys = foreign_keys.len(),
        "Discovered database schema"
    );

    Ok(render_schema(database, &tables, &columns, &foreign_keys))
}
