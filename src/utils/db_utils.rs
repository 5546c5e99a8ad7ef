use chrono::{NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::{MySql, MySqlPool};
use uuid::Uuid;

use crate::model::catalog::{ColumnDef, TableDef};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    Bool(bool),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Null,
}

/// ===============================
/// SQL statement container
/// ===============================
#[derive(Debug)]
pub struct SqlStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Table and column names come from the catalog, never from request input.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// ===============================
/// Build INSERT for a validated payload
/// ===============================
pub fn build_insert_sql(
    table: &TableDef,
    values: Vec<(&ColumnDef, SqlValue)>,
    actor: &str,
    id: Uuid,
) -> SqlStatement {
    let mut columns = vec!["Id", "Creator", "CreationTime", "IsDeleted"];
    let mut bound = vec![
        SqlValue::String(id.hyphenated().to_string()),
        SqlValue::String(actor.to_string()),
        SqlValue::DateTime(Utc::now().naive_utc()),
        SqlValue::Bool(false),
    ];

    let has_status = values.iter().any(|(c, _)| c.name == "Status");
    if !has_status && table.column("Status").is_some() {
        columns.push("Status");
        bound.push(SqlValue::I64(0));
    }

    for (column, value) in values {
        columns.push(column.name);
        bound.push(value);
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.name),
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        vec!["?"; columns.len()].join(", ")
    );

    SqlStatement { sql, values: bound }
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
pub fn build_update_sql(
    table: &TableDef,
    values: Vec<(&ColumnDef, SqlValue)>,
    actor: &str,
    id: Uuid,
) -> SqlStatement {
    let mut set_clause: Vec<String> = values
        .iter()
        .map(|(c, _)| format!("{} = ?", quote_ident(c.name)))
        .collect();
    let mut bound: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();

    set_clause.push(format!("{} = ?", quote_ident("LastModifier")));
    bound.push(SqlValue::String(actor.to_string()));
    set_clause.push(format!("{} = ?", quote_ident("LastModificationTime")));
    bound.push(SqlValue::DateTime(Utc::now().naive_utc()));

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ? AND {} = 0",
        quote_ident(table.name),
        set_clause.join(", "),
        quote_ident(table.key),
        quote_ident("IsDeleted"),
    );

    bound.push(SqlValue::String(id.hyphenated().to_string()));

    SqlStatement { sql, values: bound }
}

/// ===============================
/// Build soft DELETE
/// ===============================
pub fn build_soft_delete_sql(table: &TableDef, actor: &str, id: Uuid) -> SqlStatement {
    let sql = format!(
        "UPDATE {} SET {} = 1, {} = ?, {} = ? WHERE {} = ? AND {} = 0",
        quote_ident(table.name),
        quote_ident("IsDeleted"),
        quote_ident("Deleter"),
        quote_ident("DeletionTime"),
        quote_ident(table.key),
        quote_ident("IsDeleted"),
    );

    SqlStatement {
        sql,
        values: vec![
            SqlValue::String(actor.to_string()),
            SqlValue::DateTime(Utc::now().naive_utc()),
            SqlValue::String(id.hyphenated().to_string()),
        ],
    }
}

pub fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::String(v) => query.bind(v),
        SqlValue::I64(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v),
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::Null => query.bind(None::<String>),
    }
}

/// ===============================
/// Execute a write, returning affected rows
/// ===============================
pub async fn execute_statement(
    pool: &MySqlPool,
    statement: SqlStatement,
) -> Result<u64, sqlx::Error> {
    tracing::debug!(sql = %statement.sql, binds = statement.values.len(), "Executing statement");

    let mut query = sqlx::query(&statement.sql);

    for value in statement.values {
        query = bind_value(query, value);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}
