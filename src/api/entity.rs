use std::str::FromStr;

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{MySqlPool, Row};
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::db::TenantRegistry;
use crate::error::{AppError, Result};
use crate::model::catalog::{TableDef, catalog};
use crate::model::enums::Status;
use crate::utils::db_utils::{
    SqlStatement, SqlValue, bind_value, build_insert_sql, build_soft_delete_sql, build_update_sql,
    execute_statement, quote_ident,
};
use crate::utils::row_decode::row_to_json;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct EntityQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub company_id: Option<Uuid>,
    /// Status name (`Active`) or id (`1`).
    pub status: Option<String>,
    pub include_deleted: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct EntityListResponse {
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Value>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

fn lookup(name: &str) -> Result<&'static TableDef> {
    catalog()
        .table(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown entity '{name}'")))
}

fn parse_status(raw: &str) -> Result<Status> {
    raw.parse::<i64>()
        .ok()
        .and_then(Status::from_id)
        .or_else(|| Status::from_str(raw).ok())
        .ok_or_else(|| AppError::BadRequest(format!("Unknown status '{raw}'")))
}

/// Pool of the tenant the caller's token is scoped to.
async fn tenant_pool(registry: &TenantRegistry, user: &AuthUser) -> Result<(String, MySqlPool)> {
    match &user.tenant {
        Some(name) => {
            let pool = registry.pool_for(name).await.map_err(AppError::BadRequest)?;
            Ok((name.clone(), pool))
        }
        None => {
            let current = registry.current().await;
            Ok((current.name, current.pool))
        }
    }
}

/// WHERE clause and bindings for a list request.
fn list_filter(table: &TableDef, query: &EntityQuery) -> Result<(String, Vec<SqlValue>)> {
    let mut conditions = Vec::new();
    let mut bindings = Vec::new();

    if table.soft_deletes() && !query.include_deleted.unwrap_or(false) {
        conditions.push(format!("{} = 0", quote_ident("IsDeleted")));
    }

    if let Some(company_id) = query.company_id {
        if !table.has_company() {
            return Err(AppError::BadRequest(format!(
                "{} is not scoped to a company",
                table.name
            )));
        }
        conditions.push(format!("{} = ?", quote_ident("CompanyId")));
        bindings.push(SqlValue::String(company_id.hyphenated().to_string()));
    }

    if let Some(raw) = &query.status {
        if table.column("Status").is_none() {
            return Err(AppError::BadRequest(format!("{} has no status", table.name)));
        }
        conditions.push(format!("{} = ?", quote_ident("Status")));
        bindings.push(SqlValue::I64(parse_status(raw)? as i64));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    Ok((where_clause, bindings))
}

/// Page, page size and row offset. The offset is computed in `u64` so any
/// page number is representable.
fn page_window(query: &EntityQuery) -> (u32, u32, u64) {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = u64::from(page - 1) * u64::from(per_page);
    (page, per_page, offset)
}

fn order_by(table: &TableDef) -> String {
    if table.column("CreationTime").is_some() {
        format!("{} DESC", quote_ident("CreationTime"))
    } else {
        quote_ident(table.key)
    }
}

/// List entity tables and views
#[utoipa::path(
    get,
    path = "/api/v1/entities",
    responses(
        (status = 200, description = "Catalog of tables and views", body = Object)
    ),
    tag = "Entity",
    security(("bearer_auth" = []))
)]
pub async fn list_entities(_auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "data": catalog().tables() }))
}

/// Paginated rows of one table
#[utoipa::path(
    get,
    path = "/api/v1/entities/{table}",
    params(
        ("table", Path, description = "Table or entity name"),
        EntityQuery
    ),
    responses(
        (status = 200, description = "Paginated rows", body = EntityListResponse),
        (status = 404, description = "Unknown entity")
    ),
    tag = "Entity",
    security(("bearer_auth" = []))
)]
pub async fn list_rows(
    auth: AuthUser,
    registry: web::Data<TenantRegistry>,
    path: web::Path<String>,
    query: web::Query<EntityQuery>,
) -> Result<HttpResponse> {
    let table = lookup(&path)?;
    let (where_clause, bindings) = list_filter(table, &query)?;
    let (tenant, pool) = tenant_pool(&registry, &auth).await?;

    let (page, per_page, offset) = page_window(&query);

    // ---------- total count ----------
    let count_sql = format!(
        "SELECT COUNT(*) AS total FROM {} {}",
        quote_ident(table.name),
        where_clause
    );
    debug!(sql = %count_sql, tenant = %tenant, "Counting rows");

    let mut count_query = sqlx::query(&count_sql);
    for b in bindings.iter().cloned() {
        count_query = bind_value(count_query, b);
    }
    let total: i64 = count_query.fetch_one(&pool).await?.try_get("total")?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT * FROM {} {} ORDER BY {} LIMIT ? OFFSET ?",
        quote_ident(table.name),
        where_clause,
        order_by(table)
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching rows");

    let mut data_query = sqlx::query(&data_sql);
    for b in bindings {
        data_query = bind_value(data_query, b);
    }
    let rows = data_query
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(&pool)
        .await?;

    Ok(HttpResponse::Ok().json(EntityListResponse {
        data: rows.iter().map(row_to_json).collect(),
        page,
        per_page,
        total,
    }))
}

/// Fetch one row by id
#[utoipa::path(
    get,
    path = "/api/v1/entities/{table}/{id}",
    params(
        ("table", Path, description = "Table or entity name"),
        ("id", Path, description = "Row id")
    ),
    responses(
        (status = 200, description = "Row found", body = Object),
        (status = 404, description = "Row not found or deleted")
    ),
    tag = "Entity",
    security(("bearer_auth" = []))
)]
pub async fn get_row(
    auth: AuthUser,
    registry: web::Data<TenantRegistry>,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse> {
    let (name, id) = path.into_inner();
    let table = lookup(&name)?;
    let (_, pool) = tenant_pool(&registry, &auth).await?;

    let mut sql = format!(
        "SELECT * FROM {} WHERE {} = ?",
        quote_ident(table.name),
        quote_ident(table.key)
    );
    if table.soft_deletes() {
        sql.push_str(&format!(" AND {} = 0", quote_ident("IsDeleted")));
    }

    let row = sqlx::query(&sql)
        .bind(id.hyphenated().to_string())
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", table.entity)))?;

    Ok(HttpResponse::Ok().json(row_to_json(&row)))
}

async fn write(pool: &MySqlPool, statement: SqlStatement, table: &TableDef) -> Result<u64> {
    execute_statement(pool, statement).await.map_err(|e| {
        error!(error = %e, table = table.name, "Failed to write row");
        AppError::from(e)
    })
}

/// Create a row
#[utoipa::path(
    post,
    path = "/api/v1/entities/{table}",
    params(("table", Path, description = "Table or entity name")),
    request_body(content = Object, description = "Column values keyed by column name"),
    responses(
        (status = 201, description = "Row created", body = Object, example = json!({
            "id": "3f2504e0-4f89-11d3-9a0c-0305e82c3301",
            "message": "Site created successfully"
        })),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "HR/Admin only")
    ),
    tag = "Entity",
    security(("bearer_auth" = []))
)]
pub async fn create_row(
    auth: AuthUser,
    registry: web::Data<TenantRegistry>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    auth.require_writer()?;

    let table = lookup(&path)?;
    let values = table
        .validate_insert(&body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let (tenant, pool) = tenant_pool(&registry, &auth).await?;

    let id = Uuid::new_v4();
    write(&pool, build_insert_sql(table, values, &auth.username, id), table).await?;
    info!(table = table.name, %id, tenant = %tenant, user = %auth.username, "Created row");

    Ok(HttpResponse::Created().json(json!({
        "id": id,
        "message": format!("{} created successfully", table.entity),
    })))
}

/// Update some columns of a row
#[utoipa::path(
    put,
    path = "/api/v1/entities/{table}/{id}",
    params(
        ("table", Path, description = "Table or entity name"),
        ("id", Path, description = "Row id")
    ),
    request_body(content = Object, description = "Columns to change"),
    responses(
        (status = 200, description = "Row updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Row not found or deleted")
    ),
    tag = "Entity",
    security(("bearer_auth" = []))
)]
pub async fn update_row(
    auth: AuthUser,
    registry: web::Data<TenantRegistry>,
    path: web::Path<(String, Uuid)>,
    body: web::Json<Value>,
) -> Result<HttpResponse> {
    auth.require_writer()?;

    let (name, id) = path.into_inner();
    let table = lookup(&name)?;
    let values = table
        .validate_update(&body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let (_, pool) = tenant_pool(&registry, &auth).await?;

    let affected = write(&pool, build_update_sql(table, values, &auth.username, id), table).await?;
    if affected == 0 {
        return Err(AppError::NotFound(format!("{} not found", table.entity)));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("{} updated successfully", table.entity),
    })))
}

/// Soft-delete a row
#[utoipa::path(
    delete,
    path = "/api/v1/entities/{table}/{id}",
    params(
        ("table", Path, description = "Table or entity name"),
        ("id", Path, description = "Row id")
    ),
    responses(
        (status = 200, description = "Row deleted"),
        (status = 400, description = "Views cannot be deleted from"),
        (status = 404, description = "Row not found or already deleted")
    ),
    tag = "Entity",
    security(("bearer_auth" = []))
)]
pub async fn delete_row(
    auth: AuthUser,
    registry: web::Data<TenantRegistry>,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse> {
    auth.require_writer()?;

    let (name, id) = path.into_inner();
    let table = lookup(&name)?;
    if !table.soft_deletes() {
        return Err(AppError::BadRequest(format!("{} is a read-only view", table.name)));
    }
    let (_, pool) = tenant_pool(&registry, &auth).await?;

    let affected = write(&pool, build_soft_delete_sql(table, &auth.username, id), table).await?;
    if affected == 0 {
        return Err(AppError::NotFound(format!("{} not found", table.entity)));
    }

    info!(table = table.name, %id, user = %auth.username, "Soft-deleted row");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
