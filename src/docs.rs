use crate::api::entity::{EntityListResponse, EntityQuery};
use crate::model::enums::{DeleteBehavior, Status};
use crate::models::{
    ChatMessage, ChatResponse, ClearRequest, DatabaseSwitchRequest, DatabaseSwitchResponse,
    DirectSqlRequest, FileInfo, FileUploadResponse,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workforce Assistant API",
        version = "1.0.0",
        description = r#"
## Workforce Assistant

Backend for a multi-tenant workforce and attendance system (companies, projects,
sites, employees, schedules, shifts and punch logs) with a database assistant.

### Assistant
- **Database chat**: ask questions in plain language; the assistant writes SQL,
  runs it against the current tenant database and explains the result
- **Direct SQL**: run a statement and get an explanation of the result
- **File analysis**: upload `.xlsx`, `.xls` or `.csv` files and discuss them
- **Tenant switching**: point the assistant at another tenant database

### Entity API
Paginated reads and validated writes for every table of the tenant schema,
protected by **JWT Bearer authentication**. Writes need the **Admin** or **HR** role.
Deletes are soft deletes.
"#,
    ),
    paths(
        crate::api::system::index,
        crate::api::system::client_config,

        crate::api::chat::db_chat,
        crate::api::chat::direct_sql,
        crate::api::chat::clear_db_chat,

        crate::api::database::db_status,
        crate::api::database::switch_database,
        crate::api::database::current_database,
        crate::api::database::get_schema,
        crate::api::database::get_context,

        crate::api::files::upload_file,
        crate::api::files::file_chat,
        crate::api::files::clear_file_chat,

        crate::api::entity::list_entities,
        crate::api::entity::list_rows,
        crate::api::entity::get_row,
        crate::api::entity::create_row,
        crate::api::entity::update_row,
        crate::api::entity::delete_row
    ),
    components(
        schemas(
            ChatMessage,
            ChatResponse,
            ClearRequest,
            DirectSqlRequest,
            DatabaseSwitchRequest,
            DatabaseSwitchResponse,
            FileInfo,
            FileUploadResponse,
            EntityQuery,
            EntityListResponse,
            Status,
            DeleteBehavior
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "System", description = "Service status and client configuration"),
        (name = "Database Query", description = "Database assistant and tenant switching"),
        (name = "Schema", description = "Schema and context files known to the assistant"),
        (name = "File Analysis", description = "Spreadsheet upload and analysis"),
        (name = "Entity", description = "Tenant entity CRUD"),
    )
)]
pub struct ApiDoc;
