use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatMessage {
    #[schema(example = "How many employees are active?")]
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClearRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DirectSqlRequest {
    #[schema(example = "SELECT COUNT(*) AS Total FROM Employees WHERE IsDeleted = 0")]
    pub query: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub has_sql: bool,
    pub sql_query: Option<String>,
    pub sql_result: Option<String>,
    pub sql_error: Option<String>,
    pub interpretation: Option<String>,
}

impl ChatResponse {
    pub fn text(response: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileInfo {
    #[schema(example = "attendance.xlsx")]
    pub filename: String,
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileUploadResponse {
    pub session_id: String,
    pub response: String,
    pub file_info: FileInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DatabaseSwitchRequest {
    #[schema(example = "erp_mbl")]
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DatabaseSwitchResponse {
    #[schema(example = "success")]
    pub status: String,
    pub database: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_preview: Option<String>,
}

/// Bearer token claims for the entity API.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: u8, // role id
    /// Tenant database the token is scoped to; the current tenant when absent.
    pub tenant: Option<String>,
    pub exp: usize,
    pub jti: String,
}
