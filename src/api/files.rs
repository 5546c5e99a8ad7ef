use std::path::Path;

use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::db::TenantRegistry;
use crate::error::{AppError, Result};
use crate::models::{ChatMessage, ChatResponse, ClearRequest, FileInfo, FileUploadResponse};
use crate::services::file_processor::{FileError, extension_of, process_file, safe_file_name};

struct Upload {
    filename: String,
    bytes: Vec<u8>,
    /// Bytes received, including any past the limit that were not kept.
    size: usize,
}

fn multipart_error(e: actix_multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart payload: {e}"))
}

async fn read_file(mut field: Field, filename: String, limit: usize) -> Result<Upload> {
    let mut upload = Upload {
        filename,
        bytes: Vec::new(),
        size: 0,
    };

    while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
        upload.size += chunk.len();
        if upload.size <= limit {
            upload.bytes.extend_from_slice(&chunk);
        }
    }

    Ok(upload)
}

async fn read_text(mut field: Field) -> Result<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

/// Upload a spreadsheet and get an analysis
#[utoipa::path(
    post,
    path = "/files/upload",
    request_body(content = String, content_type = "multipart/form-data",
        description = "`file` (.xlsx, .xls or .csv) and an optional `session_id`"),
    responses(
        (status = 200, description = "Analysis of the uploaded file", body = FileUploadResponse),
        (status = 400, description = "Unsupported, unreadable or oversized file")
    ),
    tag = "File Analysis"
)]
pub async fn upload_file(
    config: web::Data<Config>,
    assistant: web::Data<Assistant>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let limit = config.max_upload_bytes();

    let mut upload = None;
    let mut session_id = None;

    while let Some(field) = payload.try_next().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or_default()
                    .to_string();
                upload = Some(read_file(field, filename, limit).await?);
            }
            Some("session_id") => {
                session_id = Some(read_text(field).await?).filter(|s| !s.is_empty());
            }
            _ => {
                read_text(field).await?;
            }
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("No file uploaded".into()))?;
    info!(request = %request_id, file = %upload.filename, "File upload");

    if extension_of(&upload.filename).is_none() {
        warn!(request = %request_id, file = %upload.filename, "Invalid file type");
        return Err(FileError::Unsupported.into());
    }
    if upload.size > limit {
        return Err(FileError::TooLarge {
            size_mb: upload.size as f64 / (1024.0 * 1024.0),
            limit_mb: config.max_upload_mb,
        }
        .into());
    }

    let filename = safe_file_name(&upload.filename)
        .ok_or_else(|| AppError::BadRequest("Invalid file name".into()))?;

    let Upload { bytes, .. } = upload;
    let (max_mb, max_rows) = (config.max_upload_mb, config.max_analysis_rows);
    let name = filename.clone();
    let (processed, bytes) = web::block(move || {
        let processed = process_file(&name, &bytes, max_mb, max_rows);
        (processed, bytes)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;
    let processed = processed?;

    let folder = Path::new(&config.upload_folder);
    tokio::fs::create_dir_all(folder).await?;
    tokio::fs::write(folder.join(&filename), &bytes).await?;

    let response = assistant
        .process_file_upload(&processed.text, session_id.as_deref())
        .await;

    Ok(HttpResponse::Ok().json(FileUploadResponse {
        session_id: response.session_id,
        response: response.response,
        file_info: FileInfo {
            filename,
            rows: processed.stats.rows,
            columns: processed.stats.columns,
            column_names: processed.stats.column_names,
        },
    }))
}

/// Ask a follow-up question about an uploaded file
#[utoipa::path(
    post,
    path = "/files/chat",
    request_body = ChatMessage,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "No session; upload a file first")
    ),
    tag = "File Analysis"
)]
pub async fn file_chat(
    assistant: web::Data<Assistant>,
    payload: web::Json<ChatMessage>,
) -> Result<HttpResponse> {
    let session_id = payload
        .session_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Session ID is required. Please upload a file first.".into())
        })?;

    let preview: String = payload.message.chars().take(30).collect();
    info!(session = %session_id.get(..8).unwrap_or(session_id), message = %preview, "File chat");

    let response = assistant
        .process_file_message(&payload.message, Some(session_id))
        .await;

    Ok(HttpResponse::Ok().json(response))
}

/// Reset a file analysis session
#[utoipa::path(
    post,
    path = "/files/clear",
    request_body = ClearRequest,
    responses(
        (status = 200, description = "Session cleared"),
        (status = 400, description = "Session ID missing"),
        (status = 404, description = "Unknown session")
    ),
    tag = "File Analysis"
)]
pub async fn clear_file_chat(
    registry: web::Data<TenantRegistry>,
    assistant: web::Data<Assistant>,
    payload: web::Json<ClearRequest>,
) -> Result<HttpResponse> {
    let session_id = payload
        .session_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Session ID is required".into()))?;

    let tenant = registry.current().await;
    if !assistant.clear_session(session_id, &tenant).await {
        return Err(AppError::NotFound("Session not found".into()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "status": "Chat session cleared",
        "session_id": session_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, ScriptedModel, TestState};
    use actix_web::{App, test};
    use std::sync::Arc;

    const BOUNDARY: &str = "----workforce-test-boundary";

    fn multipart(filename: &str, content: &[u8], session_id: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(id) = session_id {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{id}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(filename: &str, content: &[u8], session_id: Option<&str>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/files/upload")
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart(filename, content, session_id))
    }

    fn state(model: ScriptedModel) -> TestState {
        let mut config = Config::for_tests();
        config.upload_folder = std::env::temp_dir()
            .join(format!("wa-uploads-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();
        TestState::with_config(config, Arc::new(model), Arc::new(ScriptedExecutor::new()))
    }

    #[actix_web::test]
    async fn csv_upload_is_analysed_and_saved() {
        let state = state(ScriptedModel::new(["ok", "<p>Two employees.</p>", "<p>Ali.</p>"]));
        let folder = state.config.upload_folder.clone();
        let app = test::init_service(
            App::new()
                .configure(state.install())
                .route("/files/upload", web::post().to(upload_file))
                .route("/files/chat", web::post().to(file_chat)),
        )
        .await;

        let csv = b"Name,Hours\nAli,8\nSara,7.5\n";
        let req = upload_request("../../etc/attendance.csv", csv, None).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["response"], "<p>Two employees.</p>");
        assert_eq!(body["file_info"]["filename"], "attendance.csv");
        assert_eq!(body["file_info"]["rows"], 2);
        assert_eq!(body["file_info"]["columns"], 2);
        assert_eq!(body["file_info"]["column_names"], json!(["Name", "Hours"]));

        let saved = tokio::fs::read(Path::new(&folder).join("attendance.csv"))
            .await
            .unwrap();
        assert_eq!(saved, csv);

        let req = test::TestRequest::post()
            .uri("/files/chat")
            .set_json(json!({"message": "Who worked longest?", "session_id": body["session_id"]}))
            .to_request();
        let chat: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(chat["response"], "<p>Ali.</p>");
        assert_eq!(chat["session_id"], body["session_id"]);

        tokio::fs::remove_dir_all(&folder).await.unwrap();
    }

    #[actix_web::test]
    async fn unsupported_and_oversized_files_are_rejected() {
        let state = state(ScriptedModel::failing());
        let app = test::init_service(
            App::new()
                .configure(state.install())
                .route("/files/upload", web::post().to(upload_file)),
        )
        .await;

        let req = upload_request("notes.txt", b"hello", None).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Only .xlsx, .xls, and .csv files are supported");

        let big = vec![b'a'; 2 * 1024 * 1024];
        let req = upload_request("big.csv", &big, None).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body["detail"],
            "File too large (2.0 MB). Please use files smaller than 1 MB."
        );
    }

    #[actix_web::test]
    async fn file_chat_and_clear_need_a_session() {
        let state = state(ScriptedModel::failing());
        let app = test::init_service(
            App::new()
                .configure(state.install())
                .route("/files/chat", web::post().to(file_chat))
                .route("/files/clear", web::post().to(clear_file_chat)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/files/chat")
            .set_json(json!({"message": "hi"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Session ID is required. Please upload a file first.");

        let req = test::TestRequest::post()
            .uri("/files/clear")
            .set_json(json!({"session_id": "gone"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Session not found");
    }
}
