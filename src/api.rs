use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    error::RagError,
    ingest,
    models::{Document, FileTreeNode, Turn},
    rag::{self, RagAnswer},
    retriever::DocumentIndex,
    session::Session,
};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(err: RagError) -> ApiError {
    (
        err.status_code(),
        Json(json!({ "error": err.to_string(), "kind": err.kind() })),
    )
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct SelectDirPayload {
    path: String,
}

#[derive(Deserialize)]
pub struct UploadParams {
    filename: String,
}

#[derive(Deserialize)]
pub struct ChatPayload {
    question: String,
}

#[derive(Serialize)]
pub struct SessionView {
    session_id: Uuid,
    messages: Vec<Turn>,
    has_index: bool,
    documents: Vec<Document>,
    status: Status,
}

impl SessionView {
    fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id,
            messages: session.conversation().turns().to_vec(),
            has_index: session.index().is_some(),
            documents: session.documents().to_vec(),
            status: session.status(),
        }
    }
}

#[derive(Serialize)]
pub struct IndexResponse {
    documents: Vec<Document>,
    chunks: usize,
    files_skipped: u32,
}

impl IndexResponse {
    fn new(index: &DocumentIndex, files_skipped: u32) -> Self {
        Self {
            documents: index.documents().to_vec(),
            chunks: index.vectors().len(),
            files_skipped,
        }
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/:id/reset", post(reset_session_handler))
        .route("/api/sessions/:id/status", get(session_status_handler))
        .route("/api/sessions/:id/documents", post(upload_document_handler))
        .route("/api/sessions/:id/directory", post(load_directory_handler))
        .route("/api/sessions/:id/chat", post(chat_handler))
        .route("/api/list-directory", post(list_directory_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

// --- Handlers de sesión ---

#[axum::debug_handler]
async fn create_session_handler(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let (_, handle) = state.sessions.create().await;
    let session = handle.lock().await;
    (StatusCode::CREATED, Json(SessionView::from_session(&session)))
}

#[axum::debug_handler]
async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.sessions.get(id).await.map_err(api_error)?;
    let session = handle.lock().await;
    Ok(Json(SessionView::from_session(&session)))
}

#[axum::debug_handler]
async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.remove(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn reset_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.sessions.get(id).await.map_err(api_error)?;
    let mut session = handle.lock().await;
    session.reset_conversation();
    Ok(Json(SessionView::from_session(&session)))
}

#[axum::debug_handler]
async fn session_status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Status>, ApiError> {
    let handle = state.sessions.get(id).await.map_err(api_error)?;
    let status = handle.lock().await.status();
    Ok(Json(status))
}

// --- Handlers de ingesta ---

/// Sube un fichero y lo añade a los documentos de la sesión. El índice se
/// reconstruye con todos ellos; si falla, la sesión conserva el anterior.
#[axum::debug_handler]
async fn upload_document_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<IndexResponse>, ApiError> {
    let handle = state.sessions.get(id).await.map_err(api_error)?;

    let filename = params.filename.clone();
    let document = tokio::task::spawn_blocking(move || ingest::document_from_upload(&filename, &body))
        .await
        .map_err(|e| {
            api_error(RagError::Extraction {
                filename: params.filename.clone(),
                message: e.to_string(),
            })
        })?
        .map_err(api_error)?;

    info!(session = %id, filename = %document.filename, "Documento subido");
    let rag = &state.config.rag;
    let mut session = handle.lock().await;
    let index = session
        .add_documents(&state.retriever, vec![document], rag.chunk_size, rag.overlap)
        .await
        .map_err(api_error)?;
    Ok(Json(IndexResponse::new(&index, 0)))
}

/// Carga un directorio completo; el conjunto resultante sustituye al índice de la sesión.
#[axum::debug_handler]
async fn load_directory_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectDirPayload>,
) -> Result<Json<IndexResponse>, ApiError> {
    let handle = state.sessions.get(id).await.map_err(api_error)?;
    // La carga no retiene el lock: la sesión sigue pudiendo consultar su progreso.
    let status = handle.lock().await.status_handle();

    let root = PathBuf::from(&payload.path);
    Status::set_busy(&status, true, "Iniciando carga de documentos...");

    let progress = status.clone();
    let loaded = tokio::task::spawn_blocking(move || ingest::load_documents_from_folder(&root, progress))
        .await
        .map_err(|e| RagError::Extraction {
            filename: payload.path.clone(),
            message: e.to_string(),
        })
        .and_then(|result| result);

    let result = match loaded {
        Ok(summary) => {
            Status::update(&status, "Generando embeddings...", 1.0);
            let rag = &state.config.rag;
            match state
                .retriever
                .index_documents(summary.documents, rag.chunk_size, rag.overlap)
                .await
            {
                Ok(index) => {
                    let index = handle.lock().await.replace_index(index);
                    Ok(IndexResponse::new(&index, summary.files_skipped))
                }
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    };

    match &result {
        Ok(response) => Status::set_busy(
            &status,
            false,
            format!(
                "¡Indexación completada! {} documentos, {} chunks, {} ficheros omitidos.",
                response.documents.len(),
                response.chunks,
                response.files_skipped
            ),
        ),
        Err(err) => {
            error!(session = %id, "Error en la carga del directorio {}: {}", payload.path, err);
            Status::set_busy(&status, false, format!("Error en la indexación: {err}"));
        }
    }

    result.map(Json).map_err(api_error)
}

// --- Chat ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<RagAnswer>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(RagError::InvalidConfig(
            "la pregunta no puede estar vacía".to_string(),
        )));
    }

    let handle = state.sessions.get(id).await.map_err(api_error)?;
    let mut session = handle.lock().await;
    let answer = rag::rag_turn(
        &mut session,
        &state.retriever,
        state.llm_manager.chat.as_ref(),
        &state.config.rag,
        question,
    )
    .await
    .map_err(api_error)?;

    Ok(Json(answer))
}

// --- Estado, directorios y apagado ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Servidor listo.",
        "sessions": state.sessions.len().await,
        "model": state.config.rag.model,
        "embedder": state.llm_manager.embedder.name(),
    }))
}

#[axum::debug_handler]
async fn list_directory_handler(
    Json(payload): Json<SelectDirPayload>,
) -> Result<Json<FileTreeNode>, ApiError> {
    let path = if payload.path.is_empty() {
        dirs::home_dir().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "No se pudo determinar el directorio home del usuario."})),
            )
        })?
    } else {
        PathBuf::from(&payload.path)
    };

    if !path.is_dir() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "La ruta proporcionada no es un directorio válido."})),
        ));
    }

    build_file_tree(&path).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Error al leer el directorio: {}", e)})),
        )
    })
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}

/// Directorio con sus entradas inmediatas: primero subdirectorios, luego ficheros, por nombre.
fn build_file_tree(path: &FsPath) -> std::io::Result<FileTreeNode> {
    let metadata = std::fs::metadata(path)?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let is_dir = metadata.is_dir();
    let mut children = Vec::new();

    if is_dir {
        let mut entries: Vec<_> = std::fs::read_dir(path)?.filter_map(Result::ok).collect();

        entries.sort_by(|a, b| {
            let a_is_dir = a.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            let b_is_dir = b.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            b_is_dir.cmp(&a_is_dir).then_with(|| a.file_name().cmp(&b.file_name()))
        });

        for entry in entries {
            if let Ok(entry_meta) = entry.metadata() {
                children.push(FileTreeNode {
                    path: entry.path(),
                    name: entry.file_name().to_string_lossy().to_string(),
                    is_dir: entry_meta.is_dir(),
                    children: Vec::new(),
                });
            }
        }
    }

    Ok(FileTreeNode {
        path: path.to_path_buf(),
        name,
        is_dir,
        children,
    })
}
