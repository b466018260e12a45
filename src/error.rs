//! Taxonomía de errores del núcleo RAG.
//!
//! Cada variante corresponde a un estado que el llamador debe poder
//! distinguir: no es lo mismo "no hay índice" que "la búsqueda no devolvió nada",
//! ni un fallo del proveedor de chat que una respuesta vacía.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Parámetros de chunking o de recuperación inválidos.
    #[error("Configuración inválida: {0}")]
    InvalidConfig(String),

    /// Se intentó construir un índice sin ningún chunk.
    #[error("No hay documentos con texto que indexar")]
    EmptyIndex,

    /// El embedding de la consulta o de una entrada no tiene la dimensión del índice.
    #[error("Dimensión de embedding incorrecta: se esperaba {expected}, se recibió {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Fallo del proveedor de embeddings (red, cuota, timeout...).
    #[error("Proveedor de embeddings no disponible: {0}")]
    EmbeddingUnavailable(String),

    /// Recuperación solicitada antes de indexar documentos.
    #[error("Todavía no se ha indexado ningún documento")]
    NoIndex,

    /// Fallo del proveedor de chat.
    #[error("Proveedor de chat no disponible: {0}")]
    UpstreamUnavailable(String),

    /// El proveedor de chat rechazó la petición por límite de uso.
    #[error("Límite de peticiones alcanzado: {0}")]
    RateLimited(String),

    #[error("No se pudo extraer texto de '{filename}': {message}")]
    Extraction { filename: String, message: String },

    #[error("Formato de fichero no soportado: '{filename}'")]
    UnsupportedFormat { filename: String },

    #[error("Sesión no encontrada: {0}")]
    SessionNotFound(String),
}

impl RagError {
    /// Identificador estable del tipo de error, expuesto en las respuestas JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::EmptyIndex => "empty_index",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::NoIndex => "no_index",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::RateLimited(_) => "rate_limited",
            Self::Extraction { .. } => "extraction_failed",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    /// Código HTTP con el que la API expone cada error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_)
            | Self::EmptyIndex
            | Self::Extraction { .. }
            | Self::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            Self::NoIndex => StatusCode::CONFLICT,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::EmbeddingUnavailable(_) | Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Clasifica el mensaje de error de un proveedor remoto de chat.
    pub fn from_upstream_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimited(message)
        } else {
            Self::UpstreamUnavailable(message)
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
