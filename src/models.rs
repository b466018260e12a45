//! Modelos de dominio: documentos, chunks, embeddings y turnos de conversación.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Vector de embedding. Todos los vectores de un mismo índice tienen la misma longitud.
pub type Embedding = Vec<f64>;

/// Documento ingerido: texto plano ya extraído de su fichero de origen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    #[serde(skip_serializing)]
    pub raw_text: String,
}

impl Document {
    /// Crea un documento con un identificador nuevo.
    pub fn new(filename: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// Trozo de texto de un documento. Unidad de recuperación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub text: String,
}

/// Chunk recuperado junto con su distancia a la consulta y el fichero de origen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub filename: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Un mensaje de la conversación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

/// Entrada de un listado de directorio para el selector de carpetas del frontend.
#[derive(Debug, Clone, Serialize)]
pub struct FileTreeNode {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub children: Vec<FileTreeNode>,
}
