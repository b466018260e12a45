//! Troceado de texto en ventanas de tamaño fijo con solapamiento.
//!
//! La unidad es el carácter Unicode (`char`), no el byte ni el token: una
//! ventana nunca parte un carácter multibyte y el resultado es el mismo en
//! cualquier plataforma. Cada ventana empieza `size - overlap` caracteres
//! después de la anterior; la última puede ser más corta. El troceado termina
//! en cuanto una ventana alcanza el final del texto, así que nunca se emite una
//! ventana contenida por completo en la anterior.

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Valida los parámetros antes de hacer ningún trabajo.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::InvalidConfig("chunk_size debe ser mayor que cero".to_string()));
        }
        if overlap >= size {
            return Err(RagError::InvalidConfig(format!(
                "overlap ({overlap}) debe ser menor que chunk_size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Trocea `text` en chunks asociados a `document_id`. Texto vacío → cero chunks.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        self.windows(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                document_id: document_id.to_string(),
                index,
                text,
            })
            .collect()
    }

    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk(&document.id, &document.raw_text)
    }

    fn windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.size - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        windows
    }
}

/// Atajo para `Chunker::new(size, overlap)?.chunk(document_id, text)`.
pub fn chunk(document_id: &str, text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(size, overlap)?.chunk(document_id, text))
}
