//! Orquestación chunker → embedder → índice vectorial.
//!
//! Flujo:
//!   1. `index_documents`: trocea todos los documentos, calcula los embeddings
//!      en un único lote y construye el índice. Si algo falla no se produce
//!      índice alguno; el anterior (si lo hay) sigue siendo válido.
//!   2. `retrieve`: embedding de la consulta + búsqueda de los `k` más cercanos.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, RetrievedChunk};
use crate::vector_store::VectorIndex;

/// Índice de un conjunto de documentos: los vectores y los documentos de los que proceden.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    vectors: VectorIndex,
    documents: Vec<Document>,
}

impl DocumentIndex {
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    fn filenames(&self) -> HashMap<&str, &str> {
        self.documents
            .iter()
            .map(|d| (d.id.as_str(), d.filename.as_str()))
            .collect()
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub async fn index_documents(
        &self,
        documents: Vec<Document>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<DocumentIndex> {
        let chunker = Chunker::new(chunk_size, overlap)?;

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunker.chunk_document(doc))
            .collect();
        if chunks.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        debug!(
            embedder = self.embedder.name(),
            chunks = texts.len(),
            "Calculando embeddings de los chunks"
        );
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "se esperaban {} embeddings y se recibieron {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let vectors = VectorIndex::build(embeddings.into_iter().zip(chunks).collect())?;
        info!(
            documents = documents.len(),
            chunks = vectors.len(),
            dimensions = vectors.dimensions(),
            "Índice vectorial construido"
        );

        Ok(DocumentIndex { vectors, documents })
    }

    /// Los `k` chunks más cercanos a `query`. `NoIndex` si todavía no hay índice.
    pub async fn retrieve(
        &self,
        query: &str,
        index: Option<&DocumentIndex>,
        k: usize,
    ) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_with_sources(query, index, k)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }

    /// Como [`retrieve`](Self::retrieve), añadiendo fichero de origen y distancia.
    pub async fn retrieve_with_sources(
        &self,
        query: &str,
        index: Option<&DocumentIndex>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let index = index.ok_or(RagError::NoIndex)?;
        let query_vector = self.embedder.embed(query).await?;
        let filenames = index.filenames();

        let results = index
            .vectors
            .search_with_distance(&query_vector, k)?
            .into_iter()
            .map(|(chunk, distance)| RetrievedChunk {
                filename: filenames
                    .get(chunk.document_id.as_str())
                    .map(|f| f.to_string())
                    .unwrap_or_default(),
                chunk: chunk.clone(),
                distance,
            })
            .collect::<Vec<_>>();

        debug!(k, results = results.len(), "Chunks recuperados");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use async_trait::async_trait;
    use crate::models::Embedding;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
            Err(RagError::EmbeddingUnavailable("cuota agotada".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn retriever() -> Retriever {
        Retriever::new(Arc::new(HashEmbedder::new(64).unwrap()))
    }

    #[tokio::test]
    async fn empty_document_list_is_an_empty_index() {
        let result = retriever().index_documents(Vec::new(), 16, 4).await;
        assert!(matches!(result, Err(RagError::EmptyIndex)));
    }

    #[tokio::test]
    async fn documents_without_text_are_an_empty_index() {
        let docs = vec![Document::new("vacio.pdf", "")];
        let result = retriever().index_documents(docs, 16, 4).await;
        assert!(matches!(result, Err(RagError::EmptyIndex)));
    }

    #[tokio::test]
    async fn invalid_chunking_is_rejected_before_embedding() {
        let r = Retriever::new(Arc::new(FailingEmbedder));
        let docs = vec![Document::new("a.pdf", "texto")];
        let result = r.index_documents(docs, 4, 4).await;
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn retrieve_without_index_is_no_index() {
        let result = retriever().retrieve("pregunta", None, 3).await;
        assert!(matches!(result, Err(RagError::NoIndex)));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_the_build() {
        let r = Retriever::new(Arc::new(FailingEmbedder));
        let docs = vec![Document::new("a.pdf", "The sky is blue. Grass is green.")];
        let result = r.index_documents(docs, 16, 4).await;
        assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn retrieves_the_matching_document_with_its_filename() {
        let r = retriever();
        let docs = vec![
            Document::new("cielo.pdf", "the sky is blue"),
            Document::new("hierba.pdf", "grass is green"),
        ];
        let index = r.index_documents(docs, 100, 10).await.unwrap();
        assert_eq!(index.vectors().len(), 2);

        let results = r
            .retrieve_with_sources("grass is green", Some(&index), 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename, "hierba.pdf");
        assert_eq!(results[0].chunk.text, "grass is green");
        assert!(results[0].distance.abs() < 1e-12);
    }
}
