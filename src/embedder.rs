//! Proveedores de embeddings.
//!
//! El núcleo sólo conoce el trait [`Embedder`]; hay dos implementaciones
//! intercambiables:
//!   - [`RigEmbedder`]: API remota de OpenAI a través de Rig.
//!   - [`HashEmbedder`]: modelo local y determinista (feature hashing de palabras),
//!     útil sin clave de API y en tests.

use std::time::Duration;

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel as _;
use rig::providers::openai;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::models::Embedding;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeddings de un lote de textos, en el mismo orden y con la misma longitud.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingUnavailable("respuesta de embeddings vacía".to_string()))
    }

    /// Nombre corto para logs.
    fn name(&self) -> &str;
}

/// Embeddings remotos con el cliente OpenAI de Rig.
pub struct RigEmbedder {
    client: openai::Client,
    model: String,
    timeout: Duration,
}

impl RigEmbedder {
    pub fn new(client: openai::Client, model: impl Into<String>, timeout: Duration) -> Self {
        let model = model.into();
        let model = if model.is_empty() {
            openai::TEXT_EMBEDDING_3_SMALL.to_string()
        } else {
            model
        };
        Self { client, model, timeout }
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        use rig::client::EmbeddingsClient as _;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch_size = texts.len(), "Calculando embeddings");
        let embedding_model = self.client.embedding_model(&self.model);

        let embeddings = tokio::time::timeout(self.timeout, embedding_model.embed_texts(texts.to_vec()))
            .await
            .map_err(|_| {
                error!(model = %self.model, "Timeout calculando embeddings");
                RagError::EmbeddingUnavailable(format!(
                    "sin respuesta tras {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                error!(model = %self.model, error = %e, "Error del proveedor de embeddings");
                RagError::EmbeddingUnavailable(e.to_string())
            })?;

        if embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Embedder local: cada palabra (en minúsculas, sin puntuación) suma 1.0 en
/// la posición `hash(palabra) % dimensions`; el vector resultante se
/// normaliza a norma 1. Textos sin palabras producen el vector cero.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::InvalidConfig(
                "la dimensión del embedder local debe ser mayor que cero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let slot = (fnv1a(&word.to_lowercase()) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

/// FNV-1a de 64 bits: estable entre ejecuciones y plataformas, a diferencia de `DefaultHasher`.
fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_ok, block_on};

    #[tokio::test]
    async fn hash_embedder_is_reproducible_and_normalized() {
        let embedder = HashEmbedder::new(32).unwrap();
        let a = embedder.embed("The sky is blue").await.unwrap();
        let b = embedder.embed("the SKY, is blue!").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        let norm: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn hash_embedder_batch_preserves_order_and_length() {
        let embedder = HashEmbedder::new(16).unwrap();
        let texts = vec!["uno".to_string(), "".to_string(), "dos tres".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], embedder.embed("uno").await.unwrap());
        assert!(batch[1].iter().all(|x| *x == 0.0));
        assert_eq!(batch[2], embedder.embed("dos tres").await.unwrap());
    }

    #[test]
    fn single_embed_matches_its_batch_entry() {
        let embedder = HashEmbedder::new(8).unwrap();
        let single = assert_ok!(block_on(embedder.embed("hierba verde")));
        let batch = assert_ok!(block_on(embedder.embed_batch(&["hierba verde".to_string()])));
        assert_eq!(batch, vec![single]);
    }

    #[test]
    fn hash_embedder_rejects_zero_dimensions() {
        assert!(matches!(HashEmbedder::new(0), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn fnv1a_matches_reference_values() {
        assert_eq!(fnv1a(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
    }
}
