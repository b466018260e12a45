//! Capacidades falsas para los tests de integración.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pdf_rag_chat::embedder::{Embedder, HashEmbedder};
use pdf_rag_chat::llm::{ChatModel, LlmManager};
use pdf_rag_chat::models::{Embedding, Turn};
use pdf_rag_chat::{RagError, Result};

/// Devuelve siempre el mismo vector: todas las distancias empatan.
pub struct ConstantEmbedder;

#[async_trait]
impl Embedder for ConstantEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|_| vec![1.0, 1.0, 1.0]).collect())
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Embedder local que falla sólo en la llamada número `fail_on` (empezando en 1).
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    fail_on: usize,
}

impl FlakyEmbedder {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: HashEmbedder::new(64).unwrap(),
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(RagError::EmbeddingUnavailable("servicio caído".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Modelo de chat que responde con una lista de resultados predefinidos y
/// guarda los turnos recibidos en cada llamada.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String>>>,
    pub calls: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_call(&self) -> Vec<Turn> {
        self.calls.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        self.calls.lock().unwrap().push(turns.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RagError::UpstreamUnavailable("sin respuestas preparadas".to_string())))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub fn local_manager(chat: Arc<ScriptedChat>) -> LlmManager {
    LlmManager::new(Arc::new(HashEmbedder::new(64).unwrap()), chat)
}
