use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, llm::LlmManager, retriever::Retriever, session::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub retriever: Retriever,
    pub sessions: SessionStore,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, llm_manager: LlmManager) -> (Self, oneshot::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let state = Self {
            retriever: Retriever::new(llm_manager.embedder.clone()),
            sessions: SessionStore::new(config.greeting.clone()),
            config,
            llm_manager,
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
        };
        (state, shutdown_rx)
    }
}

/// Progreso de la última carga de documentos de una sesión.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn ready() -> Self {
        Self {
            is_busy: false,
            message: "Sin cargas en curso.".to_string(),
            progress: 0.0,
        }
    }

    /// Actualiza mensaje y progreso. Tolera un mutex envenenado.
    pub fn update(status: &Mutex<Status>, message: impl Into<String>, progress: f32) {
        let mut guard = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.message = message.into();
        guard.progress = progress;
    }

    pub fn set_busy(status: &Mutex<Status>, is_busy: bool, message: impl Into<String>) {
        let mut guard = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.is_busy = is_busy;
        guard.message = message.into();
        guard.progress = 0.0;
    }

    pub fn snapshot(status: &Mutex<Status>) -> Status {
        status.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}
