//! Estado por sesión de usuario: índice de documentos, historial y progreso de carga.
//!
//! Cada [`Session`] se pasa explícitamente a las operaciones que la usan; no hay
//! estado global compartido entre sesiones. El acceso concurrente a una misma
//! sesión se serializa con su `tokio::sync::Mutex`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::app_state::Status;
use crate::conversation::Conversation;
use crate::error::{RagError, Result};
use crate::models::{Document, Turn};
use crate::retriever::{DocumentIndex, Retriever};

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    greeting: String,
    conversation: Conversation,
    index: Option<Arc<DocumentIndex>>,
    status: Arc<StdMutex<Status>>,
}

impl Session {
    /// Sesión nueva. Si `greeting` no está vacío, la conversación empieza con ese turno del asistente.
    pub fn new(greeting: impl Into<String>) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            greeting: greeting.into(),
            conversation: Conversation::new(),
            index: None,
            status: Arc::new(StdMutex::new(Status::ready())),
        };
        session.seed_greeting();
        session
    }

    fn seed_greeting(&mut self) {
        if !self.greeting.is_empty() {
            self.conversation.append(Turn::assistant(self.greeting.clone()));
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn index(&self) -> Option<&DocumentIndex> {
        self.index.as_deref()
    }

    pub fn documents(&self) -> &[Document] {
        self.index.as_deref().map(|i| i.documents()).unwrap_or(&[])
    }

    /// Sustituye el índice completo; el anterior se descarta junto con sus documentos.
    pub fn replace_index(&mut self, index: DocumentIndex) -> Arc<DocumentIndex> {
        info!(
            session = %self.id,
            documents = index.documents().len(),
            chunks = index.vectors().len(),
            "Índice de la sesión reemplazado"
        );
        let index = Arc::new(index);
        self.index = Some(index.clone());
        index
    }

    /// Indexa `documents` y sólo entonces sustituye el índice. Si la
    /// construcción falla, el índice anterior sigue en uso sin cambios.
    pub async fn rebuild_index(
        &mut self,
        retriever: &Retriever,
        documents: Vec<Document>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Arc<DocumentIndex>> {
        let index = retriever.index_documents(documents, chunk_size, overlap).await?;
        Ok(self.replace_index(index))
    }

    /// Añade `documents` a los ya indexados y reconstruye el índice con todos.
    /// Un fichero con el mismo nombre que uno existente lo sustituye.
    pub async fn add_documents(
        &mut self,
        retriever: &Retriever,
        documents: Vec<Document>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Arc<DocumentIndex>> {
        let mut merged: Vec<Document> = self
            .documents()
            .iter()
            .filter(|kept| !documents.iter().any(|new| new.filename == kept.filename))
            .cloned()
            .collect();
        merged.extend(documents);
        self.rebuild_index(retriever, merged, chunk_size, overlap).await
    }

    /// Progreso compartido con la tarea de carga, que no necesita el lock de la sesión.
    pub fn status_handle(&self) -> Arc<StdMutex<Status>> {
        self.status.clone()
    }

    pub fn status(&self) -> Status {
        Status::snapshot(&self.status)
    }

    /// Vacía el historial (vuelve a sembrar el saludo). El índice se conserva.
    pub fn reset_conversation(&mut self) {
        self.conversation = Conversation::new();
        self.seed_greeting();
    }
}

/// Registro de sesiones activas.
#[derive(Clone, Default)]
pub struct SessionStore {
    greeting: String,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
            sessions: Arc::default(),
        }
    }

    pub async fn create(&self) -> (Uuid, Arc<Mutex<Session>>) {
        let session = Session::new(self.greeting.clone());
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        info!(session = %id, "Sesión creada");
        (id, handle)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RagError::SessionNotFound(id.to_string()))
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                info!(session = %id, "Sesión eliminada");
                Ok(())
            }
            None => Err(RagError::SessionNotFound(id.to_string())),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
