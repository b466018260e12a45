//! Un turno de conversación RAG sobre una sesión.
//!
//! Flujo:
//!   1. Recuperar los `top_k` chunks más cercanos a la pregunta.
//!   2. Ensamblar el prompt: contexto (turno `system`) + historial + pregunta.
//!   3. Pedir la respuesta al modelo de chat.
//!   4. Añadir pregunta y respuesta al historial, juntas.
//!
//! Si cualquier paso falla el historial queda intacto y el error se devuelve
//! al llamador, que decide cómo mostrarlo.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RagSettings;
use crate::error::Result;
use crate::llm::ChatModel;
use crate::models::RetrievedChunk;
use crate::retriever::Retriever;
use crate::session::Session;

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}

pub async fn rag_turn(
    session: &mut Session,
    retriever: &Retriever,
    chat: &dyn ChatModel,
    settings: &RagSettings,
    question: &str,
) -> Result<RagAnswer> {
    let prompt_builder = settings.prompt_builder()?;

    // 1) Recuperación
    let sources = retriever
        .retrieve_with_sources(question, session.index(), settings.top_k)
        .await?;

    // 2) Prompt
    let chunks: Vec<_> = sources.iter().map(|s| s.chunk.clone()).collect();
    let turns = prompt_builder.build(&chunks, session.conversation().turns(), question);

    // 3) Chat
    let answer = match chat.complete(&turns).await {
        Ok(answer) => answer,
        Err(err) => {
            warn!(session = %session.id, kind = err.kind(), "La consulta RAG falló: {err}");
            return Err(err);
        }
    };

    // 4) Historial
    session.conversation_mut().append_exchange(question, answer.clone());
    info!(
        session = %session.id,
        model = chat.model(),
        sources = sources.len(),
        turns = session.conversation().len(),
        "Consulta RAG respondida"
    );

    Ok(RagAnswer { answer, sources })
}
