//! Abstracción sobre Rig para el chat y la construcción de proveedores.
//!
//! El núcleo sólo depende del trait [`ChatModel`]; [`LlmManager`] decide a
//! partir de la configuración qué embedder y qué modelo de chat se usan.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result as AnyResult};
use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::client::CompletionClient as _;
use rig::completion::{Chat, Message};
use rig::providers::openai;
use tracing::{debug, error, info};

use crate::config::{AppConfig, EmbeddingProviderKind};
use crate::embedder::{Embedder, HashEmbedder, RigEmbedder};
use crate::error::{RagError, Result};
use crate::models::{Role, Turn};

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Respuesta completa del modelo a la secuencia de turnos.
    ///
    /// Nunca devuelve `Ok` con contenido vacío: una respuesta vacía es un fallo del proveedor.
    async fn complete(&self, turns: &[Turn]) -> Result<String>;

    fn model(&self) -> &str;
}

/// Chat con cualquier endpoint compatible con OpenAI a través de Rig.
pub struct RigChatModel {
    client: openai::Client,
    model: String,
    timeout: Duration,
    completions_api: bool,
}

impl RigChatModel {
    pub fn new(client: openai::Client, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
            completions_api: false,
        }
    }

    /// Usa `/chat/completions` en lugar de la Responses API. Los endpoints
    /// compatibles (OpenRouter, vLLM, Ollama...) sólo implementan la primera.
    pub fn with_completions_api(mut self, enabled: bool) -> Self {
        self.completions_api = enabled;
        self
    }
}

/// Cliente de Rig contra `base_url` o, si no se indica, contra la API de OpenAI.
pub fn openai_client(api_key: &str, base_url: Option<&str>) -> openai::Client {
    match base_url {
        Some(url) => openai::Client::builder(api_key).base_url(url).build(),
        None => openai::Client::new(api_key),
    }
}

/// Separa los turnos en (preámbulo, historial, pregunta final) tal como los espera Rig.
fn split_turns(turns: &[Turn]) -> Result<(String, Vec<Message>, String)> {
    let (last, rest) = turns
        .split_last()
        .ok_or_else(|| RagError::InvalidConfig("no hay turnos que enviar al modelo".to_string()))?;
    if last.role != Role::User {
        return Err(RagError::InvalidConfig(
            "el último turno enviado al modelo debe ser del usuario".to_string(),
        ));
    }

    let preamble = rest
        .iter()
        .filter(|t| t.role == Role::System)
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let history = rest
        .iter()
        .filter_map(|t| match t.role {
            Role::User => Some(Message::user(t.content.clone())),
            Role::Assistant => Some(Message::assistant(t.content.clone())),
            Role::System => None,
        })
        .collect();

    Ok((preamble, history, last.content.clone()))
}

#[async_trait]
impl ChatModel for RigChatModel {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let (preamble, history, prompt) = split_turns(turns)?;
        debug!(model = %self.model, history = history.len(), "Enviando petición de chat");

        let reply = if self.completions_api {
            let model = self.client.completion_model(&self.model).completions_api();
            let agent = AgentBuilder::new(model).preamble(&preamble).build();
            tokio::time::timeout(self.timeout, agent.chat(prompt, history)).await
        } else {
            let agent = self.client.agent(&self.model).preamble(&preamble).build();
            tokio::time::timeout(self.timeout, agent.chat(prompt, history)).await
        };

        let answer = reply
            .map_err(|_| {
                error!(model = %self.model, "Timeout esperando al modelo de chat");
                RagError::UpstreamUnavailable(format!(
                    "sin respuesta tras {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                error!(model = %self.model, error = %e, "Error del proveedor de chat");
                RagError::from_upstream_message(e.to_string())
            })?;

        if answer.trim().is_empty() {
            return Err(RagError::UpstreamUnavailable(
                "el modelo devolvió una respuesta vacía".to_string(),
            ));
        }
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Capacidades externas (embeddings + chat) construidas a partir de la configuración.
#[derive(Clone)]
pub struct LlmManager {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
}

impl LlmManager {
    pub fn from_config(cfg: &AppConfig) -> AnyResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Falta OPENAI_API_KEY en el entorno"))?;
        let client = openai_client(api_key.trim(), cfg.llm_base_url.as_deref());
        let timeout = Duration::from_secs(cfg.llm_timeout_secs);

        let embedder: Arc<dyn Embedder> = match cfg.embedding_provider {
            EmbeddingProviderKind::OpenAI => Arc::new(RigEmbedder::new(
                client.clone(),
                cfg.llm_embedding_model.clone(),
                timeout,
            )),
            EmbeddingProviderKind::Local => {
                Arc::new(HashEmbedder::new(cfg.local_embedding_dimensions)?)
            }
        };
        let chat = Arc::new(
            RigChatModel::new(client, cfg.rag.model.clone(), timeout)
                .with_completions_api(cfg.llm_base_url.is_some()),
        );

        info!(
            embedder = embedder.name(),
            chat_model = %cfg.rag.model,
            base_url = cfg.llm_base_url.as_deref().unwrap_or("api.openai.com"),
            "Proveedores LLM inicializados"
        );
        Ok(Self { embedder, chat })
    }

    pub fn new(embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Self {
        Self { embedder, chat }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_turns_moves_system_to_preamble() {
        let turns = vec![
            Turn::system("contexto"),
            Turn::user("q1"),
            Turn::assistant("a1"),
            Turn::user("q2"),
        ];
        let (preamble, history, prompt) = split_turns(&turns).unwrap();
        assert_eq!(preamble, "contexto");
        assert_eq!(history.len(), 2);
        assert_eq!(prompt, "q2");
    }

    #[test]
    fn client_points_at_the_configured_endpoint() {
        let custom = openai_client("sk-test", Some("https://openrouter.ai/api/v1"));
        assert!(format!("{custom:?}").contains("https://openrouter.ai/api/v1"));

        let default = openai_client("sk-test", None);
        assert!(format!("{default:?}").contains("https://api.openai.com/v1"));
        assert!(!format!("{default:?}").contains("sk-test"));
    }

    #[test]
    fn split_turns_requires_a_final_user_turn() {
        assert!(split_turns(&[]).is_err());
        assert!(split_turns(&[Turn::user("q"), Turn::assistant("a")]).is_err());
    }
}
