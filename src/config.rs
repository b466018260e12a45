//! Carga y gestión de configuración de la aplicación (servidor + RAG + LLM).

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::conversation::PromptBuilder;
use crate::error::RagError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente que responde preguntas sobre los documentos del usuario. \
Responde de forma clara y concisa, en el idioma de la pregunta. \
Usa sólo la información del contexto; si el contexto no contiene la respuesta, dilo explícitamente.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    OpenAI,
    Local,
}

impl FromStr for EmbeddingProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "local" | "hash" => Ok(Self::Local),
            other => Err(anyhow!("Proveedor de embeddings no soportado: {other}")),
        }
    }
}

/// Parámetros del pipeline RAG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    pub top_k: usize,
    pub max_context_chars: usize,
    pub history_max_turns: usize,
    pub model: String,
    pub system_prompt: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            top_k: 5,
            max_context_chars: 4000,
            history_max_turns: 20,
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl RagSettings {
    pub fn validate(&self) -> std::result::Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size debe ser mayor que cero".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "overlap ({}) debe ser menor que chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k debe ser mayor que cero".to_string()));
        }
        self.prompt_builder().map(|_| ())
    }

    pub fn prompt_builder(&self) -> std::result::Result<PromptBuilder, RagError> {
        Ok(PromptBuilder::new(self.max_context_chars)
            .instructions(self.system_prompt.clone())?
            .history_max_turns(self.history_max_turns))
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub frontend_dir: String,
    pub open_browser: bool,

    /// Endpoint compatible con OpenAI (p. ej. OpenRouter). `None` usa el de OpenAI.
    pub llm_base_url: Option<String>,
    pub embedding_provider: EmbeddingProviderKind,
    pub llm_embedding_model: String,
    pub local_embedding_dimensions: usize,
    pub llm_timeout_secs: u64,

    pub greeting: String,
    pub rag: RagSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            frontend_dir: "frontend".to_string(),
            open_browser: true,
            llm_base_url: None,
            embedding_provider: EmbeddingProviderKind::OpenAI,
            llm_embedding_model: "text-embedding-3-small".to_string(),
            local_embedding_dimensions: 256,
            llm_timeout_secs: 60,
            greeting: "How can I help you?".to_string(),
            rag: RagSettings::default(),
        }
    }
}

/// Lee `key` y la convierte a `T`; si no está definida usa `default`.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {key} ('{raw}'): {e}")),
        _ => Ok(default),
    }
}

/// Normaliza una URL base: vacía → `None`; sin barra final.
fn base_url_from(raw: Option<String>) -> Option<String> {
    raw.map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let rag_defaults = RagSettings::default();

        let embedding_provider = env_or("EMBEDDING_PROVIDER", EmbeddingProviderKind::OpenAI)?;

        let rag = RagSettings {
            chunk_size: env_or("RAG_CHUNK_SIZE", rag_defaults.chunk_size)?,
            overlap: env_or("RAG_CHUNK_OVERLAP", rag_defaults.overlap)?,
            top_k: env_or("RAG_TOP_K", rag_defaults.top_k)?,
            max_context_chars: env_or("RAG_MAX_CONTEXT_CHARS", rag_defaults.max_context_chars)?,
            history_max_turns: env_or("RAG_HISTORY_MAX_TURNS", rag_defaults.history_max_turns)?,
            model: env::var("LLM_CHAT_MODEL").unwrap_or(rag_defaults.model),
            system_prompt: env::var("RAG_SYSTEM_PROMPT").unwrap_or(rag_defaults.system_prompt),
        };
        rag.validate().context("Parámetros RAG inválidos")?;

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or(defaults.server_addr),
            frontend_dir: env::var("FRONTEND_DIR").unwrap_or(defaults.frontend_dir),
            open_browser: env_or("OPEN_BROWSER", defaults.open_browser)?,
            llm_base_url: base_url_from(env::var("LLM_BASE_URL").ok()),
            embedding_provider,
            llm_embedding_model: env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or(defaults.llm_embedding_model),
            local_embedding_dimensions: env_or(
                "LOCAL_EMBEDDING_DIMENSIONS",
                defaults.local_embedding_dimensions,
            )?,
            llm_timeout_secs: env_or("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs)?,
            greeting: env::var("CHAT_GREETING").unwrap_or(defaults.greeting),
            rag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(RagSettings::default().validate().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let bad_overlap = RagSettings { overlap: 1000, ..RagSettings::default() };
        assert!(matches!(bad_overlap.validate(), Err(RagError::InvalidConfig(_))));

        let zero_k = RagSettings { top_k: 0, ..RagSettings::default() };
        assert!(matches!(zero_k.validate(), Err(RagError::InvalidConfig(_))));

        let tiny_budget = RagSettings { max_context_chars: 10, ..RagSettings::default() };
        assert!(matches!(tiny_budget.validate(), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn base_url_is_trimmed_and_optional() {
        assert_eq!(
            base_url_from(Some(" https://openrouter.ai/api/v1/ ".to_string())),
            Some("https://openrouter.ai/api/v1".to_string())
        );
        assert_eq!(base_url_from(Some("   ".to_string())), None);
        assert_eq!(base_url_from(None), None);
    }

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!("OpenAI".parse::<EmbeddingProviderKind>().unwrap(), EmbeddingProviderKind::OpenAI);
        assert_eq!("LOCAL".parse::<EmbeddingProviderKind>().unwrap(), EmbeddingProviderKind::Local);
        assert!("ollama".parse::<EmbeddingProviderKind>().is_err());
    }
}
