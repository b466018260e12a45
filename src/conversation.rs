//! Historial de conversación y ensamblado del prompt.
//!
//! El historial es de sólo-añadir: nunca se reordena ni se modifica un turno
//! existente. El contexto recuperado no se guarda en el historial; se vuelve a
//! construir en cada petición como único turno `system`, así que nunca puede
//! inyectarse dos veces. Del historial sólo se envían al modelo los últimos
//! `history_max_turns` turnos que no son `system`.

use serde::Serialize;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Role, Turn};

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
const CONTEXT_HEADER: &str = "Contexto:\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Empty,
    Active,
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConversationState {
        if self.turns.is_empty() {
            ConversationState::Empty
        } else {
            ConversationState::Active
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Añade pregunta y respuesta juntas: o entran las dos o ninguna.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.reserve(2);
        self.turns.push(Turn::user(question));
        self.turns.push(Turn::assistant(answer));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Construye la secuencia de turnos que se envía al modelo de chat.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instructions: String,
    max_context_chars: usize,
    history_max_turns: Option<usize>,
}

impl PromptBuilder {
    pub fn new(max_context_chars: usize) -> Self {
        Self {
            instructions: String::new(),
            max_context_chars,
            history_max_turns: None,
        }
    }

    /// Texto fijo al principio del turno `system`. Cuenta dentro de `max_context_chars`.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Result<Self> {
        let instructions = instructions.into();
        let needed = instructions.chars().count() + 2 + CONTEXT_HEADER.chars().count();
        if !instructions.is_empty() && needed > self.max_context_chars {
            return Err(RagError::InvalidConfig(format!(
                "las instrucciones del sistema ({} caracteres) no caben en max_context_chars ({})",
                instructions.chars().count(),
                self.max_context_chars
            )));
        }
        self.instructions = instructions;
        Ok(self)
    }

    pub fn history_max_turns(mut self, turns: usize) -> Self {
        self.history_max_turns = Some(turns);
        self
    }

    pub fn build(&self, retrieved: &[Chunk], history: &[Turn], new_query: &str) -> Vec<Turn> {
        let mut turns = vec![Turn::system(self.system_content(retrieved))];

        let dialogue: Vec<&Turn> = history.iter().filter(|t| t.role != Role::System).collect();
        let keep = self.history_max_turns.unwrap_or(dialogue.len()).min(dialogue.len());
        turns.extend(dialogue[dialogue.len() - keep..].iter().map(|t| (*t).clone()));

        turns.push(Turn::user(new_query));
        turns
    }

    /// Chunks completos, en orden, mientras quepan en el presupuesto; nunca medio chunk.
    fn system_content(&self, retrieved: &[Chunk]) -> String {
        let mut content = String::new();
        let mut used = 0;

        if !self.instructions.is_empty() {
            content.push_str(&self.instructions);
            content.push_str("\n\n");
            content.push_str(CONTEXT_HEADER);
            used = content.chars().count();
        }

        let separator_len = CONTEXT_SEPARATOR.chars().count();
        let mut first = true;
        for chunk in retrieved {
            let extra = chunk.text.chars().count() + if first { 0 } else { separator_len };
            if used + extra > self.max_context_chars {
                break;
            }
            if !first {
                content.push_str(CONTEXT_SEPARATOR);
            }
            content.push_str(&chunk.text);
            used += extra;
            first = false;
        }

        content
    }
}

/// Turno `system` con el contexto, historial previo en orden y la nueva pregunta.
pub fn assemble_prompt(
    retrieved_chunks: &[Chunk],
    history: &[Turn],
    new_query: &str,
    max_context_chars: usize,
) -> Vec<Turn> {
    PromptBuilder::new(max_context_chars).build(retrieved_chunks, history, new_query)
}
