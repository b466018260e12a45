//! Chat RAG sobre documentos PDF: troceado, embeddings, índice vectorial en
//! memoria, recuperación top-k y conversación con historial, expuesto como
//! una API web con axum.

pub mod api;
pub mod app_state;
pub mod chunker;
pub mod config;
pub mod conversation;
pub mod embedder;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod retriever;
pub mod session;
pub mod vector_store;

pub use error::{RagError, Result};
