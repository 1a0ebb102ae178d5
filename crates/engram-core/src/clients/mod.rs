//! External Service Clients
//!
//! Thin HTTP clients for the model service (embeddings + chat) and the
//! vector index. Absence of either service is a first-class state: clients
//! never block startup and every caller is expected to degrade.

mod ollama;
mod qdrant;

pub use ollama::OllamaClient;
pub use qdrant::{
    CollectionInfo, VectorFilter, VectorIndex, VectorPoint, VectorQuery, VectorSearchHit,
    EMBEDDING_DIMENSIONS,
};
