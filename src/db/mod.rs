//! Storage abstractions: the document store (collection/resource/feedback/eval
//! records, key-value semantics) and the vector store (named-vector upsert,
//! hybrid query, rerank, filter-delete).
//!
//! Both are specified as external collaborators: this module hides the
//! capability surface behind a trait so the pipeline never depends on the
//! backing technology, and ships one in-process implementation of each so the
//! crate runs standalone.

pub mod broker;
pub mod document_store;
pub mod vector_store;

pub use broker::{InMemoryBroker, MessageBroker};
pub use document_store::{
    DocumentStore, DocumentStoreExt, DocumentStoreProvider, InMemoryDocumentStore,
};
pub use vector_store::{reciprocal_rank_fusion, AresVectorStore, VectorFilter, VectorStore};
