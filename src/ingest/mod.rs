//! Ingestion and persist workers (§4.8, §5). These are the broker-driven
//! consumers that turn a submitted resource into stored, searchable chunks:
//! the ingestion worker runs `load`/`chunk`/`update`/`delete` on the `rag`
//! queue, and the persist workers apply `chunk_exchange` events to the
//! document store and vector store.

pub mod persist;
pub mod worker;

pub use persist::PersistWorker;
pub use worker::IngestionWorker;
