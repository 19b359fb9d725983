pub mod command;
pub mod config;
pub mod document;
pub mod handler;
pub mod protocol;

pub use command::{Operation, OperationError};
pub use config::BusConfig;
pub use document::{Document, DocumentId, DocumentUpdate};
pub use handler::{MemoryDocumentStore, MessageHandler};
