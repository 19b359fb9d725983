//! Textual document operations.
//!
//! This module defines [`Operation`], the user-facing form of a document protocol
//! message, and parses it from a single line of text. It sits between the CLI and
//! the protocol layer: an operation is parsed, turned into a concrete
//! [`Message`](crate::protocol::Message) and handed to the dispatcher.
//!
//! # Overview
//! Supported operations:
//!
//! - `put <id> [field=value]...`: store a document.
//! - `remove <id>`: remove a document.
//! - `update <id> [field=value]... [-field]... [--create]`: modify a document,
//!   optionally creating it first.
//! - `get <id> [fieldset]`: fetch a document.
//!
//! # Example
//! ```rust
//! use docbus::command::Operation;
//!
//! let op: Operation = "remove id:music:song::yesterday".parse().unwrap();
//! assert!(matches!(op, Operation::Remove(_)));
//! ```
use std::str::FromStr;

use thiserror::Error;

use crate::{
    document::{Document, DocumentId, DocumentIdError, DocumentUpdate},
    protocol::{
        Message, Priority, TraceContext,
        documents::{
            GetDocumentMessage, PutDocumentMessage, RemoveDocumentMessage, UpdateDocumentMessage,
        },
    },
};

/// List of possible errors when parsing an operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("unrecognized operation '{0}'")]
    UnrecognizedOperation(String),

    #[error("invalid '{operation}' operation, {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error(transparent)]
    DocumentId(#[from] DocumentIdError),

    #[error("no operation provided")]
    Empty,
}

/// A document operation ready to be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Put(Document),
    Remove(DocumentId),
    Update(DocumentUpdate),
    Get {
        id: DocumentId,
        field_set: Option<String>,
    },
}

impl Operation {
    /// Builds the message for this operation.
    pub fn into_message(self, priority: Priority, trace_level: u8) -> Box<dyn Message> {
        let mut message: Box<dyn Message> = match self {
            Operation::Put(document) => Box::new(PutDocumentMessage::new(document)),
            Operation::Remove(id) => Box::new(RemoveDocumentMessage::new(id)),
            Operation::Update(update) => Box::new(UpdateDocumentMessage::new(update)),
            Operation::Get { id, field_set } => {
                let get = GetDocumentMessage::new(id);
                match field_set {
                    Some(field_set) => Box::new(get.with_field_set(&field_set)),
                    None => Box::new(get),
                }
            }
        };
        let header = message.header_mut();
        header.priority = priority;
        header.trace = TraceContext::with_level(trace_level);
        message
    }
}

fn parse_assignment<'a>(operation: &str, arg: &'a str) -> Result<(&'a str, &'a str), OperationError> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => Err(OperationError::InvalidArguments {
            operation: operation.to_string(),
            reason: format!("expected field=value, got '{arg}'"),
        }),
    }
}

impl FromStr for Operation {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let operation = parts.next().ok_or(OperationError::Empty)?.to_lowercase();
        if !matches!(operation.as_str(), "put" | "remove" | "update" | "get") {
            return Err(OperationError::UnrecognizedOperation(operation));
        }

        let id: DocumentId = parts
            .next()
            .ok_or_else(|| OperationError::InvalidArguments {
                operation: operation.clone(),
                reason: format!("requires a document id. Example: {operation} id:music:song::a"),
            })?
            .parse()?;
        let args: Vec<&str> = parts.collect();

        match operation.as_str() {
            "put" => {
                let mut document = Document::new(id);
                for arg in args {
                    let (name, value) = parse_assignment(&operation, arg)?;
                    document = document.with_field(name, value);
                }
                Ok(Operation::Put(document))
            }
            "remove" => {
                if !args.is_empty() {
                    return Err(OperationError::InvalidArguments {
                        operation,
                        reason: "takes only a document id".to_string(),
                    });
                }
                Ok(Operation::Remove(id))
            }
            "update" => {
                let mut update = DocumentUpdate::new(id);
                for arg in args {
                    if arg == "--create" {
                        update.create_if_missing = true;
                    } else if let Some(field) = arg.strip_prefix('-') {
                        update.removals.push(field.to_string());
                    } else {
                        let (name, value) = parse_assignment(&operation, arg)?;
                        update.assignments.insert(name.to_string(), value.to_string());
                    }
                }
                Ok(Operation::Update(update))
            }
            _ => {
                if args.len() > 1 {
                    return Err(OperationError::InvalidArguments {
                        operation,
                        reason: "takes a document id and an optional field set".to_string(),
                    });
                }
                Ok(Operation::Get {
                    id,
                    field_set: args.first().map(|f| f.to_string()),
                })
            }
        }
    }
}
