//! Typed messages and replies of the document bus.
//!
//! This module defines how requests and their replies are typed, identified on the
//! wire and matched back together. It does not move bytes between processes; it
//! turns bytes into typed values and back, and guarantees that every message can
//! be answered with a well-formed reply.
//!
//! # Overview
//!
//! Every [`Message`] and [`Reply`] variant is identified by a [`TypeCode`] that is
//! unique within its protocol. The [`registry`] maps codes to factories building
//! empty shells, and each message code to the code of its reply. The
//! [`Dispatcher`] resolves incoming frames through the registry, lets a
//! [`codec::Codec`] populate the shells, and converts anything that goes wrong
//! into an error reply.
//!
//! Outcomes are data: a reply's [`Status`] is either unset, ok, or a non-empty,
//! ordered list of [`ReplyError`]s. Operation-specific results such as
//! [`RemoveDocumentReply::was_found`](documents::RemoveDocumentReply::was_found)
//! default to the outcome a caller can safely assume without looking.
//!
//! # Key Components
//!
//! - [`Message`] / [`Reply`]: object-safe base traits of all requests and replies.
//! - [`registry::TypeRegistry`]: process-wide type-code table.
//! - [`documents`]: the document protocol (put, remove, update, get).
//! - [`Dispatcher`]: frame ⇄ typed value adapter.
//! - [`ProtocolTransport`]: frame reader/writer over any byte stream.
//! - [`correlation::InFlight`]: matches replies to messages by value.
//! - [`BusServer`]: answers frames from TCP peers with a [`MessageHandler`](crate::handler::MessageHandler).
//!
//! # Binary Format
//!
//! A [`Frame`] carries the protocol name, the type code, a correlation id and the
//! payload. Frames and payloads are encoded with bincode using big-endian,
//! fixed-width integers.
//!
//! # Example
//! ```rust
//! use docbus::document::DocumentId;
//! use docbus::protocol::{Dispatcher, Message, Reply, documents::RemoveDocumentMessage, registry};
//!
//! let dispatcher = Dispatcher::new(registry::init().unwrap());
//! let msg = RemoveDocumentMessage::new(DocumentId::new("music", "song", "a"));
//! let frame = dispatcher.encode_message(&msg).unwrap();
//!
//! let received = dispatcher.decode_frame(&frame).unwrap();
//! let reply = received.create_reply();
//! assert_eq!(reply.in_reply_to(), Some(msg.id()));
//! ```
pub mod codec;
pub mod correlation;
pub mod dispatcher;
pub mod documents;
pub mod message;
pub mod registry;
pub mod reply;
pub mod server;
mod thread;
pub mod transport;

/// Identifies one message or reply variant within a protocol.
pub type TypeCode = u32;

pub use dispatcher::{DispatchError, Dispatcher};
pub use message::{Message, MessageHeader, MessageId, Priority, TraceContext};
pub use reply::{EmptyReply, ErrorCode, Reply, ReplyError, ReplyHeader, Status};
pub use server::{BusServer, ServeError, serve_connection};
pub use thread::ThreadPool;
pub use transport::{Duplex, Frame, ProtocolTransport, TransportError};
