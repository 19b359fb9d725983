//! Matching replies back to the messages that caused them.
//!
//! Replies may be built on another thread or another process, so nothing here
//! holds on to the original message; only the values needed to recognise its
//! reply are kept.
use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use crate::document::DocumentId;

use super::{
    Message, MessageId, Reply, TypeCode,
    codec::Codec,
    dispatcher::Dispatcher,
    reply::{ErrorCode, ReplyError},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("message {0} is already in flight")]
    AlreadyTracked(MessageId),

    #[error("reply to {0} does not match any message in flight")]
    Unsolicited(MessageId),

    #[error("reply carries no correlation and could not be matched by document")]
    Uncorrelated,
}

/// What is remembered about a message while it is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub id: MessageId,
    pub protocol: &'static str,
    pub type_code: TypeCode,
    pub document_id: Option<DocumentId>,
}

/// A reply together with the message it answers.
#[derive(Debug)]
pub struct Completed {
    pub pending: Pending,
    pub reply: Box<dyn Reply>,
}

#[derive(Debug, Default)]
pub struct InFlight {
    pending: HashMap<MessageId, Pending>,
}

impl InFlight {
    pub fn track(&mut self, message: &dyn Message) -> Result<(), CorrelationError> {
        let id = message.id();
        if self.pending.contains_key(&id) {
            return Err(CorrelationError::AlreadyTracked(id));
        }
        self.pending.insert(
            id,
            Pending {
                id,
                protocol: message.protocol(),
                type_code: message.type_code(),
                document_id: message.document_id().cloned(),
            },
        );
        Ok(())
    }

    /// Pairs `reply` with its message and stops tracking it.
    ///
    /// Replies without a message id are matched on the echoed document id, but
    /// only when exactly one message for that document is in flight.
    pub fn complete(&mut self, reply: Box<dyn Reply>) -> Result<Completed, CorrelationError> {
        let id = match reply.in_reply_to() {
            Some(id) => id,
            None => self.by_document(reply.as_ref())?,
        };
        match self.pending.remove(&id) {
            Some(pending) => {
                debug!("completed {id} with reply {}", reply.type_code());
                Ok(Completed { pending, reply })
            }
            None => {
                warn!("dropping unsolicited reply to {id}");
                Err(CorrelationError::Unsolicited(id))
            }
        }
    }

    fn by_document(&self, reply: &dyn Reply) -> Result<MessageId, CorrelationError> {
        let document_id = reply
            .write_reply()
            .and_then(|write| write.document_id())
            .ok_or(CorrelationError::Uncorrelated)?;

        let mut matches = self
            .pending
            .values()
            .filter(|p| p.document_id.as_ref() == Some(document_id));
        match (matches.next(), matches.next()) {
            (Some(pending), None) => Ok(pending.id),
            _ => Err(CorrelationError::Uncorrelated),
        }
    }

    /// Gives up on message `id` and returns the timeout reply answering it.
    pub fn expire<C: Codec>(
        &mut self,
        id: MessageId,
        dispatcher: &Dispatcher<'_, C>,
    ) -> Option<Completed> {
        let pending = self.pending.remove(&id)?;
        debug!("message {id} timed out");
        let reply = dispatcher.error_reply(
            pending.protocol,
            pending.type_code,
            Some(id),
            ReplyError::new(
                ErrorCode::TIMEOUT,
                format!("no reply to message {id} before timeout"),
            ),
        );
        Some(Completed { pending, reply })
    }

    pub fn is_pending(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        document::Document,
        protocol::{
            documents::{
                PutDocumentMessage, REPLY_PUTDOCUMENT, REPLY_REMOVEDOCUMENT,
                RemoveDocumentMessage, RemoveDocumentReply,
            },
            registry,
        },
    };

    use super::*;

    fn id(local: &str) -> DocumentId {
        DocumentId::new("music", "song", local)
    }

    #[test]
    fn replies_complete_out_of_order() {
        let mut in_flight = InFlight::default();
        let first = RemoveDocumentMessage::new(id("a"));
        let second = PutDocumentMessage::new(Document::new(id("b")));
        in_flight.track(&first).unwrap();
        in_flight.track(&second).unwrap();

        let completed = in_flight.complete(second.create_reply()).unwrap();
        assert_eq!(completed.pending.id, second.id());
        assert_eq!(completed.reply.type_code(), REPLY_PUTDOCUMENT);

        let completed = in_flight.complete(first.create_reply()).unwrap();
        assert_eq!(completed.pending.document_id, Some(id("a")));
        assert!(in_flight.is_empty());
    }

    #[test]
    fn double_tracking_is_rejected() {
        let mut in_flight = InFlight::default();
        let msg = RemoveDocumentMessage::new(id("a"));
        in_flight.track(&msg).unwrap();
        assert_eq!(
            in_flight.track(&msg),
            Err(CorrelationError::AlreadyTracked(msg.id()))
        );
    }

    #[test]
    fn unsolicited_reply() {
        let mut in_flight = InFlight::default();
        let msg = RemoveDocumentMessage::new(id("a"));
        assert_eq!(
            in_flight.complete(msg.create_reply()).unwrap_err(),
            CorrelationError::Unsolicited(msg.id())
        );
    }

    #[test]
    fn uncorrelated_reply_matches_unique_document() {
        let mut in_flight = InFlight::default();
        let a = RemoveDocumentMessage::new(id("a"));
        let b = RemoveDocumentMessage::new(id("b"));
        in_flight.track(&a).unwrap();
        in_flight.track(&b).unwrap();

        let mut reply = b.reply();
        reply.header_mut().in_reply_to = None;
        let completed = in_flight.complete(Box::new(reply)).unwrap();
        assert_eq!(completed.pending.id, b.id());

        let again = RemoveDocumentMessage::new(id("a"));
        in_flight.track(&again).unwrap();
        let mut reply = a.reply();
        reply.header_mut().in_reply_to = None;
        assert_eq!(
            in_flight.complete(Box::new(reply)).unwrap_err(),
            CorrelationError::Uncorrelated
        );
        assert_eq!(in_flight.len(), 2);
    }

    #[test]
    fn expired_message_gets_timeout_reply() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let mut in_flight = InFlight::default();
        let msg = RemoveDocumentMessage::new(id("a"));
        in_flight.track(&msg).unwrap();

        let completed = in_flight.expire(msg.id(), &dispatcher).unwrap();
        let reply = completed.reply;
        assert_eq!(reply.type_code(), REPLY_REMOVEDOCUMENT);
        assert_eq!(reply.in_reply_to(), Some(msg.id()));
        assert_eq!(reply.errors().len(), 1);
        assert_eq!(reply.errors()[0].code, ErrorCode::TIMEOUT);
        assert!(reply.is::<RemoveDocumentReply>());

        assert!(!in_flight.is_pending(msg.id()));
        assert!(in_flight.expire(msg.id(), &dispatcher).is_none());
    }
}
