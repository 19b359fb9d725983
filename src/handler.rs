//! Message handlers.
//!
//! A [`MessageHandler`] turns a decoded message into its reply. Whatever happens
//! inside, the handler answers with a reply; failures go into the reply's error
//! list.
//!
//! [`MemoryDocumentStore`] answers the document protocol from a map kept in memory.
//! It is the backend of `docbus serve` and a reference for how replies are meant to
//! be filled in.
use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    document::{Document, DocumentId},
    protocol::{
        ErrorCode, Message, Reply, ReplyError,
        documents::{
            GetDocumentMessage, PutDocumentMessage, RemoveDocumentMessage, UpdateDocumentMessage,
            messages::ALL_FIELDS,
        },
    },
};

pub trait MessageHandler {
    /// Handles `message` and returns its reply with the status set.
    fn handle(&mut self, message: &dyn Message) -> Box<dyn Reply>;
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: HashMap<DocumentId, (Document, u64)>,
    clock: u64,
}

impl MemoryDocumentStore {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id).map(|(doc, _)| doc)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn handle_put(&mut self, msg: &PutDocumentMessage) -> Box<dyn Reply> {
        let mut reply = msg.reply();
        let timestamp = self.tick();
        self.documents
            .insert(msg.document().id.clone(), (msg.document().clone(), timestamp));
        reply.write_mut().set_highest_modification_timestamp(timestamp);
        reply.set_success();
        Box::new(reply)
    }

    fn handle_remove(&mut self, msg: &RemoveDocumentMessage) -> Box<dyn Reply> {
        let mut reply = msg.reply();
        let id = msg.target();
        if self.documents.remove(id).is_some() {
            let timestamp = self.tick();
            reply.write_mut().set_highest_modification_timestamp(timestamp);
        } else {
            debug!("remove of missing document {id}");
            reply.set_was_found(false);
        }
        reply.set_success();
        Box::new(reply)
    }

    fn handle_update(&mut self, msg: &UpdateDocumentMessage) -> Box<dyn Reply> {
        let mut reply = msg.reply();
        let update = msg.update();

        if !self.documents.contains_key(&update.id) {
            if !update.create_if_missing {
                debug!("update of missing document {}", update.id);
                reply.set_was_found(false);
                reply.set_success();
                return Box::new(reply);
            }
            self.documents
                .insert(update.id.clone(), (Document::new(update.id.clone()), 0));
        }

        let timestamp = self.tick();
        if let Some((document, modified)) = self.documents.get_mut(&update.id) {
            update.apply(document);
            *modified = timestamp;
        }
        reply.write_mut().set_highest_modification_timestamp(timestamp);
        reply.set_success();
        Box::new(reply)
    }

    fn handle_get(&self, msg: &GetDocumentMessage) -> Box<dyn Reply> {
        let mut reply = msg.reply();
        if let Some((document, modified)) = self.documents.get(msg.target()) {
            let mut document = document.clone();
            if msg.field_set() != ALL_FIELDS {
                let wanted: Vec<&str> = msg.field_set().split(',').map(str::trim).collect();
                document.fields.retain(|name, _| wanted.contains(&name.as_str()));
            }
            reply.set_document(document, *modified);
        }
        reply.set_success();
        Box::new(reply)
    }
}

impl MessageHandler for MemoryDocumentStore {
    fn handle(&mut self, message: &dyn Message) -> Box<dyn Reply> {
        if let Some(msg) = message.downcast_ref::<PutDocumentMessage>() {
            self.handle_put(msg)
        } else if let Some(msg) = message.downcast_ref::<RemoveDocumentMessage>() {
            self.handle_remove(msg)
        } else if let Some(msg) = message.downcast_ref::<UpdateDocumentMessage>() {
            self.handle_update(msg)
        } else if let Some(msg) = message.downcast_ref::<GetDocumentMessage>() {
            self.handle_get(msg)
        } else {
            warn!("no handler for message type {}", message.type_code());
            let mut reply = message.create_reply();
            reply.add_error(ReplyError::new(
                ErrorCode::ILLEGAL_PARAMETERS,
                format!("message type {} is not supported", message.type_code()),
            ));
            reply
        }
    }
}
