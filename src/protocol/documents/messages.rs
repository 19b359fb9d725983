use bincode::{Decode, Encode};

use crate::{
    document::{Document, DocumentId, DocumentUpdate},
    protocol::{
        Reply, TypeCode,
        codec::wire_payload,
        message::{Message, MessageHeader},
    },
};

use super::{
    DOCUMENT_PROTOCOL, MESSAGE_GETDOCUMENT, MESSAGE_PUTDOCUMENT, MESSAGE_REMOVEDOCUMENT,
    MESSAGE_UPDATEDOCUMENT,
    replies::{GetDocumentReply, PutDocumentReply, RemoveDocumentReply, UpdateDocumentReply},
};

/// Stores a document, replacing any previous version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct PutDocumentMessage {
    header: MessageHeader,
    document: Document,
}

impl PutDocumentMessage {
    pub fn new(document: Document) -> Self {
        Self {
            header: MessageHeader::default(),
            document,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn reply(&self) -> PutDocumentReply {
        PutDocumentReply::answering(self.header.id, self.header.trace.level(), &self.document.id)
    }
}

impl Message for PutDocumentMessage {
    fn type_code(&self) -> TypeCode {
        MESSAGE_PUTDOCUMENT
    }

    fn protocol(&self) -> &'static str {
        DOCUMENT_PROTOCOL
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn create_reply(&self) -> Box<dyn Reply> {
        Box::new(self.reply())
    }

    fn document_id(&self) -> Option<&DocumentId> {
        Some(&self.document.id)
    }

    wire_payload!();
}

/// Removes a document. Removing a document that does not exist succeeds with
/// [`RemoveDocumentReply::was_found`] cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct RemoveDocumentMessage {
    header: MessageHeader,
    document_id: DocumentId,
}

impl RemoveDocumentMessage {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            header: MessageHeader::default(),
            document_id,
        }
    }

    pub fn target(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn reply(&self) -> RemoveDocumentReply {
        RemoveDocumentReply::answering(self.header.id, self.header.trace.level(), &self.document_id)
    }
}

impl Message for RemoveDocumentMessage {
    fn type_code(&self) -> TypeCode {
        MESSAGE_REMOVEDOCUMENT
    }

    fn protocol(&self) -> &'static str {
        DOCUMENT_PROTOCOL
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn create_reply(&self) -> Box<dyn Reply> {
        Box::new(self.reply())
    }

    fn document_id(&self) -> Option<&DocumentId> {
        Some(&self.document_id)
    }

    wire_payload!();
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct UpdateDocumentMessage {
    header: MessageHeader,
    update: DocumentUpdate,
}

impl UpdateDocumentMessage {
    pub fn new(update: DocumentUpdate) -> Self {
        Self {
            header: MessageHeader::default(),
            update,
        }
    }

    pub fn update(&self) -> &DocumentUpdate {
        &self.update
    }

    pub fn reply(&self) -> UpdateDocumentReply {
        UpdateDocumentReply::answering(self.header.id, self.header.trace.level(), &self.update.id)
    }
}

impl Message for UpdateDocumentMessage {
    fn type_code(&self) -> TypeCode {
        MESSAGE_UPDATEDOCUMENT
    }

    fn protocol(&self) -> &'static str {
        DOCUMENT_PROTOCOL
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn create_reply(&self) -> Box<dyn Reply> {
        Box::new(self.reply())
    }

    fn document_id(&self) -> Option<&DocumentId> {
        Some(&self.update.id)
    }

    wire_payload!();
}

/// Field set returning every field of the document.
pub const ALL_FIELDS: &str = "[all]";

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct GetDocumentMessage {
    header: MessageHeader,
    document_id: DocumentId,
    field_set: String,
}

impl Default for GetDocumentMessage {
    fn default() -> Self {
        Self {
            header: MessageHeader::default(),
            document_id: DocumentId::default(),
            field_set: ALL_FIELDS.to_string(),
        }
    }
}

impl GetDocumentMessage {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            ..Default::default()
        }
    }

    pub fn with_field_set(mut self, field_set: &str) -> Self {
        self.field_set = field_set.to_string();
        self
    }

    /// Either [`ALL_FIELDS`] or a comma separated list of field names.
    pub fn field_set(&self) -> &str {
        &self.field_set
    }

    pub fn target(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn reply(&self) -> GetDocumentReply {
        GetDocumentReply::answering(self.header.id, self.header.trace.level())
    }
}

impl Message for GetDocumentMessage {
    fn type_code(&self) -> TypeCode {
        MESSAGE_GETDOCUMENT
    }

    fn protocol(&self) -> &'static str {
        DOCUMENT_PROTOCOL
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    fn create_reply(&self) -> Box<dyn Reply> {
        Box::new(self.reply())
    }

    fn document_id(&self) -> Option<&DocumentId> {
        Some(&self.document_id)
    }

    wire_payload!();
}

#[cfg(test)]
mod tests {
    use crate::protocol::documents::{REPLY_REMOVEDOCUMENT, replies::WriteReply};

    use super::*;

    #[test]
    fn remove_reply_answers_message() {
        let id = DocumentId::new("music", "song", "a");
        let mut msg = RemoveDocumentMessage::new(id.clone());
        msg.header_mut().trace = crate::protocol::TraceContext::with_level(4);

        let reply = msg.create_reply();
        assert_eq!(reply.type_code(), REPLY_REMOVEDOCUMENT);
        assert_eq!(reply.in_reply_to(), Some(msg.id()));
        assert_eq!(reply.header().trace.level(), 4);
        assert!(!reply.status().is_set());
        assert_eq!(reply.write_reply().and_then(WriteReply::document_id), Some(&id));
        assert!(reply.downcast_ref::<RemoveDocumentReply>().unwrap().was_found());
    }

    #[test]
    fn downcast_message() {
        let msg: Box<dyn Message> = Box::new(GetDocumentMessage::new(DocumentId::new("a", "b", "c")));
        assert!(msg.is::<GetDocumentMessage>());
        assert!(!msg.is::<PutDocumentMessage>());
        assert_eq!(
            msg.downcast_ref::<GetDocumentMessage>().unwrap().field_set(),
            ALL_FIELDS
        );
    }

    #[test]
    fn shells_have_null_document_ids() {
        let shell = RemoveDocumentMessage::default();
        assert!(shell.document_id().unwrap().is_null());
    }
}
