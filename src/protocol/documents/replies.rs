use bincode::{Decode, Encode};

use crate::{
    document::{Document, DocumentId},
    protocol::{
        MessageId, TypeCode,
        codec::wire_payload,
        reply::{Reply, ReplyHeader},
    },
};

use super::{
    DOCUMENT_PROTOCOL, REPLY_GETDOCUMENT, REPLY_PUTDOCUMENT, REPLY_REMOVEDOCUMENT,
    REPLY_UPDATEDOCUMENT,
};

/// Part shared by every mutation reply.
///
/// The document id is echoed from the message so callers with several mutations
/// in flight can match replies to documents without relying on delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct WriteReply {
    pub(crate) header: ReplyHeader,
    document_id: Option<DocumentId>,
    highest_modification_timestamp: u64,
}

impl WriteReply {
    fn answering(id: MessageId, trace_level: u8, document_id: &DocumentId) -> Self {
        Self {
            header: ReplyHeader::answering(id, trace_level),
            document_id: Some(document_id.clone()),
            highest_modification_timestamp: 0,
        }
    }

    pub fn document_id(&self) -> Option<&DocumentId> {
        self.document_id.as_ref()
    }

    pub fn set_document_id(&mut self, id: DocumentId) {
        self.document_id = Some(id);
    }

    /// Timestamp the backend assigned to the mutation, `0` when none was made.
    pub fn highest_modification_timestamp(&self) -> u64 {
        self.highest_modification_timestamp
    }

    pub fn set_highest_modification_timestamp(&mut self, timestamp: u64) {
        self.highest_modification_timestamp = timestamp;
    }
}

macro_rules! write_reply_impl {
    ($reply:ty, $code:expr) => {
        impl Reply for $reply {
            fn type_code(&self) -> TypeCode {
                $code
            }

            fn protocol(&self) -> &'static str {
                DOCUMENT_PROTOCOL
            }

            fn header(&self) -> &ReplyHeader {
                &self.write.header
            }

            fn header_mut(&mut self) -> &mut ReplyHeader {
                &mut self.write.header
            }

            fn write_reply(&self) -> Option<&WriteReply> {
                Some(&self.write)
            }

            wire_payload!();
        }

        impl $reply {
            pub fn write(&self) -> &WriteReply {
                &self.write
            }

            pub fn write_mut(&mut self) -> &mut WriteReply {
                &mut self.write
            }

            pub fn document_id(&self) -> Option<&DocumentId> {
                self.write.document_id()
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct PutDocumentReply {
    write: WriteReply,
}

impl PutDocumentReply {
    pub(crate) fn answering(id: MessageId, trace_level: u8, document_id: &DocumentId) -> Self {
        Self {
            write: WriteReply::answering(id, trace_level, document_id),
        }
    }
}

write_reply_impl!(PutDocumentReply, REPLY_PUTDOCUMENT);

/// Reply to a remove.
///
/// `found` starts out `true`: removing an existing document is the normal case,
/// and a caller that never looks at the flag must not read a miss into it. The
/// handler clears it when the document did not exist, which is still a success.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RemoveDocumentReply {
    write: WriteReply,
    found: bool,
}

impl Default for RemoveDocumentReply {
    fn default() -> Self {
        Self {
            write: WriteReply::default(),
            found: true,
        }
    }
}

impl RemoveDocumentReply {
    pub(crate) fn answering(id: MessageId, trace_level: u8, document_id: &DocumentId) -> Self {
        Self {
            write: WriteReply::answering(id, trace_level, document_id),
            found: true,
        }
    }

    /// Whether the document existed before the remove. Not meaningful unless the
    /// status is ok.
    pub fn was_found(&self) -> bool {
        self.found
    }

    /// [`was_found`](Self::was_found), or `None` when the status is not ok.
    pub fn checked_found(&self) -> Option<bool> {
        self.write.header.status.is_ok().then_some(self.found)
    }

    pub fn set_was_found(&mut self, found: bool) {
        self.found = found;
    }
}

write_reply_impl!(RemoveDocumentReply, REPLY_REMOVEDOCUMENT);

/// Reply to an update; `found` follows the same rules as on
/// [`RemoveDocumentReply`].
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct UpdateDocumentReply {
    write: WriteReply,
    found: bool,
}

impl Default for UpdateDocumentReply {
    fn default() -> Self {
        Self {
            write: WriteReply::default(),
            found: true,
        }
    }
}

impl UpdateDocumentReply {
    pub(crate) fn answering(id: MessageId, trace_level: u8, document_id: &DocumentId) -> Self {
        Self {
            write: WriteReply::answering(id, trace_level, document_id),
            found: true,
        }
    }

    pub fn was_found(&self) -> bool {
        self.found
    }

    pub fn checked_found(&self) -> Option<bool> {
        self.write.header.status.is_ok().then_some(self.found)
    }

    pub fn set_was_found(&mut self, found: bool) {
        self.found = found;
    }
}

write_reply_impl!(UpdateDocumentReply, REPLY_UPDATEDOCUMENT);

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct GetDocumentReply {
    header: ReplyHeader,
    document: Option<Document>,
    last_modified: u64,
}

impl GetDocumentReply {
    pub(crate) fn answering(id: MessageId, trace_level: u8) -> Self {
        Self {
            header: ReplyHeader::answering(id, trace_level),
            ..Default::default()
        }
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn set_document(&mut self, document: Document, last_modified: u64) {
        self.document = Some(document);
        self.last_modified = last_modified;
    }

    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }
}

impl Reply for GetDocumentReply {
    fn type_code(&self) -> TypeCode {
        REPLY_GETDOCUMENT
    }

    fn protocol(&self) -> &'static str {
        DOCUMENT_PROTOCOL
    }

    fn header(&self) -> &ReplyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ReplyHeader {
        &mut self.header
    }

    wire_payload!();
}
