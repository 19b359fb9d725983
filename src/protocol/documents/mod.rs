//! The document protocol: put, remove, update and get.
//!
//! Message codes live in the `100000` block and their replies in the `200000`
//! block, so each reply code is its message code plus `100000`. The codes are part
//! of the wire format and never change meaning between versions.
pub mod messages;
pub mod replies;

use super::{
    Message, Reply, TypeCode,
    registry::{Protocol, RegistryError},
};

pub use messages::{
    GetDocumentMessage, PutDocumentMessage, RemoveDocumentMessage, UpdateDocumentMessage,
};
pub use replies::{
    GetDocumentReply, PutDocumentReply, RemoveDocumentReply, UpdateDocumentReply, WriteReply,
};

pub const DOCUMENT_PROTOCOL: &str = "document";

pub const MESSAGE_GETDOCUMENT: TypeCode = 100_003;
pub const MESSAGE_PUTDOCUMENT: TypeCode = 100_004;
pub const MESSAGE_REMOVEDOCUMENT: TypeCode = 100_005;
pub const MESSAGE_UPDATEDOCUMENT: TypeCode = 100_006;

pub const REPLY_GETDOCUMENT: TypeCode = 200_003;
pub const REPLY_PUTDOCUMENT: TypeCode = 200_004;
pub const REPLY_REMOVEDOCUMENT: TypeCode = 200_005;
pub const REPLY_UPDATEDOCUMENT: TypeCode = 200_006;

fn shell<T: Message + Default>() -> Box<dyn Message> {
    Box::new(T::default())
}

fn reply_shell<T: Reply + Default>() -> Box<dyn Reply> {
    Box::new(T::default())
}

/// Builds the document protocol table.
pub fn document_protocol() -> Result<Protocol, RegistryError> {
    let mut protocol = Protocol::new(DOCUMENT_PROTOCOL);
    protocol.register_pair(
        MESSAGE_GETDOCUMENT,
        REPLY_GETDOCUMENT,
        shell::<GetDocumentMessage>,
        reply_shell::<GetDocumentReply>,
    )?;
    protocol.register_pair(
        MESSAGE_PUTDOCUMENT,
        REPLY_PUTDOCUMENT,
        shell::<PutDocumentMessage>,
        reply_shell::<PutDocumentReply>,
    )?;
    protocol.register_pair(
        MESSAGE_REMOVEDOCUMENT,
        REPLY_REMOVEDOCUMENT,
        shell::<RemoveDocumentMessage>,
        reply_shell::<RemoveDocumentReply>,
    )?;
    protocol.register_pair(
        MESSAGE_UPDATEDOCUMENT,
        REPLY_UPDATEDOCUMENT,
        shell::<UpdateDocumentMessage>,
        reply_shell::<UpdateDocumentReply>,
    )?;
    Ok(protocol)
}
