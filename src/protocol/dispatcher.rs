//! Frame ⇄ typed message/reply adapter.
//!
//! The dispatcher sits between the frame transport and the handlers. It resolves
//! type codes through the [`TypeRegistry`], lets a [`Codec`] fill in the shells,
//! and makes sure every failure on the way in can still be answered: an unknown
//! type code or a malformed payload becomes an error [`Reply`] rather than an
//! error that tears down the session.
use log::{trace, warn};
use thiserror::Error;

use super::{
    Message, MessageId, Reply, TypeCode,
    codec::{BincodeCodec, Codec, CodecError},
    registry::{RegistryError, TypeRegistry},
    reply::{EmptyReply, ErrorCode, ReplyError},
    transport::Frame,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("type {type_code} in protocol '{protocol}': {source}")]
    Codec {
        protocol: String,
        type_code: TypeCode,
        #[source]
        source: CodecError,
    },
}

impl DispatchError {
    /// Error code reported to the peer for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DispatchError::Registry(RegistryError::UnknownProtocol(_)) => {
                ErrorCode::UNKNOWN_PROTOCOL
            }
            DispatchError::Registry(_) => ErrorCode::UNKNOWN_TYPE,
            DispatchError::Codec { .. } => ErrorCode::DECODE_ERROR,
        }
    }
}

pub struct Dispatcher<'r, C: Codec = BincodeCodec> {
    registry: &'r TypeRegistry,
    codec: C,
}

impl<'r> Dispatcher<'r, BincodeCodec> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self::with_codec(registry, BincodeCodec::default())
    }
}

impl<'r, C: Codec> Dispatcher<'r, C> {
    pub fn with_codec(registry: &'r TypeRegistry, codec: C) -> Self {
        Self { registry, codec }
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Builds the message registered under `type_code` and populates it from
    /// `payload`.
    pub fn decode(
        &self,
        protocol: &str,
        type_code: TypeCode,
        payload: &[u8],
    ) -> Result<Box<dyn Message>, DispatchError> {
        let mut message = self.registry.protocol(protocol)?.create_message(type_code)?;
        self.codec
            .decode_message(payload, message.as_mut())
            .map_err(|source| DispatchError::Codec {
                protocol: protocol.to_string(),
                type_code,
                source,
            })?;
        trace!("decoded message {type_code} {}", message.id());
        Ok(message)
    }

    /// Decodes an incoming message frame. Any failure is turned into an error reply
    /// that answers the frame's correlation id.
    pub fn decode_frame(&self, frame: &Frame) -> Result<Box<dyn Message>, Box<dyn Reply>> {
        self.decode(&frame.protocol, frame.type_code, &frame.payload)
            .map_err(|err| {
                warn!("rejecting frame {}: {err}", frame.type_code);
                self.error_reply(
                    &frame.protocol,
                    frame.type_code,
                    frame.message_id(),
                    ReplyError::new(err.error_code(), err.to_string()),
                )
            })
    }

    /// Decodes an incoming reply frame.
    pub fn decode_reply(&self, frame: &Frame) -> Result<Box<dyn Reply>, DispatchError> {
        let mut reply: Box<dyn Reply> = if frame.type_code == EmptyReply::TYPE_CODE {
            Box::new(EmptyReply::default())
        } else {
            self.registry
                .protocol(&frame.protocol)?
                .create_reply(frame.type_code)?
        };
        self.codec
            .decode_reply(&frame.payload, reply.as_mut())
            .map_err(|source| DispatchError::Codec {
                protocol: frame.protocol.clone(),
                type_code: frame.type_code,
                source,
            })?;
        Ok(reply)
    }

    pub fn encode_message(&self, message: &dyn Message) -> Result<Frame, CodecError> {
        Ok(Frame {
            protocol: message.protocol().to_string(),
            type_code: message.type_code(),
            correlation: message.id().0,
            payload: self.codec.encode_message(message)?,
        })
    }

    pub fn encode_reply(&self, reply: &dyn Reply) -> Result<Frame, CodecError> {
        Ok(Frame {
            protocol: reply.protocol().to_string(),
            type_code: reply.type_code(),
            correlation: reply.in_reply_to().map_or(0, |id| id.0),
            payload: self.codec.encode_reply(reply)?,
        })
    }

    /// Encodes `reply`, falling back to an error reply of the same type when the
    /// payload cannot be encoded.
    pub fn encode_reply_or_error(&self, reply: &dyn Reply) -> Result<Frame, CodecError> {
        match self.encode_reply(reply) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                warn!("failed to encode reply {}: {err}", reply.type_code());
                let mut fallback = self
                    .registry
                    .protocol(reply.protocol())
                    .and_then(|p| p.create_reply(reply.type_code()))
                    .unwrap_or_else(|_| Box::new(EmptyReply::default()) as Box<dyn Reply>);
                fallback.header_mut().in_reply_to = reply.in_reply_to();
                fallback.add_error(ReplyError::new(ErrorCode::ENCODE_ERROR, err.to_string()));
                self.encode_reply(fallback.as_ref())
            }
        }
    }

    /// Empty reply answering `message`.
    pub fn build_reply_shell(&self, message: &dyn Message) -> Box<dyn Reply> {
        message.create_reply()
    }

    /// Synthesizes a failed reply for a request of type `request`.
    ///
    /// The reply has the paired type when the request type is known and is an
    /// [`EmptyReply`] otherwise; either way its error list holds `error`.
    pub fn error_reply(
        &self,
        protocol: &str,
        request: TypeCode,
        in_reply_to: Option<MessageId>,
        error: ReplyError,
    ) -> Box<dyn Reply> {
        let paired = self.registry.protocol(protocol).and_then(|p| {
            let code = p.paired_reply_code(request)?;
            p.create_reply(code)
        });
        let mut reply = paired.unwrap_or_else(|_| Box::new(EmptyReply::default()) as Box<dyn Reply>);
        reply.header_mut().in_reply_to = in_reply_to;
        reply.add_error(error);
        reply
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        document::{Document, DocumentId, DocumentUpdate},
        protocol::{
            MessageHeader, Status,
            documents::{
                DOCUMENT_PROTOCOL, GetDocumentMessage, GetDocumentReply, MESSAGE_REMOVEDOCUMENT,
                PutDocumentMessage, REPLY_REMOVEDOCUMENT, RemoveDocumentMessage,
                RemoveDocumentReply, UpdateDocumentMessage,
            },
            registry,
        },
    };

    use super::*;

    /// Counts codec calls and can be told to reject every payload.
    #[derive(Default)]
    struct TestCodec {
        inner: BincodeCodec,
        encoded: AtomicUsize,
        decoded: AtomicUsize,
        reject: bool,
    }

    impl Codec for TestCodec {
        fn encode_message(&self, message: &dyn Message) -> Result<Vec<u8>, CodecError> {
            self.encoded.fetch_add(1, Ordering::SeqCst);
            self.inner.encode_message(message)
        }

        fn decode_message(&self, payload: &[u8], shell: &mut dyn Message) -> Result<(), CodecError> {
            self.decoded.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(CodecError::TrailingBytes {
                    trailing: payload.len(),
                });
            }
            self.inner.decode_message(payload, shell)
        }

        fn encode_reply(&self, reply: &dyn Reply) -> Result<Vec<u8>, CodecError> {
            self.encoded.fetch_add(1, Ordering::SeqCst);
            self.inner.encode_reply(reply)
        }

        fn decode_reply(&self, payload: &[u8], shell: &mut dyn Reply) -> Result<(), CodecError> {
            self.decoded.fetch_add(1, Ordering::SeqCst);
            self.inner.decode_reply(payload, shell)
        }
    }

    fn id() -> DocumentId {
        DocumentId::new("music", "song", "let-it-be")
    }

    #[test]
    fn unknown_type_code_becomes_error_reply() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let err = dispatcher
            .decode(DOCUMENT_PROTOCOL, 9999, &[1, 2, 3])
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Registry(RegistryError::UnknownType { type_code: 9999, .. })
        ));

        let frame = Frame {
            protocol: DOCUMENT_PROTOCOL.into(),
            type_code: 9999,
            correlation: 42,
            payload: vec![1, 2, 3],
        };
        let reply = dispatcher.decode_frame(&frame).unwrap_err();
        assert!(reply.has_errors());
        assert_eq!(reply.errors()[0].code, ErrorCode::UNKNOWN_TYPE);
        assert_eq!(reply.type_code(), EmptyReply::TYPE_CODE);
        assert_eq!(reply.in_reply_to(), Some(MessageId(42)));
    }

    #[test]
    fn unknown_protocol_becomes_error_reply() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let frame = Frame {
            protocol: "mail".into(),
            type_code: MESSAGE_REMOVEDOCUMENT,
            correlation: 0,
            payload: vec![],
        };
        let reply = dispatcher.decode_frame(&frame).unwrap_err();
        assert_eq!(reply.errors()[0].code, ErrorCode::UNKNOWN_PROTOCOL);
        assert_eq!(reply.in_reply_to(), None);
    }

    #[test]
    fn malformed_payload_becomes_paired_error_reply() {
        let codec = TestCodec {
            reject: true,
            ..Default::default()
        };
        let dispatcher = Dispatcher::with_codec(registry::init().unwrap(), codec);
        let frame = Frame {
            protocol: DOCUMENT_PROTOCOL.into(),
            type_code: MESSAGE_REMOVEDOCUMENT,
            correlation: 7,
            payload: vec![0xff; 4],
        };

        let reply = dispatcher.decode_frame(&frame).unwrap_err();
        assert_eq!(reply.type_code(), REPLY_REMOVEDOCUMENT);
        assert_eq!(reply.errors().len(), 1);
        assert_eq!(reply.errors()[0].code, ErrorCode::DECODE_ERROR);
        assert_eq!(reply.in_reply_to(), Some(MessageId(7)));
        assert!(reply.is::<RemoveDocumentReply>());
    }

    #[test]
    fn truncated_payload_is_a_decode_error() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let msg = RemoveDocumentMessage::new(id());
        let mut frame = dispatcher.encode_message(&msg).unwrap();
        frame.payload.truncate(frame.payload.len() / 2);

        let reply = dispatcher.decode_frame(&frame).unwrap_err();
        assert_eq!(reply.type_code(), REPLY_REMOVEDOCUMENT);
        assert_eq!(reply.errors()[0].code, ErrorCode::DECODE_ERROR);
        assert_eq!(reply.in_reply_to(), Some(msg.id()));
    }

    #[test]
    fn round_trip_every_message_type() {
        let dispatcher = Dispatcher::with_codec(registry::init().unwrap(), TestCodec::default());

        let mut update = DocumentUpdate::new(id());
        update.assignments.insert("year".into(), "1970".into());
        update.removals.push("label".into());
        update.create_if_missing = true;

        let mut put = PutDocumentMessage::new(Document::new(id()).with_field("title", "Let It Be"));
        put.header_mut().trace.trace(0, "created");
        let messages: Vec<Box<dyn Message>> = vec![
            Box::new(put),
            Box::new(RemoveDocumentMessage::new(id())),
            Box::new(UpdateDocumentMessage::new(update)),
            Box::new(GetDocumentMessage::new(id()).with_field_set("title")),
        ];

        for message in &messages {
            let frame = dispatcher.encode_message(message.as_ref()).unwrap();
            assert_eq!(frame.correlation, message.id().0);
            let decoded = dispatcher
                .decode(&frame.protocol, frame.type_code, &frame.payload)
                .unwrap();

            assert_eq!(decoded.type_code(), message.type_code());
            assert_eq!(decoded.header(), message.header());
            assert_eq!(format!("{decoded:?}"), format!("{message:?}"));
        }

        let decoded = dispatcher
            .decode(
                DOCUMENT_PROTOCOL,
                messages[1].type_code(),
                &dispatcher.encode_message(messages[1].as_ref()).unwrap().payload,
            )
            .unwrap();
        assert_eq!(
            decoded.downcast_ref::<RemoveDocumentMessage>(),
            messages[1].downcast_ref::<RemoveDocumentMessage>()
        );
        assert_eq!(dispatcher.codec.encoded.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.codec.decoded.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn reply_round_trip_keeps_status_and_flags() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let msg = RemoveDocumentMessage::new(id());

        let mut reply = msg.reply();
        reply.set_success();
        reply.set_was_found(false);
        reply.write_mut().set_highest_modification_timestamp(12);

        let frame = dispatcher.encode_reply(&reply).unwrap();
        assert_eq!(frame.correlation, msg.id().0);

        let decoded = dispatcher.decode_reply(&frame).unwrap();
        let decoded = decoded.downcast_ref::<RemoveDocumentReply>().unwrap();
        assert_eq!(decoded, &reply);
        assert_eq!(decoded.checked_found(), Some(false));
    }

    #[test]
    fn reply_frames_reject_message_codes() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let frame = Frame {
            protocol: DOCUMENT_PROTOCOL.into(),
            type_code: MESSAGE_REMOVEDOCUMENT,
            correlation: 0,
            payload: vec![],
        };
        assert!(matches!(
            dispatcher.decode_reply(&frame),
            Err(DispatchError::Registry(RegistryError::UnknownType { .. }))
        ));
    }

    #[test]
    fn build_reply_shell_matches_registry() {
        let registry = registry::init().unwrap();
        let dispatcher = Dispatcher::new(registry);
        let msg = GetDocumentMessage::new(id());

        let reply = dispatcher.build_reply_shell(&msg);
        assert_eq!(
            reply.type_code(),
            registry
                .paired_reply_code(DOCUMENT_PROTOCOL, msg.type_code())
                .unwrap()
        );
        assert!(reply.is::<GetDocumentReply>());
        assert!(!reply.status().is_set());
    }

    #[test]
    fn synthesized_reply_is_structurally_valid() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let header = MessageHeader::default();

        let reply = dispatcher.error_reply(
            DOCUMENT_PROTOCOL,
            MESSAGE_REMOVEDOCUMENT,
            Some(header.id),
            ReplyError::new(ErrorCode::TIMEOUT, "no reply within 5s"),
        );
        assert_eq!(reply.type_code(), REPLY_REMOVEDOCUMENT);
        assert!(!reply.errors().is_empty());
        assert_eq!(reply.in_reply_to(), Some(header.id));

        let frame = dispatcher.encode_reply(reply.as_ref()).unwrap();
        let decoded = dispatcher.decode_reply(&frame).unwrap();
        assert_eq!(decoded.errors(), reply.errors());
    }

    #[test]
    fn empty_reply_frames_decode() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let mut reply = EmptyReply::new(Some(MessageId(5)));
        reply.add_error(ReplyError::new(ErrorCode::UNKNOWN_TYPE, "unknown"));

        let frame = dispatcher.encode_reply(&reply).unwrap();
        assert_eq!(frame.protocol, EmptyReply::PROTOCOL);
        let decoded = dispatcher.decode_reply(&frame).unwrap();
        assert_eq!(decoded.downcast_ref::<EmptyReply>(), Some(&reply));
    }

    #[test]
    fn hostile_length_prefix_becomes_decode_error_reply() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        // Header of a remove message whose trace notes claim 2^40 entries.
        let mut payload = 42u64.to_be_bytes().to_vec();
        payload.extend_from_slice(&3u32.to_be_bytes());
        payload.push(0);
        payload.extend_from_slice(&(1u64 << 40).to_be_bytes());
        assert_eq!(payload.len(), 21);

        let frame = Frame {
            protocol: DOCUMENT_PROTOCOL.into(),
            type_code: MESSAGE_REMOVEDOCUMENT,
            correlation: 42,
            payload,
        };
        let reply = dispatcher.decode_frame(&frame).unwrap_err();
        assert_eq!(reply.type_code(), REPLY_REMOVEDOCUMENT);
        assert_eq!(reply.in_reply_to(), Some(MessageId(42)));
        assert_eq!(reply.errors().len(), 1);
        assert_eq!(reply.errors()[0].code, ErrorCode::DECODE_ERROR);
    }

    #[test]
    fn failed_reply_without_errors_is_rejected() {
        let dispatcher = Dispatcher::new(registry::init().unwrap());
        let mut reply = EmptyReply::new(Some(MessageId(5)));
        reply.header_mut().status = Status::Failed(vec![]);

        let frame = dispatcher.encode_reply(&reply).unwrap();
        let err = dispatcher.decode_reply(&frame).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::DECODE_ERROR);

        let mut reply = RemoveDocumentMessage::new(id()).reply();
        reply.header_mut().status = Status::Failed(vec![]);
        let frame = dispatcher.encode_reply(&reply).unwrap();
        assert!(matches!(
            dispatcher.decode_reply(&frame),
            Err(DispatchError::Codec { .. })
        ));
    }
}
