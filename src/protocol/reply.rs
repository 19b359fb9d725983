use std::{any::Any, fmt};

use bincode::{
    Decode, Encode,
    de::Decoder,
    error::{AllowedEnumVariants, DecodeError},
};

use super::{
    MessageId, TraceContext, TypeCode,
    codec::{CodecError, WireConfig, wire_payload},
    documents::replies::WriteReply,
};

/// Numeric error code carried in a reply.
///
/// Codes in `100000..200000` are transient and may succeed when resent; codes from
/// `200000` upwards are fatal. The `150000` and `250000` blocks belong to
/// applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const NONE: Self = Self(0);

    pub const TRANSIENT_ERROR: Self = Self(100_000);
    pub const SEND_QUEUE_FULL: Self = Self(100_001);
    pub const CONNECTION_ERROR: Self = Self(100_003);
    pub const SESSION_BUSY: Self = Self(100_005);
    pub const TIMEOUT: Self = Self(100_008);

    pub const APP_TRANSIENT_ERROR: Self = Self(150_000);
    pub const BUSY: Self = Self(150_001);
    pub const BACKEND_UNAVAILABLE: Self = Self(150_002);

    pub const FATAL_ERROR: Self = Self(200_000);
    pub const ENCODE_ERROR: Self = Self(200_004);
    pub const UNKNOWN_PROTOCOL: Self = Self(200_006);
    pub const DECODE_ERROR: Self = Self(200_007);
    pub const UNKNOWN_TYPE: Self = Self(200_008);

    pub const APP_FATAL_ERROR: Self = Self(250_000);
    pub const ILLEGAL_PARAMETERS: Self = Self(250_001);
    pub const REJECTED: Self = Self(250_002);

    pub fn is_transient(self) -> bool {
        (Self::TRANSIENT_ERROR.0..Self::FATAL_ERROR.0).contains(&self.0)
    }

    pub fn is_fatal(self) -> bool {
        self >= Self::FATAL_ERROR
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NONE => "NONE",
            Self::SEND_QUEUE_FULL => "SEND_QUEUE_FULL",
            Self::CONNECTION_ERROR => "CONNECTION_ERROR",
            Self::SESSION_BUSY => "SESSION_BUSY",
            Self::TIMEOUT => "TIMEOUT",
            Self::BUSY => "BUSY",
            Self::BACKEND_UNAVAILABLE => "BACKEND_UNAVAILABLE",
            Self::ENCODE_ERROR => "ENCODE_ERROR",
            Self::UNKNOWN_PROTOCOL => "UNKNOWN_PROTOCOL",
            Self::DECODE_ERROR => "DECODE_ERROR",
            Self::UNKNOWN_TYPE => "UNKNOWN_TYPE",
            Self::ILLEGAL_PARAMETERS => "ILLEGAL_PARAMETERS",
            Self::REJECTED => "REJECTED",
            c if c.is_transient() => "TRANSIENT_ERROR",
            c if c.is_fatal() => "FATAL_ERROR",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// One entry of a failed reply's error list.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ReplyError {
    pub code: ErrorCode,
    pub message: String,
    /// Service that raised the error, when known.
    pub service: Option<String>,
}

impl ReplyError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            service: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(service) => write!(f, "[{}] @ {}: {}", self.code, service, self.message),
            None => write!(f, "[{}]: {}", self.code, self.message),
        }
    }
}

/// Outcome of the operation a reply answers.
///
/// A `Failed` status always holds at least one error, in the order they were
/// added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode)]
pub enum Status {
    #[default]
    Unset,
    Ok,
    Failed(Vec<ReplyError>),
}

// Same layout as the derived encoding, but a `Failed` status without errors is
// rejected.
impl<Context> Decode<Context> for Status {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        match <u32 as Decode<Context>>::decode(decoder)? {
            0 => Ok(Status::Unset),
            1 => Ok(Status::Ok),
            2 => {
                let errors = <Vec<ReplyError> as Decode<Context>>::decode(decoder)?;
                if errors.is_empty() {
                    return Err(DecodeError::Other("failed status without errors"));
                }
                Ok(Status::Failed(errors))
            }
            found => Err(DecodeError::UnexpectedVariant {
                type_name: "Status",
                allowed: &AllowedEnumVariants::Range { min: 0, max: 2 },
                found,
            }),
        }
    }
}

bincode::impl_borrow_decode!(Status);

impl Status {
    pub fn set_success(&mut self) {
        *self = Status::Ok;
    }

    pub fn add_error(&mut self, error: ReplyError) {
        match self {
            Status::Failed(errors) => errors.push(error),
            _ => *self = Status::Failed(vec![error]),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Status::Unset)
    }

    pub fn has_errors(&self) -> bool {
        matches!(self, Status::Failed(_))
    }

    pub fn errors(&self) -> &[ReplyError] {
        match self {
            Status::Failed(errors) => errors,
            _ => &[],
        }
    }
}

/// Fields shared by every reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ReplyHeader {
    /// Id of the message this reply answers.
    pub in_reply_to: Option<MessageId>,
    pub status: Status,
    pub trace: TraceContext,
}

impl ReplyHeader {
    /// Header of a reply answering the message with `id`.
    pub fn answering(id: MessageId, trace_level: u8) -> Self {
        Self {
            in_reply_to: Some(id),
            status: Status::Unset,
            trace: TraceContext::with_level(trace_level),
        }
    }
}

/// A typed response to a [`Message`](super::Message).
///
/// Replies never perform I/O; they are filled in by whoever handles the message
/// (or synthesized by the transport) and then handed back as plain data.
pub trait Reply: fmt::Debug + Send + Any {
    fn type_code(&self) -> TypeCode;

    /// Name of the protocol this reply is registered under.
    fn protocol(&self) -> &'static str;

    fn header(&self) -> &ReplyHeader;

    fn header_mut(&mut self) -> &mut ReplyHeader;

    fn encode_payload(&self, config: WireConfig) -> Result<Vec<u8>, CodecError>;

    fn decode_payload(&mut self, payload: &[u8], config: WireConfig) -> Result<(), CodecError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Mutation replies expose their shared part here.
    fn write_reply(&self) -> Option<&WriteReply> {
        None
    }

    fn set_success(&mut self) {
        self.header_mut().status.set_success();
    }

    fn add_error(&mut self, error: ReplyError) {
        self.header_mut().status.add_error(error);
    }

    fn has_errors(&self) -> bool {
        self.header().status.has_errors()
    }

    fn errors(&self) -> &[ReplyError] {
        self.header().status.errors()
    }

    fn status(&self) -> &Status {
        &self.header().status
    }

    fn in_reply_to(&self) -> Option<MessageId> {
        self.header().in_reply_to
    }
}

impl dyn Reply {
    pub fn downcast_ref<T: Reply>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Reply>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: Reply>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Protocol-less reply used when no paired reply type is known, e.g. for a
/// message whose type code is not registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct EmptyReply {
    header: ReplyHeader,
}

impl EmptyReply {
    pub const TYPE_CODE: TypeCode = 0;
    pub const PROTOCOL: &'static str = "";

    pub fn new(in_reply_to: Option<MessageId>) -> Self {
        Self {
            header: ReplyHeader {
                in_reply_to,
                ..Default::default()
            },
        }
    }
}

impl Reply for EmptyReply {
    fn type_code(&self) -> TypeCode {
        Self::TYPE_CODE
    }

    fn protocol(&self) -> &'static str {
        Self::PROTOCOL
    }

    fn header(&self) -> &ReplyHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ReplyHeader {
        &mut self.header
    }

    wire_payload!();
}
