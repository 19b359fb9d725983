use std::{
    any::Any,
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use bincode::{Decode, Encode};
use thiserror::Error;

use crate::document::DocumentId;

use super::{Reply, TypeCode, codec::CodecError, codec::WireConfig};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique message identity, echoed by replies for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown priority '{0}'")]
pub struct PriorityError(String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub enum Priority {
    Highest,
    VeryHigh,
    High,
    #[default]
    Normal,
    Low,
    VeryLow,
    Lowest,
}

impl FromStr for Priority {
    type Err = PriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "highest" => Ok(Priority::Highest),
            "veryhigh" => Ok(Priority::VeryHigh),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "verylow" => Ok(Priority::VeryLow),
            "lowest" => Ok(Priority::Lowest),
            _ => Err(PriorityError(s.to_string())),
        }
    }
}

/// Notes collected while a message or reply travels through the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct TraceContext {
    level: u8,
    notes: Vec<String>,
}

impl TraceContext {
    pub fn with_level(level: u8) -> Self {
        Self {
            level,
            notes: Vec::new(),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Records `note` if `level` is within this context's level.
    pub fn trace(&mut self, level: u8, note: impl Into<String>) -> bool {
        if level > self.level {
            return false;
        }
        self.notes.push(note.into());
        true
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}

/// Fields shared by every message.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MessageHeader {
    pub id: MessageId,
    pub priority: Priority,
    pub trace: TraceContext,
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self {
            id: MessageId::next(),
            priority: Priority::default(),
            trace: TraceContext::default(),
        }
    }
}

/// A typed request travelling over the bus.
///
/// Concrete messages are plain structs; the registry builds empty shells of them
/// from a type code and the codec fills them in. Each message knows the shape of
/// its own reply through [`Message::create_reply`].
pub trait Message: fmt::Debug + Send + Any {
    fn type_code(&self) -> TypeCode;

    /// Name of the protocol this message is registered under.
    fn protocol(&self) -> &'static str;

    fn header(&self) -> &MessageHeader;

    fn header_mut(&mut self) -> &mut MessageHeader;

    /// Builds an empty reply of the paired type. The status is left unset, the
    /// reply answers this message's id and inherits its trace level.
    fn create_reply(&self) -> Box<dyn Reply>;

    fn encode_payload(&self, config: WireConfig) -> Result<Vec<u8>, CodecError>;

    fn decode_payload(&mut self, payload: &[u8], config: WireConfig) -> Result<(), CodecError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The document this message targets, if any.
    fn document_id(&self) -> Option<&DocumentId> {
        None
    }

    fn id(&self) -> MessageId {
        self.header().id
    }

    fn priority(&self) -> Priority {
        self.header().priority
    }
}

impl dyn Message {
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Message>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique() {
        let a = MessageHeader::default();
        let b = MessageHeader::default();
        assert_ne!(a.id, b.id);
        assert!(MessageId::next() > b.id);
    }

    #[test]
    fn priority_from_str() {
        let inputs = vec![
            ("highest", Priority::Highest),
            ("very-high", Priority::VeryHigh),
            ("NORMAL", Priority::Normal),
            ("very_low", Priority::VeryLow),
        ];

        for (s, expected) in inputs {
            assert_eq!(s.parse::<Priority>().unwrap(), expected);
        }
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn trace_respects_level() {
        let mut trace = TraceContext::with_level(3);
        assert!(trace.trace(1, "routed"));
        assert!(!trace.trace(5, "verbose"));
        assert_eq!(trace.notes(), ["routed".to_string()]);
    }
}
