//! Payload codec.
//!
//! The dispatcher never looks at payload bytes itself; it hands a registry-built
//! shell to a [`Codec`] and lets it fill in the fields. [`BincodeCodec`] is the
//! stock implementation: every concrete message and reply derives bincode's
//! `Encode`/`Decode`, and the codec drives them through the object-safe payload
//! hooks on [`Message`] and [`Reply`].
use std::fmt;

use bincode::config::{BigEndian, Configuration, Fixint, Limit};
use log::trace;
use thiserror::Error;

use super::{Message, Reply};

/// Upper bound on the bytes a single decode may claim. Length prefixes beyond it
/// fail with `LimitExceeded` before anything is allocated.
pub const DECODE_LIMIT: usize = 4 * 1024 * 1024;

/// Wire configuration shared by payloads and frames.
pub type WireConfig = Configuration<BigEndian, Fixint, Limit<DECODE_LIMIT>>;

pub fn wire_config() -> WireConfig {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<DECODE_LIMIT>()
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("payload has {trailing} trailing bytes")]
    TrailingBytes { trailing: usize },
}

/// Decodes a whole payload, rejecting anything left over.
pub fn decode_exact<T>(payload: &[u8], config: WireConfig) -> Result<T, CodecError>
where
    T: bincode::Decode<()>,
{
    let (value, read) = bincode::decode_from_slice(payload, config)?;
    if read != payload.len() {
        return Err(CodecError::TrailingBytes {
            trailing: payload.len() - read,
        });
    }
    Ok(value)
}

/// Serializes message and reply payloads.
pub trait Codec: Send + Sync {
    fn encode_message(&self, message: &dyn Message) -> Result<Vec<u8>, CodecError>;

    /// Populates a freshly built shell from `payload`.
    fn decode_message(&self, payload: &[u8], shell: &mut dyn Message) -> Result<(), CodecError>;

    fn encode_reply(&self, reply: &dyn Reply) -> Result<Vec<u8>, CodecError>;

    fn decode_reply(&self, payload: &[u8], shell: &mut dyn Reply) -> Result<(), CodecError>;
}

#[derive(Clone, Copy)]
pub struct BincodeCodec {
    config: WireConfig,
}

impl fmt::Debug for BincodeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("limit", &DECODE_LIMIT)
            .finish()
    }
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self {
            config: wire_config(),
        }
    }
}

impl Codec for BincodeCodec {
    fn encode_message(&self, message: &dyn Message) -> Result<Vec<u8>, CodecError> {
        let payload = message.encode_payload(self.config)?;
        trace!(
            "encoded message {} ({} bytes)",
            message.type_code(),
            payload.len()
        );
        Ok(payload)
    }

    fn decode_message(&self, payload: &[u8], shell: &mut dyn Message) -> Result<(), CodecError> {
        trace!(
            "decoding message {} from {} bytes",
            shell.type_code(),
            payload.len()
        );
        shell.decode_payload(payload, self.config)
    }

    fn encode_reply(&self, reply: &dyn Reply) -> Result<Vec<u8>, CodecError> {
        let payload = reply.encode_payload(self.config)?;
        trace!("encoded reply {} ({} bytes)", reply.type_code(), payload.len());
        Ok(payload)
    }

    fn decode_reply(&self, payload: &[u8], shell: &mut dyn Reply) -> Result<(), CodecError> {
        trace!(
            "decoding reply {} from {} bytes",
            shell.type_code(),
            payload.len()
        );
        shell.decode_payload(payload, self.config)
    }
}

/// Implements the payload and downcast hooks of [`Message`]/[`Reply`] for a type
/// deriving bincode's `Encode` and `Decode`.
macro_rules! wire_payload {
    () => {
        fn encode_payload(
            &self,
            config: $crate::protocol::codec::WireConfig,
        ) -> Result<Vec<u8>, $crate::protocol::codec::CodecError> {
            Ok(bincode::encode_to_vec(self, config)?)
        }

        fn decode_payload(
            &mut self,
            payload: &[u8],
            config: $crate::protocol::codec::WireConfig,
        ) -> Result<(), $crate::protocol::codec::CodecError> {
            *self = $crate::protocol::codec::decode_exact(payload, config)?;
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

pub(crate) use wire_payload;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_exact_rejects_trailing_bytes() {
        let mut bytes = bincode::encode_to_vec(7u32, wire_config()).unwrap();
        assert_eq!(decode_exact::<u32>(&bytes, wire_config()).unwrap(), 7);

        bytes.push(0);
        assert!(matches!(
            decode_exact::<u32>(&bytes, wire_config()),
            Err(CodecError::TrailingBytes { trailing: 1 })
        ));
    }

    #[test]
    fn oversized_length_prefix_is_rejected_before_allocating() {
        let mut bytes = (1u64 << 40).to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(
            decode_exact::<Vec<String>>(&bytes, wire_config()),
            Err(CodecError::Decode(bincode::error::DecodeError::LimitExceeded))
        ));
    }

    #[test]
    fn decode_exact_reports_short_input() {
        assert!(matches!(
            decode_exact::<u64>(&[0, 1], wire_config()),
            Err(CodecError::Decode(_))
        ));
    }
}
