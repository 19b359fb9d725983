use std::io::{self, Read, Write};

use bincode::{Decode, Encode, decode_from_std_read, encode_into_std_write, error::DecodeError};
use log::trace;
use thiserror::Error;

use super::{
    MessageId, TypeCode,
    codec::{WireConfig, wire_config},
};

/// Default upper bound for a frame payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame: {0}")]
    Deserialize(#[from] DecodeError),
    #[error("frame payload of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Unit exchanged over the wire: an encoded message or reply together with what
/// is needed to find its type again.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Frame {
    pub protocol: String,
    pub type_code: TypeCode,
    /// Message id for messages; id of the answered message for replies; `0` when
    /// unknown.
    pub correlation: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn message_id(&self) -> Option<MessageId> {
        (self.correlation != 0).then_some(MessageId(self.correlation))
    }
}

pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: WireConfig,
    max_frame_size: usize,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(stream: T, max_frame_size: usize) -> Self {
        Self {
            stream,
            config: wire_config(),
            max_frame_size,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if frame.payload.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.payload.len(),
                limit: self.max_frame_size,
            });
        }
        encode_into_std_write(frame, &mut self.stream, self.config)?;
        self.stream.flush()?;
        trace!(
            "wrote frame {}/{} ({} bytes)",
            frame.protocol,
            frame.type_code,
            frame.payload.len()
        );
        Ok(())
    }

    /// Reads the next frame; `Ok(None)` once the stream ends between frames.
    ///
    /// The payload length is checked against the frame limit before the payload
    /// is read, and a stream ending inside a frame is an error.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        let mut reader = CountingReader {
            inner: &mut self.stream,
            read: 0,
        };
        let protocol: String = match decode_from_std_read(&mut reader, self.config) {
            Ok(protocol) => protocol,
            Err(e) if reader.read == 0 && is_end_of_stream(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let type_code: TypeCode = decode_from_std_read(&mut reader, self.config)?;
        let correlation: u64 = decode_from_std_read(&mut reader, self.config)?;
        let len: u64 = decode_from_std_read(&mut reader, self.config)?;

        let size = usize::try_from(len).unwrap_or(usize::MAX);
        if size > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size,
                limit: self.max_frame_size,
            });
        }
        let mut payload = Vec::new();
        (&mut reader).take(len).read_to_end(&mut payload)?;
        if payload.len() != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("frame ended after {} of {size} payload bytes", payload.len()),
            )
            .into());
        }

        trace!("read frame {protocol}/{type_code} ({size} bytes)");
        Ok(Some(Frame {
            protocol,
            type_code,
            correlation,
            payload,
        }))
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

fn is_end_of_stream(e: &DecodeError) -> bool {
    match e {
        DecodeError::UnexpectedEnd { .. } => true,
        DecodeError::Io { inner, .. } => inner.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// Counts the bytes pulled from `inner`, so a clean end of stream can be told
/// apart from one inside a frame.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    read: usize,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n;
        Ok(n)
    }
}

/// Joins a reader and a writer into one stream, e.g. stdin and stdout.
#[derive(Debug)]
pub struct Duplex<R, W> {
    pub reader: R,
    pub writer: W,
}

impl<R: Read, W> Read for Duplex<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R, W: Write> Write for Duplex<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use super::*;

    fn frame(type_code: TypeCode, payload: Vec<u8>) -> Frame {
        Frame {
            protocol: "document".into(),
            type_code,
            correlation: 11,
            payload,
        }
    }

    #[test]
    fn read_write_frames() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);

        transport.write_frame(&frame(100_005, vec![1, 2, 3])).unwrap();
        transport.write_frame(&frame(200_005, vec![])).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();

        assert_eq!(
            transport.read_frame().unwrap(),
            Some(frame(100_005, vec![1, 2, 3]))
        );
        assert_eq!(transport.read_frame().unwrap(), Some(frame(200_005, vec![])));
        assert_eq!(transport.read_frame().unwrap(), None);
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::with_max_frame_size(stream, 2);

        assert!(matches!(
            transport.write_frame(&frame(1, vec![0; 3])),
            Err(TransportError::FrameTooLarge { size: 3, limit: 2 })
        ));

        let mut bytes = Vec::new();
        encode_into_std_write(frame(1, vec![0; 3]), &mut bytes, wire_config()).unwrap();
        let mut transport = ProtocolTransport::with_max_frame_size(Cursor::new(bytes), 2);
        assert!(matches!(
            transport.read_frame(),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn oversized_length_prefix_fails_before_reading_payload() {
        let mut header = Vec::new();
        encode_into_std_write("document", &mut header, wire_config()).unwrap();
        header.extend_from_slice(&100_005u32.to_be_bytes());
        header.extend_from_slice(&11u64.to_be_bytes());
        header.extend_from_slice(&(1u64 << 40).to_be_bytes());

        let mut transport = ProtocolTransport::with_max_frame_size(Cursor::new(header), 16);
        assert!(matches!(
            transport.read_frame(),
            Err(TransportError::FrameTooLarge { size, limit: 16 }) if size as u64 == 1 << 40
        ));
    }

    #[test]
    fn oversized_protocol_name_is_rejected() {
        let bytes = (1u64 << 40).to_be_bytes().to_vec();
        let mut transport = ProtocolTransport::new(Cursor::new(bytes));
        assert!(matches!(
            transport.read_frame(),
            Err(TransportError::Deserialize(DecodeError::LimitExceeded))
        ));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut bytes = Vec::new();
        encode_into_std_write(frame(1, vec![1, 2, 3, 4]), &mut bytes, wire_config()).unwrap();

        for cut in [3, 6, bytes.len() - 12] {
            let truncated = bytes[..bytes.len() - cut].to_vec();
            let mut transport = ProtocolTransport::new(Cursor::new(truncated));
            assert!(
                transport.read_frame().is_err(),
                "frame cut by {cut} bytes was accepted"
            );
        }

        let mut transport = ProtocolTransport::new(Cursor::new(bytes));
        assert!(transport.read_frame().unwrap().is_some());
        assert!(transport.read_frame().unwrap().is_none());
    }

    #[test]
    fn correlation_zero_means_unknown() {
        assert_eq!(frame(1, vec![]).message_id(), Some(MessageId(11)));
        let mut uncorrelated = frame(1, vec![]);
        uncorrelated.correlation = 0;
        assert_eq!(uncorrelated.message_id(), None);
    }
}
