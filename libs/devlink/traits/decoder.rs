use crate::traits::error::{Result, SessionError};
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;
use tokio_util::codec::{AnyDelimiterCodec, Decoder, LinesCodec};

/// A discrete application-level message
///
/// Either a raw chunk as read from the transport or a unit produced by a
/// [`FrameDecoder`]. Cheap to clone; the payload is shared.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload as text, replacing invalid UTF-8 sequences
    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&self.to_text_lossy()).finish()
    }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<BytesMut> for Frame {
    fn from(bytes: BytesMut) -> Self {
        Self(bytes.freeze())
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&'static str> for Frame {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

/// Trait for turning the raw byte stream into frames
///
/// The session owns one decoder for its whole lifetime. Bytes read from
/// the transport are appended to a per-connection buffer and `decode` is
/// called until it returns `Ok(None)`.
///
/// When a connection is torn down the buffer is discarded and `reset` is
/// called, so a partial frame never spans two connections.
pub trait FrameDecoder: Send + 'static {
    /// Try to split one frame off the front of `buf`
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - A complete frame was consumed from `buf`
    /// * `Ok(None)` - More bytes are needed
    /// * `Err(SessionError::Decode)` - Malformed input
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>>;

    /// Forget any state carried over from the previous connection
    fn reset(&mut self) {}
}

/// Pass-through decoder: every read chunk is one frame
///
/// This is what the session uses when no decoder is configured.
#[derive(Debug, Default, Clone)]
pub struct RawChunks;

impl FrameDecoder for RawChunks {
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(Frame::from(buf.split())))
    }
}

/// Adapter for any `tokio_util` codec
///
/// A pristine clone of the codec is kept so `reset` can drop whatever
/// half-parsed state the live codec was carrying.
#[derive(Debug, Clone)]
pub struct CodecDecoder<D> {
    pristine: D,
    codec: D,
}

impl<D: Clone> CodecDecoder<D> {
    pub fn new(codec: D) -> Self {
        Self {
            pristine: codec.clone(),
            codec,
        }
    }
}

impl<D> FrameDecoder for CodecDecoder<D>
where
    D: Decoder + Clone + Send + 'static,
    D::Item: Into<Frame>,
    D::Error: fmt::Display,
{
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        self.codec
            .decode(buf)
            .map(|item| item.map(Into::into))
            .map_err(|e| SessionError::Decode(e.to_string()))
    }

    fn reset(&mut self) {
        self.codec = self.pristine.clone();
    }
}

/// Newline-delimited text frames (`\n` or `\r\n`, terminator stripped)
#[derive(Debug, Clone)]
pub struct LineDecoder(CodecDecoder<LinesCodec>);

impl LineDecoder {
    pub fn new() -> Self {
        Self(CodecDecoder::new(LinesCodec::new()))
    }

    /// Reject lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self(CodecDecoder::new(LinesCodec::new_with_max_length(max_length)))
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for LineDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        self.0.decode(buf)
    }

    fn reset(&mut self) {
        self.0.reset()
    }
}

/// Frames split on any of a set of delimiter bytes (delimiter stripped)
///
/// Useful for devices that terminate replies with `\r` or `;` rather than
/// a newline.
#[derive(Debug, Clone)]
pub struct DelimiterDecoder(CodecDecoder<AnyDelimiterCodec>);

impl DelimiterDecoder {
    pub fn new(delimiters: impl Into<Vec<u8>>) -> Self {
        Self(CodecDecoder::new(AnyDelimiterCodec::new(
            delimiters.into(),
            Vec::new(),
        )))
    }

    pub fn with_max_length(delimiters: impl Into<Vec<u8>>, max_length: usize) -> Self {
        Self(CodecDecoder::new(AnyDelimiterCodec::new_with_max_length(
            delimiters.into(),
            Vec::new(),
            max_length,
        )))
    }
}

impl FrameDecoder for DelimiterDecoder {
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        self.0.decode(buf)
    }

    fn reset(&mut self) {
        self.0.reset()
    }
}
