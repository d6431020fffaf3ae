//! Tag-tree encoder.

use std::io::Read;

use bytes::Bytes;
use tracing::trace;

use crate::error::{CodecError, CodecResult};
use crate::tags::TagToken;
use crate::wire;

/// Streaming WBXML encoder.
///
/// Calls are chained:
///
/// ```
/// use easync_codec::{tags::sync, Encoder};
///
/// let mut enc = Encoder::new();
/// enc.start(sync::SYNC)?
///     .start(sync::COLLECTIONS)?
///     .start(sync::COLLECTION)?
///     .data(sync::SYNC_KEY, "0")?
///     .data(sync::COLLECTION_ID, "5")?
///     .end()?
///     .end()?
///     .end()?
///     .done()?;
/// let bytes = enc.to_bytes();
/// assert_eq!(&bytes[..4], &[0x03, 0x01, 0x6a, 0x00]);
/// # Ok::<(), easync_codec::CodecError>(())
/// ```
///
/// A started tag is held back until the next call shows whether it has
/// content; an element closed with nothing written is emitted as a single
/// byte without the content flag.
#[derive(Debug)]
pub struct Encoder {
    buffer: Vec<u8>,
    pending: Option<TagToken>,
    open: Vec<TagToken>,
    page: u8,
    finished: bool,
}

impl Encoder {
    /// Create an encoder with the document header already written.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create an encoder with the specified buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buffer = Vec::with_capacity(capacity.max(wire::HEADER.len()));
        buffer.extend_from_slice(&wire::HEADER);
        Self {
            buffer,
            pending: None,
            open: Vec::new(),
            page: 0,
            finished: false,
        }
    }

    /// Open an element.
    pub fn start(&mut self, tag: TagToken) -> CodecResult<&mut Self> {
        self.check_writable()?;
        self.flush_pending(true);
        trace!(tag = %tag, depth = self.open.len(), "start");
        self.pending = Some(tag);
        self.open.push(tag);
        Ok(self)
    }

    /// Close the innermost open element.
    pub fn end(&mut self) -> CodecResult<&mut Self> {
        self.check_writable()?;
        if self.open.pop().is_none() {
            return Err(CodecError::UnbalancedEnd);
        }
        if self.pending.is_some() {
            self.flush_pending(false);
        } else {
            self.buffer.push(wire::END);
        }
        Ok(self)
    }

    /// Write an element with no content.
    pub fn tag(&mut self, tag: TagToken) -> CodecResult<&mut Self> {
        self.start(tag)?.end()
    }

    /// Write an element containing a single inline string.
    pub fn data(&mut self, tag: TagToken, text: &str) -> CodecResult<&mut Self> {
        self.start(tag)?.text(text)?.end()
    }

    /// Write an inline string into the innermost open element.
    pub fn text(&mut self, text: &str) -> CodecResult<&mut Self> {
        self.check_writable()?;
        if self.open.is_empty() {
            return Err(CodecError::ContentOutsideElement);
        }
        if text.as_bytes().contains(&0) {
            return Err(CodecError::EmbeddedNul);
        }
        self.flush_pending(true);
        self.buffer.push(wire::STR_I);
        self.buffer.extend_from_slice(text.as_bytes());
        self.buffer.push(0);
        Ok(self)
    }

    /// Write an element containing an opaque blob.
    ///
    /// On error the encoder is left as it was before the call.
    pub fn opaque(&mut self, tag: TagToken, data: &[u8]) -> CodecResult<&mut Self> {
        let checkpoint = self.checkpoint();
        self.start(tag)?;
        if let Err(err) = self.opaque_header(data.len()) {
            self.rollback(checkpoint);
            return Err(err);
        }
        self.buffer.extend_from_slice(data);
        self.end()
    }

    /// Write an element containing `len` opaque bytes read from `source`.
    ///
    /// The source is copied straight into the output buffer. If it fails or
    /// runs dry early, the element is discarded, the encoder is left as it
    /// was before the call, and [`CodecError::ShortOpaque`] (or the I/O
    /// error) is returned.
    pub fn opaque_from<R: Read>(
        &mut self,
        tag: TagToken,
        source: R,
        len: usize,
    ) -> CodecResult<&mut Self> {
        let checkpoint = self.checkpoint();
        self.start(tag)?;
        if let Err(err) = self.copy_opaque(source, len) {
            self.rollback(checkpoint);
            return Err(err);
        }
        self.end()
    }

    /// Finish the document.
    ///
    /// # Errors
    ///
    /// Fails if any element is still open.
    pub fn done(&mut self) -> CodecResult<&mut Self> {
        self.check_writable()?;
        if !self.open.is_empty() {
            return Err(CodecError::UnclosedTags {
                depth: self.open.len(),
            });
        }
        self.finished = true;
        Ok(self)
    }

    /// Finish the document and take its bytes.
    pub fn finish(mut self) -> CodecResult<Bytes> {
        self.done()?;
        Ok(Bytes::from(self.buffer))
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Returns true once [`Encoder::done`] has succeeded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Copy of the bytes written so far.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn check_writable(&self) -> CodecResult<()> {
        if self.finished {
            Err(CodecError::AlreadyFinished)
        } else {
            Ok(())
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.buffer.len(),
            pending: self.pending,
            depth: self.open.len(),
            page: self.page,
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.buffer.truncate(checkpoint.len);
        self.pending = checkpoint.pending;
        self.open.truncate(checkpoint.depth);
        self.page = checkpoint.page;
    }

    fn copy_opaque<R: Read>(&mut self, source: R, len: usize) -> CodecResult<()> {
        self.opaque_header(len)?;
        let mut limited = source.take(len as u64);
        let written = std::io::copy(&mut limited, &mut self.buffer)? as usize;
        if written != len {
            return Err(CodecError::ShortOpaque {
                expected: len,
                written,
            });
        }
        Ok(())
    }

    fn opaque_header(&mut self, len: usize) -> CodecResult<()> {
        let len32 = u32::try_from(len).map_err(|_| CodecError::OpaqueTooLarge { len })?;
        self.flush_pending(true);
        self.buffer.push(wire::OPAQUE);
        wire::write_multibyte(&mut self.buffer, len32);
        Ok(())
    }

    fn flush_pending(&mut self, has_content: bool) {
        let Some(tag) = self.pending.take() else {
            return;
        };
        if tag.page() != self.page {
            self.buffer.push(wire::SWITCH_PAGE);
            self.buffer.push(tag.page());
            self.page = tag.page();
        }
        let flag = if has_content { wire::CONTENT } else { 0 };
        self.buffer.push(tag.code() | flag);
    }
}

/// Encoder position saved before a write that may be undone.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    len: usize,
    pending: Option<TagToken>,
    depth: usize,
    page: u8,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
