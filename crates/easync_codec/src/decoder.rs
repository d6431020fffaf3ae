//! Tag-tree decoder.
//!
//! [`Decoder`] is a pull cursor over a response body. The low level
//! [`Decoder::next_event`] yields the depth-first event stream; protocol
//! handlers use [`Decoder::next_tag`] and the value accessors instead:
//!
//! ```
//! use easync_codec::{tags::sync, Decoder, Encoder, Scope, Token};
//!
//! let mut enc = Encoder::new();
//! enc.start(sync::SYNC)?.data(sync::STATUS, "1")?.end()?;
//! let bytes = enc.finish()?;
//!
//! let mut dec = Decoder::new(&bytes)?;
//! assert_eq!(dec.next_tag(Scope::Document)?, Token::Tag(sync::SYNC));
//! while let Token::Tag(tag) = dec.next_tag(Scope::Tag(sync::SYNC))? {
//!     match tag {
//!         sync::STATUS => assert_eq!(dec.value_int()?, 1),
//!         _ => dec.skip_tag()?,
//!     }
//! }
//! assert_eq!(dec.next_tag(Scope::Document)?, Token::EndDocument);
//! # Ok::<(), easync_codec::CodecError>(())
//! ```

use tracing::trace;

use crate::error::{CodecError, CodecResult};
use crate::tags::{self, TagToken, TAG_BASE};
use crate::wire;

/// Raw decoder event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// An element opened. Elements without content are followed
    /// immediately by a synthetic [`Event::End`].
    Start {
        /// Element tag.
        tag: TagToken,
        /// Whether the element was encoded with content.
        has_content: bool,
    },
    /// An element closed.
    End(TagToken),
    /// Inline string content.
    Text(&'a str),
    /// Opaque content.
    Opaque(&'a [u8]),
    /// No more input.
    EndDocument,
}

/// Enclosing element passed to [`Decoder::next_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Top level of the document.
    Document,
    /// Inside the given element.
    Tag(TagToken),
}

/// Result of [`Decoder::next_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A child element of the scope started.
    Tag(TagToken),
    /// The scope element ended.
    End,
    /// The document ended (only in [`Scope::Document`]).
    EndDocument,
}

/// Element last returned by `next_tag` whose content is still unread.
#[derive(Debug, Clone, Copy)]
struct Pending {
    tag: TagToken,
    parent_depth: usize,
}

/// WBXML pull decoder.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    page: u8,
    open: Vec<TagToken>,
    synthetic_end: Option<TagToken>,
    pending: Option<Pending>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder for a complete document, parsing its header.
    pub fn new(data: &'a [u8]) -> CodecResult<Self> {
        let mut decoder = Self::fragment(data);
        decoder.read_header()?;
        Ok(decoder)
    }

    /// Create a decoder for a headerless fragment starting on page 0.
    ///
    /// Combine with [`Decoder::push_context`] when the fragment is the
    /// content of an element that was opened elsewhere.
    pub fn fragment(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            page: 0,
            open: Vec::new(),
            synthetic_end: None,
            pending: None,
        }
    }

    /// Mark `tag` as an already-open element.
    ///
    /// Subsequent [`Decoder::next_tag`] calls with `Scope::Tag(tag)` walk
    /// its children, and an END byte in the input closes it.
    pub fn push_context(&mut self, tag: TagToken) {
        self.pending = None;
        self.open.push(tag);
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Active code page.
    pub fn page(&self) -> u8 {
        self.page
    }

    /// Advance to the next child element of `scope`.
    ///
    /// A child returned by the previous call whose content was not read is
    /// skipped first, unless `scope` names that child, in which case the
    /// cursor descends into it. Text directly inside `scope` is ignored.
    ///
    /// Only the tag is compared, so a pending child with the same tag as
    /// its parent is always entered. Call [`Decoder::skip_tag`] to pass
    /// over such a child instead.
    pub fn next_tag(&mut self, scope: Scope) -> CodecResult<Token> {
        if let Some(pending) = self.pending.take() {
            if scope != Scope::Tag(pending.tag) {
                self.skip_to_depth(pending.parent_depth)?;
            }
        }

        loop {
            match self.next_event()? {
                Event::Start { tag, .. } => {
                    let parent_depth = if self.synthetic_end.is_some() {
                        self.open.len()
                    } else {
                        self.open.len() - 1
                    };
                    self.pending = Some(Pending { tag, parent_depth });
                    trace!(tag = %tag, depth = parent_depth, "tag");
                    return Ok(Token::Tag(tag));
                }
                Event::End(tag) => match scope {
                    Scope::Tag(expected) if expected == tag => return Ok(Token::End),
                    Scope::Tag(expected) => {
                        return Err(CodecError::invalid_structure(format!(
                            "expected end of {}, found end of {}",
                            expected, tag
                        )))
                    }
                    Scope::Document => continue,
                },
                Event::Text(_) | Event::Opaque(_) => continue,
                Event::EndDocument => {
                    return match scope {
                        Scope::Document => Ok(Token::EndDocument),
                        Scope::Tag(expected) => Err(CodecError::invalid_structure(format!(
                            "document ended inside {}",
                            expected
                        ))),
                    }
                }
            }
        }
    }

    /// Read the text content of the element last returned by
    /// [`Decoder::next_tag`], consuming its end.
    ///
    /// An element encoded without content yields an empty string.
    pub fn value(&mut self) -> CodecResult<String> {
        let bytes = self.value_bytes()?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read the content of the pending element as a decimal integer.
    ///
    /// Empty content reads as 0.
    pub fn value_int(&mut self) -> CodecResult<i64> {
        let text = self.value()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed
            .parse()
            .map_err(|_| CodecError::InvalidInteger(text.clone()))
    }

    /// Read the raw content of the pending element, accepting both inline
    /// strings and opaque data.
    pub fn value_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let pending = self.pending.take().ok_or(CodecError::NoPendingValue)?;
        let mut out = Vec::new();
        loop {
            match self.next_event()? {
                Event::Text(text) => out.extend_from_slice(text.as_bytes()),
                Event::Opaque(data) => out.extend_from_slice(data),
                Event::End(_) if self.open.len() == pending.parent_depth => return Ok(out),
                Event::Start { tag, .. } => {
                    return Err(CodecError::invalid_structure(format!(
                        "element {} inside value of {}",
                        tag, pending.tag
                    )))
                }
                Event::End(tag) => {
                    return Err(CodecError::invalid_structure(format!(
                        "unexpected end of {} in value of {}",
                        tag, pending.tag
                    )))
                }
                Event::EndDocument => {
                    return Err(CodecError::PrematureEnd {
                        depth: self.open.len(),
                    })
                }
            }
        }
    }

    /// Skip the element last returned by [`Decoder::next_tag`] and all of
    /// its descendants.
    pub fn skip_tag(&mut self) -> CodecResult<()> {
        let pending = self.pending.take().ok_or(CodecError::NoPendingValue)?;
        trace!(tag = %pending.tag, "skip");
        self.skip_to_depth(pending.parent_depth)
    }

    /// Skip the remaining children of `scope`, consuming its end.
    pub fn skip_subtree(&mut self, scope: Scope) -> CodecResult<()> {
        loop {
            match self.next_tag(scope)? {
                Token::Tag(_) => self.skip_tag()?,
                Token::End | Token::EndDocument => return Ok(()),
            }
        }
    }

    /// Next raw event.
    ///
    /// This never panics on malformed input; every structural problem is a
    /// decode error.
    pub fn next_event(&mut self) -> CodecResult<Event<'a>> {
        if let Some(tag) = self.synthetic_end.take() {
            return Ok(Event::End(tag));
        }
        loop {
            if self.pos >= self.data.len() {
                if !self.open.is_empty() {
                    return Err(CodecError::PrematureEnd {
                        depth: self.open.len(),
                    });
                }
                return Ok(Event::EndDocument);
            }

            let offset = self.pos;
            let byte = self.read_byte()?;
            match byte {
                wire::SWITCH_PAGE => {
                    let page = self.read_byte()?;
                    if !tags::is_known_page(page) {
                        return Err(CodecError::UnknownPage(page));
                    }
                    self.page = page;
                }
                wire::END => {
                    let tag = self.open.pop().ok_or_else(|| {
                        CodecError::invalid_structure(format!("unmatched END at offset {}", offset))
                    })?;
                    return Ok(Event::End(tag));
                }
                wire::STR_I => {
                    self.require_open(offset)?;
                    return self.read_inline_string().map(Event::Text);
                }
                wire::OPAQUE => {
                    self.require_open(offset)?;
                    let len = self.read_multibyte()? as usize;
                    return self.read_bytes(len).map(Event::Opaque);
                }
                _ => return self.read_tag(byte, offset),
            }
        }
    }

    fn read_tag(&mut self, byte: u8, offset: usize) -> CodecResult<Event<'a>> {
        let code = byte & wire::CODE_MASK;
        if code < TAG_BASE || byte & wire::ATTRIBUTES != 0 {
            return Err(CodecError::UnsupportedToken {
                token: byte,
                offset,
            });
        }
        let tag = TagToken::try_new(self.page, code)?;
        let has_content = byte & wire::CONTENT != 0;
        if has_content {
            self.open.push(tag);
        } else {
            self.synthetic_end = Some(tag);
        }
        Ok(Event::Start { tag, has_content })
    }

    fn read_header(&mut self) -> CodecResult<()> {
        let offset = self.pos;
        self.read_byte()
            .map_err(|_| CodecError::invalid_header(format!("missing version at {}", offset)))?;
        let public_id = self.read_multibyte()?;
        if public_id == 0 {
            // Public id given as a string table index.
            self.read_multibyte()?;
        }
        let charset = self.read_multibyte()?;
        if charset != wire::CHARSET_UTF8 {
            return Err(CodecError::invalid_header(format!(
                "unsupported charset {}",
                charset
            )));
        }
        let table_len = self.read_multibyte()? as usize;
        self.read_bytes(table_len)?;
        Ok(())
    }

    fn require_open(&self, offset: usize) -> CodecResult<()> {
        if self.open.is_empty() {
            Err(CodecError::invalid_structure(format!(
                "content outside of any element at offset {}",
                offset
            )))
        } else {
            Ok(())
        }
    }

    /// Consume events until the open depth drops back to `depth`.
    fn skip_to_depth(&mut self, depth: usize) -> CodecResult<()> {
        loop {
            match self.next_event()? {
                Event::End(_) if self.open.len() == depth => return Ok(()),
                Event::EndDocument => {
                    return Err(CodecError::PrematureEnd {
                        depth: self.open.len(),
                    })
                }
                _ => {}
            }
        }
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(CodecError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof {
                offset: self.data.len(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_multibyte(&mut self) -> CodecResult<u32> {
        let mut value: u32 = 0;
        for _ in 0..wire::MAX_MULTIBYTE_LEN {
            let byte = self.read_byte()?;
            if value > (u32::MAX >> 7) {
                return Err(CodecError::IntegerOverflow);
            }
            value = (value << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::IntegerOverflow)
    }

    fn read_inline_string(&mut self) -> CodecResult<&'a str> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(CodecError::UnexpectedEof {
                offset: self.data.len(),
            })?;
        let text = std::str::from_utf8(&rest[..nul]).map_err(|_| CodecError::InvalidUtf8)?;
        self.pos += nul + 1;
        Ok(text)
    }
}
