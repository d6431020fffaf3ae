//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// `done()` was called while elements were still open.
    #[error("document finished with {depth} unclosed tag(s)")]
    UnclosedTags {
        /// Number of elements still open.
        depth: usize,
    },

    /// `end()` was called with no open element.
    #[error("end() called with no open element")]
    UnbalancedEnd,

    /// The encoder was used after `done()`.
    #[error("encoder already finished")]
    AlreadyFinished,

    /// Content was written outside of any element.
    #[error("content written outside of an element")]
    ContentOutsideElement,

    /// Inline strings are NUL-terminated and cannot contain NUL.
    #[error("inline string contains a NUL byte")]
    EmbeddedNul,

    /// Tag code outside the content range of a page.
    #[error("invalid tag code {code:#04x} on page {page}")]
    InvalidTag {
        /// Page of the offending tag.
        page: u8,
        /// Code of the offending tag.
        code: u8,
    },

    /// Opaque source produced fewer bytes than announced.
    #[error("opaque source ended after {written} of {expected} bytes")]
    ShortOpaque {
        /// Bytes announced in the length prefix.
        expected: usize,
        /// Bytes actually read from the source.
        written: usize,
    },

    /// Opaque payload does not fit a 32-bit length prefix.
    #[error("opaque payload of {len} bytes is too large")]
    OpaqueTooLarge {
        /// Payload length.
        len: usize,
    },

    /// I/O error while reading an opaque source.
    #[error("I/O error: {0}")]
    Io(String),

    /// Unexpected end of input.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where input ran out.
        offset: usize,
    },

    /// Header is not a supported WBXML preamble.
    #[error("invalid WBXML header: {message}")]
    InvalidHeader {
        /// Description of the header problem.
        message: String,
    },

    /// Page switch to a page the catalog does not know.
    #[error("switch to unknown code page {0}")]
    UnknownPage(u8),

    /// Global token this decoder does not support.
    #[error("unsupported token {token:#04x} at offset {offset}")]
    UnsupportedToken {
        /// The token byte.
        token: u8,
        /// Byte offset of the token.
        offset: usize,
    },

    /// Structural problem (unmatched END, content with no open element, ...).
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// Document ended inside an element.
    #[error("document ended with {depth} open element(s)")]
    PrematureEnd {
        /// Number of elements still open.
        depth: usize,
    },

    /// Invalid UTF-8 in an inline string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Multibyte integer longer than 32 bits.
    #[error("multibyte integer overflow")]
    IntegerOverflow,

    /// Element value is not a decimal integer.
    #[error("expected integer value, got {0:?}")]
    InvalidInteger(String),

    /// A value accessor was called with no element awaiting its content.
    #[error("no element value is pending")]
    NoPendingValue,
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Returns true if this error came from decoding server bytes.
    ///
    /// Everything else is an encoder misuse.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CodecError::UnexpectedEof { .. }
                | CodecError::InvalidHeader { .. }
                | CodecError::UnknownPage(_)
                | CodecError::UnsupportedToken { .. }
                | CodecError::InvalidStructure { .. }
                | CodecError::PrematureEnd { .. }
                | CodecError::InvalidUtf8
                | CodecError::IntegerOverflow
                | CodecError::InvalidInteger(_)
        )
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}
